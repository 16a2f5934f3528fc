// Genetics module
// Pedigree records, lineage traversal, sorting and relationship matrices

pub mod amatrix;
pub mod lineage;
pub mod pedigree;
pub mod progeny;
pub mod quality;
pub mod relationship;
pub mod sort;

pub use amatrix::{
    build_relationship_matrix, henderson_fill, BuildOptions, CancellationToken, KinshipMethod,
};
pub use lineage::{
    common_ancestors, find_ancestors, find_descendants, find_relatives, EdgeRole, LineageGraph,
    RelationshipEdge,
};
pub use pedigree::{
    normalize_parent, DuplicateLine, HypotheticalCross, PedigreeIndex, PedigreeRecord,
    PedigreeTable,
};
pub use progeny::{maternal_line, paternal_line, progeny_of_cross, progeny_of_parent, Progeny};
pub use quality::{
    check_pedigree, validate_new_entries, DataQualityReport, EntryValidation, InvalidEntry,
    UnresolvedParent,
};
pub use relationship::RelationshipMatrix;
pub use sort::{sort_pedigree, SortedPedigree};
