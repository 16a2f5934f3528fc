//! Request/response surface over the engine.
//!
//! These types mirror what an outer layer (CLI, web handler) sends and
//! receives. Every call works on a [`PedigreeIndex`] over an immutable table
//! snapshot and returns fresh values; [`MatrixCache`] memoises matrices per
//! snapshot without ever mutating a stored result.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{KinshipError, Result};
use crate::genetics::{
    build_relationship_matrix, find_ancestors, find_relatives, sort_pedigree, BuildOptions,
    KinshipMethod, PedigreeIndex, PedigreeRecord, PedigreeTable, RelationshipEdge,
    RelationshipMatrix,
};

/// Which lines a matrix is computed over, starting from the requested ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatrixScope {
    /// Requested lines and all of their ancestors.
    #[default]
    Ancestors,
    /// Relatives (ancestors and descendants) of the requested lines, plus
    /// the ancestors of every relative, so each descendant's other parent
    /// and its lineage are present.
    Relatives,
    /// Exactly the requested lines. Parents outside the list count as
    /// unknown.
    Listed,
}

impl fmt::Display for MatrixScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixScope::Ancestors => write!(f, "ancestors"),
            MatrixScope::Relatives => write!(f, "relatives"),
            MatrixScope::Listed => write!(f, "listed"),
        }
    }
}

impl FromStr for MatrixScope {
    type Err = KinshipError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ancestors" => Ok(MatrixScope::Ancestors),
            "relatives" => Ok(MatrixScope::Relatives),
            "listed" | "subset" => Ok(MatrixScope::Listed),
            other => Err(KinshipError::Data(format!(
                "Unknown matrix scope '{}'. Use 'ancestors', 'relatives' or 'listed'.",
                other
            ))),
        }
    }
}

/// Records a matrix over `lines` must include for the given scope, in table
/// order. Requested lines without a record are left out.
pub fn scope_records<'a, S: AsRef<str>>(
    index: &PedigreeIndex<'a>,
    lines: &[S],
    scope: MatrixScope,
) -> Vec<&'a PedigreeRecord> {
    let mut wanted: IndexSet<String> = lines.iter().map(|l| l.as_ref().to_string()).collect();

    match scope {
        MatrixScope::Listed => {}
        MatrixScope::Ancestors => {
            for line in lines {
                wanted.extend(find_ancestors(index, line.as_ref()).lines);
            }
        }
        MatrixScope::Relatives => {
            let relatives = find_relatives(index, lines).lines;
            for line in &relatives {
                wanted.extend(find_ancestors(index, line).lines);
            }
            wanted.extend(relatives);
        }
    }

    let wanted: Vec<String> = wanted.into_iter().collect();
    index.subset(&wanted)
}

/// Lineage query for one or more focal lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraversalRequest {
    pub focal_lines: Vec<String>,
    /// Keep only generations up to this distance.
    #[serde(default)]
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TraversalResponse {
    pub related_lines: Vec<String>,
    pub edges: Vec<RelationshipEdge>,
    pub generations: BTreeMap<usize, Vec<String>>,
}

/// Relatives of the focal lines (see [`find_relatives`]).
pub fn run_traversal(index: &PedigreeIndex<'_>, request: &TraversalRequest) -> TraversalResponse {
    let mut graph = find_relatives(index, &request.focal_lines);
    if let Some(depth) = request.max_depth {
        graph = graph.within_depth(depth);
    }
    TraversalResponse {
        related_lines: graph.lines.into_iter().collect(),
        edges: graph.edges.into_iter().collect(),
        generations: graph.generations,
    }
}

/// Relationship matrix query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatrixRequest {
    pub lines: Vec<String>,
    #[serde(default)]
    pub method: KinshipMethod,
    #[serde(default)]
    pub scope: MatrixScope,
    /// Narrow the computed matrix to these lines.
    #[serde(default)]
    pub subset: Option<Vec<String>>,
}

impl MatrixRequest {
    pub fn new<S: AsRef<str>>(lines: &[S]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.as_ref().to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn method(mut self, method: KinshipMethod) -> Self {
        self.method = method;
        self
    }

    pub fn scope(mut self, scope: MatrixScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn subset<S: AsRef<str>>(mut self, lines: &[S]) -> Self {
        self.subset = Some(lines.iter().map(|l| l.as_ref().to_string()).collect());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixResponse {
    pub method: KinshipMethod,
    pub order: Vec<String>,
    pub matrix: IndexMap<String, IndexMap<String, f64>>,
    /// Requested lines that have no pedigree record.
    pub missing_lines: Vec<String>,
}

impl MatrixResponse {
    pub fn from_matrix(matrix: &RelationshipMatrix, missing_lines: Vec<String>) -> Self {
        Self {
            method: matrix.method(),
            order: matrix.order(),
            matrix: matrix.to_nested_map(),
            missing_lines,
        }
    }
}

/// Compute the relationship matrix for a request.
///
/// `options` supplies cancellation and deadline; the method always comes
/// from the request.
///
/// # Errors
/// Returns `UnknownLine` if `subset` names a line outside the computed
/// matrix, and propagates build cancellation.
pub fn compute_matrix(
    index: &PedigreeIndex<'_>,
    request: &MatrixRequest,
    options: &BuildOptions,
) -> Result<RelationshipMatrix> {
    let missing = missing_lines(index, &request.lines);
    if !missing.is_empty() {
        warn!(
            "{} requested line(s) have no pedigree record and are left out, e.g. '{}'",
            missing.len(),
            missing[0]
        );
    }

    let records = scope_records(index, &request.lines, request.scope);
    debug!(
        "matrix request: {} lines requested, {} in {} scope",
        request.lines.len(),
        records.len(),
        request.scope
    );

    let sorted = sort_pedigree(&records);
    let options = options.clone().method(request.method);
    let matrix = build_relationship_matrix(&sorted, &options)?;

    match &request.subset {
        Some(subset) => matrix.extract(subset),
        None => Ok(matrix),
    }
}

/// [`compute_matrix`] packaged as a response.
pub fn run_matrix_request(
    index: &PedigreeIndex<'_>,
    request: &MatrixRequest,
    options: &BuildOptions,
) -> Result<MatrixResponse> {
    let matrix = compute_matrix(index, request, options)?;
    Ok(MatrixResponse::from_matrix(
        &matrix,
        missing_lines(index, &request.lines),
    ))
}

fn missing_lines(index: &PedigreeIndex<'_>, lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter(|l| !index.contains(l))
        .cloned()
        .collect()
}

/// Memoised matrices keyed by table fingerprint and request.
///
/// Purely an optimisation: a hit returns the same shared matrix a fresh
/// build would produce. Oldest entries are evicted first once `capacity` is
/// reached.
#[derive(Debug)]
pub struct MatrixCache {
    capacity: usize,
    entries: HashMap<(u64, MatrixRequest), Arc<RelationshipMatrix>>,
    insertion_order: VecDeque<(u64, MatrixRequest)>,
    hits: u64,
    misses: u64,
}

impl MatrixCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }

    /// Return the cached matrix for `(table, request)` or build and store it.
    /// Failed builds are not cached.
    pub fn get_or_build(
        &mut self,
        table: &PedigreeTable,
        request: &MatrixRequest,
        options: &BuildOptions,
    ) -> Result<Arc<RelationshipMatrix>> {
        let key = (table.fingerprint(), request.clone());
        if let Some(hit) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(hit));
        }

        self.misses += 1;
        let matrix = Arc::new(compute_matrix(&table.index(), request, options)?);

        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.insertion_order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.insertion_order.push_back(key.clone());
        self.entries.insert(key, Arc::clone(&matrix));

        Ok(matrix)
    }
}

impl Default for MatrixCache {
    fn default() -> Self {
        Self::new(16)
    }
}
