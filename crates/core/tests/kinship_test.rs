//! Integration test: relationship matrices built from pedigree tables.
//!
//! Reference values for the 8-line pedigree below are the additive
//! relationships of Mrode (2014), Example 3.1, computed with Henderson's
//! tabular method:
//!
//!   1, -, -      5, 3, 2
//!   2, -, -      6, 1, 2
//!   3, -, -      7, 4, 5
//!   4, 1, -      8, 3, 6
//!
//! (line, male parent, female parent)

use approx::assert_relative_eq;

use canecestry_core::data::ReadOptions;
use canecestry_core::genetics::{
    build_relationship_matrix, sort_pedigree, BuildOptions, KinshipMethod, PedigreeRecord,
    PedigreeTable, RelationshipMatrix,
};
use canecestry_core::query::{compute_matrix, MatrixRequest, MatrixScope};

fn mrode_table() -> PedigreeTable {
    PedigreeTable::from_triples(&[
        ("1", None, None),
        ("2", None, None),
        ("3", None, None),
        ("4", Some("1"), None),
        ("5", Some("3"), Some("2")),
        ("6", Some("1"), Some("2")),
        ("7", Some("4"), Some("5")),
        ("8", Some("3"), Some("6")),
    ])
}

/// Matrix over every line of the table.
fn full_matrix(table: &PedigreeTable, method: KinshipMethod) -> RelationshipMatrix {
    let records: Vec<&PedigreeRecord> = table.iter().collect();
    let sorted = sort_pedigree(&records);
    build_relationship_matrix(&sorted, &BuildOptions::new().method(method)).unwrap()
}

#[test]
fn test_mrode_additive_relationships() {
    let a = full_matrix(&mrode_table(), KinshipMethod::Diploid);

    let expected = [
        ("4", "1", 0.5),
        ("4", "4", 1.0),
        ("6", "4", 0.25),
        ("7", "7", 1.0),
        ("7", "1", 0.25),
        ("7", "4", 0.5),
        ("7", "6", 0.25),
        ("8", "4", 0.125),
        ("8", "5", 0.375),
        ("8", "6", 0.5),
        ("8", "7", 0.25),
        ("8", "8", 1.0),
    ];
    for (x, y, value) in expected {
        assert_relative_eq!(a.get(x, y).unwrap(), value, epsilon = 1e-12);
        assert_relative_eq!(a.get(y, x).unwrap(), value, epsilon = 1e-12);
    }
}

#[test]
fn test_simple_cross_both_methods() {
    let table = PedigreeTable::from_triples(&[
        ("L1", None, None),
        ("L2", None, None),
        ("L3", Some("L1"), Some("L2")),
    ]);

    let a = full_matrix(&table, KinshipMethod::Diploid);
    assert_eq!(a.get("L1", "L1"), Some(1.0));
    assert_eq!(a.get("L1", "L2"), Some(0.0));
    assert_eq!(a.get("L3", "L3"), Some(1.0));
    assert_eq!(a.get("L3", "L1"), Some(0.5));
    assert_eq!(a.get("L3", "L2"), Some(0.5));

    let c = full_matrix(&table, KinshipMethod::Coancestry);
    assert_eq!(c.method().label(), "Coancestry Matrix");
    assert_eq!(c.get("L3", "L3"), Some(0.5));
    assert_eq!(c.get("L3", "L1"), Some(0.25));
}

#[test]
fn test_backcross_is_inbred() {
    let table = PedigreeTable::from_triples(&[
        ("L1", None, None),
        ("L2", None, None),
        ("L3", Some("L1"), Some("L2")),
        ("L4", Some("L3"), Some("L1")),
    ]);
    let a = full_matrix(&table, KinshipMethod::Diploid);
    assert_eq!(a.get("L4", "L4"), Some(1.25));
    assert_eq!(a.get("L4", "L1"), Some(0.75));
    assert_eq!(a.get("L4", "L3"), Some(0.75));
    assert_eq!(a.get("L4", "L2"), Some(0.25));
    assert_relative_eq!(a.inbreeding("L4").unwrap(), 0.25, epsilon = 1e-12);
}

#[test]
fn test_founders_only_gives_identity() {
    let table =
        PedigreeTable::from_triples(&[("A", None, None), ("B", None, None), ("C", None, None)]);
    for method in [KinshipMethod::Diploid, KinshipMethod::Coancestry] {
        let m = full_matrix(&table, method);
        for (i, x) in ["A", "B", "C"].iter().enumerate() {
            for (j, y) in ["A", "B", "C"].iter().enumerate() {
                let expected = if i == j { method.scale() } else { 0.0 };
                assert_eq!(m.get(x, y), Some(expected));
            }
        }
    }
}

#[test]
fn test_coancestry_is_exactly_half() {
    let table = mrode_table();
    let a = full_matrix(&table, KinshipMethod::Diploid);
    let c = full_matrix(&table, KinshipMethod::Coancestry);

    assert_eq!(a.order(), c.order());
    for x in a.names() {
        for y in a.names() {
            assert_eq!(c.get(x, y).unwrap(), 0.5 * a.get(x, y).unwrap());
        }
    }
}

/// Deterministic pedigree with plenty of shared and repeated parents.
fn dense_table(n: usize) -> PedigreeTable {
    let mut records = vec![PedigreeRecord::founder("F0"), PedigreeRecord::founder("F1")];
    for i in 2..n {
        let male = format!("F{}", i * 5 / 7);
        let female = format!("F{}", (i * 3 / 4 + 1) % i);
        records.push(PedigreeRecord::new(&format!("F{}", i), Some(&male), Some(&female)));
    }
    PedigreeTable::from_records(records)
}

#[test]
fn test_matrix_is_exactly_symmetric() {
    let m = full_matrix(&dense_table(300), KinshipMethod::Coancestry);
    assert_eq!(m.len(), 300);
    assert!(m.is_symmetric());
}

#[test]
fn test_input_order_does_not_change_values() {
    let forward = dense_table(120);
    let reversed: PedigreeTable = forward.iter().rev().cloned().collect();

    let a = full_matrix(&forward, KinshipMethod::Diploid);
    let b = full_matrix(&reversed, KinshipMethod::Diploid);

    for x in a.names() {
        for y in a.names() {
            assert_eq!(a.get(x, y), b.get(x, y), "A[{}, {}]", x, y);
        }
    }
}

#[test]
fn test_cyclic_pedigree_still_builds() {
    let table = PedigreeTable::from_triples(&[
        ("Root", None, None),
        ("A", Some("B"), Some("Root")),
        ("B", Some("A"), None),
    ]);
    let records: Vec<&PedigreeRecord> = table.iter().collect();
    let sorted = sort_pedigree(&records);
    assert_eq!(sorted.cycle_breaks.len(), 1);

    let m = build_relationship_matrix(&sorted, &BuildOptions::new().method(KinshipMethod::Diploid))
        .unwrap();
    assert_eq!(m.len(), 3);
    assert!(m.is_symmetric());
}

#[test]
fn test_extract_all_lines_round_trip() {
    let m = full_matrix(&mrode_table(), KinshipMethod::Coancestry);
    let same = m.extract(&m.order()).unwrap();
    assert_eq!(same, m);
}

#[test]
fn test_subset_matches_full_build() {
    let table = mrode_table();
    let full = full_matrix(&table, KinshipMethod::Diploid);

    let index = table.index();
    let request = MatrixRequest::new(&["8", "7"])
        .method(KinshipMethod::Diploid)
        .subset(&["7", "8"]);
    let sub = compute_matrix(&index, &request, &BuildOptions::new()).unwrap();

    assert_eq!(sub.order(), vec!["7", "8"]);
    assert_eq!(sub.get("7", "8"), full.get("7", "8"));
    assert_eq!(sub.get("8", "8"), full.get("8", "8"));
}

#[test]
fn test_listed_scope_drops_outside_ancestry() {
    let table = mrode_table();
    let index = table.index();

    // Without 4 and 5 the parents of 7 are unknown and 7 looks unrelated.
    let request = MatrixRequest::new(&["7", "8", "3"])
        .method(KinshipMethod::Diploid)
        .scope(MatrixScope::Listed);
    let m = compute_matrix(&index, &request, &BuildOptions::new()).unwrap();
    assert_eq!(m.get("7", "8"), Some(0.0));
    assert_eq!(m.get("8", "3"), Some(0.5));
}

#[test]
fn test_matrix_from_delimited_pedigree() {
    let text = "LineName\tMaleParent\tFemaleParent\n\
                Q117\tNA\t\n\
                Q124\tunknown\tNaN\n\
                Q200\tQ117\tQ124\n\
                Q208\tQ200\tQ117\n";
    let table = PedigreeTable::from_reader(text.as_bytes(), &ReadOptions::new()).unwrap();
    assert_eq!(table.len(), 4);

    let index = table.index();
    let m = compute_matrix(&index, &MatrixRequest::new(&["Q208"]), &BuildOptions::new()).unwrap();
    assert_eq!(m.method(), KinshipMethod::Coancestry);
    assert_eq!(m.len(), 4);
    assert_eq!(m.get("Q208", "Q208"), Some(0.625));
    assert_eq!(m.get("Q208", "Q117"), Some(0.375));
}

#[test]
fn test_hypothetical_cross_preview() {
    let table = mrode_table();
    let planned = table.with_hypothetical_progeny(&[canecestry_core::genetics::HypotheticalCross {
        name: "New".to_string(),
        female_parent: "6".to_string(),
        male_parent: "5".to_string(),
    }]);
    let index = planned.index();
    let m = compute_matrix(
        &index,
        &MatrixRequest::new(&["New"]).method(KinshipMethod::Diploid),
        &BuildOptions::new(),
    )
    .unwrap();

    // 5 and 6 are half sibs through 2: A[5, 6] = 0.25.
    assert_eq!(m.get("New", "New"), Some(1.125));
    assert_eq!(m.get("New", "6"), Some(0.625));
    assert_relative_eq!(m.inbreeding("New").unwrap(), 0.125, epsilon = 1e-12);
    // The recorded table is untouched.
    assert!(!table.index().contains("New"));
}
