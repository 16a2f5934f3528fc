use std::collections::HashMap;

use log::{info, warn};
use serde::Serialize;

use super::lineage::EdgeRole;
use super::pedigree::{DuplicateLine, PedigreeIndex, PedigreeRecord};

/// A parent name that does not resolve to any record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedParent {
    pub line_name: String,
    pub parent: String,
    pub role: EdgeRole,
}

/// Data-quality findings for a pedigree snapshot.
///
/// None of these stop traversal or matrix building: duplicates resolve to
/// their first row, unresolved parents count as unknown, and cycles are
/// broken during sorting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataQualityReport {
    /// Rows in the table, duplicates included.
    pub n_rows: usize,
    /// Distinct lines.
    pub n_lines: usize,
    pub n_founders: usize,
    pub duplicates: Vec<DuplicateLine>,
    pub unresolved_parents: Vec<UnresolvedParent>,
    /// Lines that sit on a parent cycle (or between two cycles), in table
    /// order.
    pub cyclic_lines: Vec<String>,
}

impl DataQualityReport {
    pub fn is_clean(&self) -> bool {
        self.duplicates.is_empty()
            && self.unresolved_parents.is_empty()
            && self.cyclic_lines.is_empty()
    }
}

/// Inspect a pedigree for duplicates, dangling parent references and cycles.
pub fn check_pedigree(index: &PedigreeIndex<'_>) -> DataQualityReport {
    let records: Vec<&PedigreeRecord> = index.records().collect();
    let n = records.len();

    let mut unresolved_parents = Vec::new();
    for rec in &records {
        let (male, female) = index.parents_of(&rec.line_name);
        for (parent, role) in [(male, EdgeRole::Male), (female, EdgeRole::Female)] {
            if let Some(p) = parent.filter(|p| !index.contains(p)) {
                unresolved_parents.push(UnresolvedParent {
                    line_name: rec.line_name.clone(),
                    parent: p.to_string(),
                    role,
                });
            }
        }
    }

    let report = DataQualityReport {
        n_rows: index.table().len(),
        n_lines: n,
        n_founders: records.iter().filter(|r| r.is_founder()).count(),
        duplicates: index.duplicates().to_vec(),
        unresolved_parents,
        cyclic_lines: find_cyclic_lines(index, &records),
    };

    info!(
        "pedigree check: {} rows, {} lines, {} founders",
        report.n_rows, report.n_lines, report.n_founders
    );
    if !report.unresolved_parents.is_empty() {
        warn!(
            "{} parent reference(s) do not resolve to a line",
            report.unresolved_parents.len()
        );
    }
    if !report.cyclic_lines.is_empty() {
        warn!(
            "{} line(s) are their own ancestor, e.g. '{}'",
            report.cyclic_lines.len(),
            report.cyclic_lines[0]
        );
    }

    report
}

/// Kahn's algorithm run in both directions: whatever survives pruning from
/// the founders down and from the leaves up lies on a cycle.
fn find_cyclic_lines(index: &PedigreeIndex<'_>, records: &[&PedigreeRecord]) -> Vec<String> {
    let n = records.len();
    let position: HashMap<&str, usize> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.line_name.as_str(), i))
        .collect();

    let mut children_of: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut parents_of: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, rec) in records.iter().enumerate() {
        let (male, female) = index.known_parents_of(&rec.line_name);
        for p in male.into_iter().chain(female) {
            let p = position[p];
            children_of[p].push(i);
            parents_of[i].push(p);
        }
    }

    let mut alive = vec![true; n];
    prune(&children_of, &parents_of, &mut alive);
    prune(&parents_of, &children_of, &mut alive);

    records
        .iter()
        .zip(&alive)
        .filter(|&(_, &a)| a)
        .map(|(r, _)| r.line_name.clone())
        .collect()
}

/// Repeatedly remove live nodes with no live incoming edge.
fn prune(outgoing: &[Vec<usize>], incoming: &[Vec<usize>], alive: &mut [bool]) {
    let mut in_degree: Vec<usize> = incoming
        .iter()
        .enumerate()
        .map(|(i, from)| {
            if alive[i] {
                from.iter().filter(|&&f| alive[f]).count()
            } else {
                0
            }
        })
        .collect();

    let mut queue: Vec<usize> = (0..alive.len())
        .filter(|&i| alive[i] && in_degree[i] == 0)
        .collect();

    while let Some(node) = queue.pop() {
        alive[node] = false;
        for &next in &outgoing[node] {
            if alive[next] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push(next);
                }
            }
        }
    }
}

/// A candidate row rejected because a parent is not in the pedigree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidEntry {
    pub record: PedigreeRecord,
    pub missing_parents: Vec<String>,
}

/// Candidate rows split by whether they can be appended as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntryValidation {
    pub valid: Vec<PedigreeRecord>,
    pub invalid: Vec<InvalidEntry>,
}

/// Check new rows against an existing pedigree before appending them.
///
/// A row is valid when each recorded parent already exists in `index`.
/// Rows with an empty line name are dropped.
pub fn validate_new_entries(
    index: &PedigreeIndex<'_>,
    entries: Vec<PedigreeRecord>,
) -> EntryValidation {
    let mut result = EntryValidation::default();

    for record in entries {
        if record.line_name.trim().is_empty() {
            continue;
        }
        let missing_parents: Vec<String> = record
            .parents()
            .filter(|p| !index.contains(p))
            .map(str::to_string)
            .collect();

        if missing_parents.is_empty() {
            result.valid.push(record);
        } else {
            result.invalid.push(InvalidEntry {
                record,
                missing_parents,
            });
        }
    }

    result
}
