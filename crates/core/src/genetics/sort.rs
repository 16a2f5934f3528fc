use std::collections::HashMap;

use log::warn;

use super::pedigree::PedigreeRecord;

/// A pedigree subset in parents-before-offspring order, with parent links
/// resolved to positions in that order.
///
/// Invariant: `sire_idx[i]` and `dam_idx[i]`, when present, are `< i`.
/// Parents outside the subset are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortedPedigree {
    pub ids: Vec<String>,
    pub sire_idx: Vec<Option<usize>>,
    pub dam_idx: Vec<Option<usize>>,
    /// (child, parent) links that could not be honoured because they close a
    /// cycle. These parents are treated as unknown.
    pub cycle_breaks: Vec<(String, String)>,
}

impl SortedPedigree {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Position of a line in the sorted order.
    pub fn position(&self, line: &str) -> Option<usize> {
        self.ids.iter().position(|id| id == line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Open,
    Done,
}

/// Topologically sort a pedigree subset so every in-subset parent precedes
/// its offspring.
///
/// Depth-first: each line is emitted after its in-subset parents, visiting
/// lines in input order, so an input that is already sorted comes back
/// unchanged. Parents are only honoured when they are part of `records`.
/// If a line name repeats, its first record is used.
///
/// On a cyclic subset the sort still terminates. The line where the cycle
/// is entered is emitted with the closing parent unresolved, and that link
/// is reported in [`SortedPedigree::cycle_breaks`]. This is best effort: the
/// parents-first guarantee only holds for acyclic input.
pub fn sort_pedigree(records: &[&PedigreeRecord]) -> SortedPedigree {
    let mut by_name: HashMap<&str, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<usize> = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        if !by_name.contains_key(rec.line_name.as_str()) {
            by_name.insert(rec.line_name.as_str(), i);
            unique.push(i);
        }
    }

    let parent_at = |node: usize, slot: usize| -> Option<usize> {
        let rec = records[node];
        let parent = if slot == 0 {
            rec.male_parent.as_deref()
        } else {
            rec.female_parent.as_deref()
        };
        parent.and_then(|p| by_name.get(p).copied())
    };

    let mut state = vec![Visit::New; records.len()];
    let mut order: Vec<usize> = Vec::with_capacity(unique.len());
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for &start in &unique {
        if state[start] != Visit::New {
            continue;
        }
        state[start] = Visit::Open;
        stack.push((start, 0));

        while let Some(top) = stack.last_mut() {
            let (node, slot) = *top;
            top.1 += 1;

            if slot < 2 {
                if let Some(parent) = parent_at(node, slot) {
                    if state[parent] == Visit::New {
                        state[parent] = Visit::Open;
                        stack.push((parent, 0));
                    }
                }
            } else {
                stack.pop();
                state[node] = Visit::Done;
                order.push(node);
            }
        }
    }

    let mut position = vec![usize::MAX; records.len()];
    for (pos, &node) in order.iter().enumerate() {
        position[node] = pos;
    }

    let mut sorted = SortedPedigree {
        ids: Vec::with_capacity(order.len()),
        sire_idx: Vec::with_capacity(order.len()),
        dam_idx: Vec::with_capacity(order.len()),
        cycle_breaks: Vec::new(),
    };

    for (pos, &node) in order.iter().enumerate() {
        let mut resolve = |slot: usize| -> Option<usize> {
            let parent = parent_at(node, slot)?;
            if position[parent] < pos {
                Some(position[parent])
            } else {
                sorted.cycle_breaks.push((
                    records[node].line_name.clone(),
                    records[parent].line_name.clone(),
                ));
                None
            }
        };
        let sire = resolve(0);
        let dam = resolve(1);

        sorted.ids.push(records[node].line_name.clone());
        sorted.sire_idx.push(sire);
        sorted.dam_idx.push(dam);
    }

    if !sorted.cycle_breaks.is_empty() {
        warn!(
            "pedigree has cycles; {} parent link(s) treated as unknown, e.g. '{}' -> '{}'",
            sorted.cycle_breaks.len(),
            sorted.cycle_breaks[0].1,
            sorted.cycle_breaks[0].0
        );
    }

    sorted
}
