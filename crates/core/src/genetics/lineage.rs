use std::collections::{BTreeMap, HashSet, VecDeque};

use indexmap::IndexSet;
use log::debug;
use serde::{Deserialize, Serialize};

use super::pedigree::PedigreeIndex;

/// How a parent line is connected to a child line in a [`LineageGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeRole {
    /// Parent is the child's recorded male parent (ancestor walk).
    Male,
    /// Parent is the child's recorded female parent (ancestor walk).
    Female,
    /// Found while walking down from a line to its progeny.
    Descendant,
}

/// A directed parent -> child edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub parent: String,
    pub child: String,
    pub role: EdgeRole,
}

impl RelationshipEdge {
    pub fn new(parent: &str, child: &str, role: EdgeRole) -> Self {
        Self {
            parent: parent.to_string(),
            child: child.to_string(),
            role,
        }
    }
}

/// Result of a lineage traversal.
///
/// `generations` maps a distance (in parent/child steps) from the focal line
/// to the lines first reached at that distance; generation 0 holds the focal
/// line(s). Traversal is breadth-first, so a line reachable through several
/// paths is placed at its shortest distance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LineageGraph {
    /// Discovered lines, in discovery order.
    pub lines: IndexSet<String>,
    /// Parent -> child edges, without repeats.
    pub edges: IndexSet<RelationshipEdge>,
    pub generations: BTreeMap<usize, Vec<String>>,
}

impl LineageGraph {
    pub fn contains(&self, line: &str) -> bool {
        self.lines.contains(line)
    }

    /// Deepest generation reached (0 for an isolated focal line).
    pub fn max_generation(&self) -> usize {
        self.generations.keys().next_back().copied().unwrap_or(0)
    }

    /// First generation a line was placed in.
    pub fn generation_of(&self, line: &str) -> Option<usize> {
        self.generations
            .iter()
            .find(|(_, lines)| lines.iter().any(|l| l == line))
            .map(|(&g, _)| g)
    }

    /// Restrict the graph to generations `0..=depth`.
    ///
    /// Edges are kept only when both endpoints survive.
    pub fn within_depth(&self, depth: usize) -> LineageGraph {
        let generations: BTreeMap<usize, Vec<String>> = self
            .generations
            .range(..=depth)
            .map(|(&g, lines)| (g, lines.clone()))
            .collect();

        let kept: HashSet<&str> = generations
            .values()
            .flatten()
            .map(|l| l.as_str())
            .collect();

        LineageGraph {
            lines: self
                .lines
                .iter()
                .filter(|l| kept.contains(l.as_str()))
                .cloned()
                .collect(),
            edges: self
                .edges
                .iter()
                .filter(|e| kept.contains(e.parent.as_str()) && kept.contains(e.child.as_str()))
                .cloned()
                .collect(),
            generations,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Ancestors,
    Descendants,
}

/// Breadth-first walk from `focal` using an explicit queue.
///
/// A relative is expanded only the first time it enters `lines`, which
/// bounds the walk on cyclic pedigrees.
fn walk(index: &PedigreeIndex<'_>, focal: &str, direction: Direction) -> LineageGraph {
    let mut graph = LineageGraph::default();
    graph.generations.insert(0, vec![focal.to_string()]);

    let mut placed: HashSet<&str> = HashSet::new();
    placed.insert(focal);

    let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
    queue.push_back((focal, 0));

    while let Some((line, depth)) = queue.pop_front() {
        let next: Vec<(&str, RelationshipEdge)> = match direction {
            Direction::Ancestors => {
                let (male, female) = index.known_parents_of(line);
                [(male, EdgeRole::Male), (female, EdgeRole::Female)]
                    .into_iter()
                    .filter_map(|(parent, role)| {
                        parent.map(|p| (p, RelationshipEdge::new(p, line, role)))
                    })
                    .collect()
            }
            Direction::Descendants => index
                .children_of(line)
                .map(|child| {
                    let name = child.line_name.as_str();
                    (name, RelationshipEdge::new(line, name, EdgeRole::Descendant))
                })
                .collect(),
        };

        for (relative, edge) in next {
            graph.edges.insert(edge);
            if graph.lines.insert(relative.to_string()) {
                if placed.insert(relative) {
                    graph
                        .generations
                        .entry(depth + 1)
                        .or_default()
                        .push(relative.to_string());
                }
                queue.push_back((relative, depth + 1));
            }
        }
    }

    graph
}

/// Collect every recorded ancestor of `focal`.
///
/// Parents are followed only when they have a record of their own; other
/// parent names are not edges. A focal line without a record is returned as
/// its own (single) ancestor so callers always get it back as a boundary
/// marker.
///
/// On a cyclic pedigree the walk still terminates; the focal line itself can
/// then appear among its ancestors.
pub fn find_ancestors(index: &PedigreeIndex<'_>, focal: &str) -> LineageGraph {
    if !index.contains(focal) {
        let mut graph = LineageGraph::default();
        graph.lines.insert(focal.to_string());
        graph.generations.insert(0, vec![focal.to_string()]);
        return graph;
    }

    let graph = walk(index, focal, Direction::Ancestors);
    debug!(
        "ancestors of '{}': {} lines, {} edges, {} generations",
        focal,
        graph.lines.len(),
        graph.edges.len(),
        graph.max_generation()
    );
    graph
}

/// Collect every line that descends from `focal` through recorded parents.
pub fn find_descendants(index: &PedigreeIndex<'_>, focal: &str) -> LineageGraph {
    let graph = walk(index, focal, Direction::Descendants);
    debug!(
        "descendants of '{}': {} lines, {} edges",
        focal,
        graph.lines.len(),
        graph.edges.len()
    );
    graph
}

/// Relatives of a set of focal lines: the union of each focal line's
/// ancestors and descendants, plus the focal lines themselves.
///
/// This is the plain ancestors-and-descendants notion of relatives. The
/// ancestors of discovered descendants (for instance the other parent of a
/// focal line's progeny) are **not** added here; matrix building offers that
/// closure separately through [`crate::query::MatrixScope::Relatives`].
///
/// Generations are merged by distance: bucket `d` lists every line that is
/// `d` steps from some focal line, in either direction.
pub fn find_relatives<S: AsRef<str>>(index: &PedigreeIndex<'_>, focal: &[S]) -> LineageGraph {
    let mut lines: IndexSet<String> = IndexSet::new();
    let mut edges: IndexSet<RelationshipEdge> = IndexSet::new();
    let mut merged: BTreeMap<usize, IndexSet<String>> = BTreeMap::new();

    for line in focal {
        lines.insert(line.as_ref().to_string());
    }

    for line in focal {
        let line = line.as_ref();
        for graph in [find_ancestors(index, line), find_descendants(index, line)] {
            lines.extend(graph.lines);
            edges.extend(graph.edges);
            for (g, gen_lines) in graph.generations {
                merged.entry(g).or_default().extend(gen_lines);
            }
        }
    }

    LineageGraph {
        lines,
        edges,
        generations: merged
            .into_iter()
            .map(|(g, set)| (g, set.into_iter().collect()))
            .collect(),
    }
}

/// Recorded ancestors shared by two lines.
pub fn common_ancestors(index: &PedigreeIndex<'_>, a: &str, b: &str) -> IndexSet<String> {
    let of_b = find_ancestors(index, b).lines;
    find_ancestors(index, a)
        .lines
        .into_iter()
        .filter(|line| index.contains(line) && of_b.contains(line))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetics::pedigree::PedigreeTable;

    fn edge(parent: &str, child: &str, role: EdgeRole) -> RelationshipEdge {
        RelationshipEdge::new(parent, child, role)
    }

    /// Three generations with one line used on both sides.
    ///
    ///   G1   G2   G3
    ///    \  /  \  /
    ///     P1    P2
    ///       \  /
    ///        C
    fn three_generation_table() -> PedigreeTable {
        PedigreeTable::from_triples(&[
            ("G1", None, None),
            ("G2", None, None),
            ("G3", None, None),
            ("P1", Some("G1"), Some("G2")),
            ("P2", Some("G2"), Some("G3")),
            ("C", Some("P1"), Some("P2")),
            ("Other", None, None),
        ])
    }

    #[test]
    fn test_ancestors_simple_cross() {
        let table = PedigreeTable::from_triples(&[
            ("L1", None, None),
            ("L2", None, None),
            ("L3", Some("L1"), Some("L2")),
        ]);
        let index = table.index();
        let graph = find_ancestors(&index, "L3");

        assert_eq!(graph.lines.len(), 2);
        assert!(graph.contains("L1"));
        assert!(graph.contains("L2"));
        assert!(!graph.contains("L3"));
        assert_eq!(graph.edges.len(), 2);
        assert!(graph.edges.contains(&edge("L1", "L3", EdgeRole::Male)));
        assert!(graph.edges.contains(&edge("L2", "L3", EdgeRole::Female)));
        assert_eq!(graph.generations[&0], vec!["L3".to_string()]);
        assert_eq!(graph.generations[&1], vec!["L1".to_string(), "L2".to_string()]);
    }

    #[test]
    fn test_ancestors_shared_grandparent_visited_once() {
        let table = three_generation_table();
        let index = table.index();
        let graph = find_ancestors(&index, "C");

        assert_eq!(graph.lines.len(), 5);
        assert_eq!(graph.generations[&1], vec!["P1".to_string(), "P2".to_string()]);
        assert_eq!(
            graph.generations[&2],
            vec!["G1".to_string(), "G2".to_string(), "G3".to_string()]
        );
        // G2 reached twice, both edges kept.
        assert!(graph.edges.contains(&edge("G2", "P1", EdgeRole::Female)));
        assert!(graph.edges.contains(&edge("G2", "P2", EdgeRole::Male)));
        assert_eq!(graph.edges.len(), 6);
        assert_eq!(graph.max_generation(), 2);
        assert_eq!(graph.generation_of("G3"), Some(2));
    }

    #[test]
    fn test_ancestors_of_unrecorded_line_is_boundary_marker() {
        let table = three_generation_table();
        let index = table.index();
        let graph = find_ancestors(&index, "Mystery");

        assert_eq!(graph.lines.iter().collect::<Vec<_>>(), vec!["Mystery"]);
        assert!(graph.edges.is_empty());
        assert_eq!(graph.generations[&0], vec!["Mystery".to_string()]);
    }

    #[test]
    fn test_ancestors_skip_unrecorded_parents() {
        let table = PedigreeTable::from_triples(&[
            ("A", None, None),
            ("B", Some("A"), Some("NotInTable")),
        ]);
        let index = table.index();
        let graph = find_ancestors(&index, "B");
        assert_eq!(graph.lines.len(), 1);
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn test_ancestors_terminates_on_cycle() {
        let table = PedigreeTable::from_triples(&[("A", Some("B"), None), ("B", Some("A"), None)]);
        let index = table.index();
        let graph = find_ancestors(&index, "A");

        assert!(graph.contains("A"));
        assert!(graph.contains("B"));
        assert_eq!(graph.lines.len(), 2);
        assert_eq!(graph.generations[&0], vec!["A".to_string()]);
    }

    #[test]
    fn test_descendants() {
        let table = three_generation_table();
        let index = table.index();
        let graph = find_descendants(&index, "G2");

        assert_eq!(graph.lines.len(), 3);
        assert!(graph.contains("P1"));
        assert!(graph.contains("P2"));
        assert!(graph.contains("C"));
        assert!(graph.edges.contains(&edge("G2", "P1", EdgeRole::Descendant)));
        assert!(graph.edges.contains(&edge("P1", "C", EdgeRole::Descendant)));
        assert!(graph.edges.contains(&edge("P2", "C", EdgeRole::Descendant)));
        assert_eq!(graph.generations[&2], vec!["C".to_string()]);
    }

    #[test]
    fn test_descendants_terminates_on_cycle() {
        let table = PedigreeTable::from_triples(&[("A", Some("B"), None), ("B", Some("A"), None)]);
        let index = table.index();
        let graph = find_descendants(&index, "A");
        assert_eq!(graph.lines.len(), 2);
    }

    #[test]
    fn test_relatives_union() {
        let table = three_generation_table();
        let index = table.index();
        let graph = find_relatives(&index, &["P1"]);

        let mut names: Vec<&str> = graph.lines.iter().map(|s| s.as_str()).collect();
        names.sort_unstable();
        // P2 and G3 are only related through C's other parent.
        assert_eq!(names, vec!["C", "G1", "G2", "P1"]);
        assert!(graph.edges.contains(&edge("P1", "C", EdgeRole::Descendant)));
        assert!(graph.edges.contains(&edge("G1", "P1", EdgeRole::Male)));
        assert_eq!(graph.generations[&0], vec!["P1".to_string()]);
    }

    #[test]
    fn test_relatives_empty_focal_set() {
        let table = three_generation_table();
        let index = table.index();
        let graph = find_relatives::<&str>(&index, &[]);
        assert!(graph.lines.is_empty());
        assert!(graph.edges.is_empty());
        assert!(graph.generations.is_empty());
    }

    #[test]
    fn test_within_depth() {
        let table = three_generation_table();
        let index = table.index();
        let graph = find_ancestors(&index, "C").within_depth(1);

        assert_eq!(graph.lines.len(), 2);
        assert_eq!(graph.max_generation(), 1);
        assert_eq!(graph.edges.len(), 2);
        assert!(graph.edges.iter().all(|e| e.child == "C"));
    }

    #[test]
    fn test_common_ancestors() {
        let table = three_generation_table();
        let index = table.index();
        let shared = common_ancestors(&index, "P1", "P2");
        assert_eq!(shared.into_iter().collect::<Vec<_>>(), vec!["G2".to_string()]);
        assert!(common_ancestors(&index, "P1", "Other").is_empty());
    }
}
