use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize};

/// Parent tokens that mean "no recorded parent", compared case-insensitively.
///
/// Empty and whitespace-only fields are treated the same way.
const UNKNOWN_PARENT_TOKENS: &[&str] = &["na", "nan", "null", "none", "unknown"];

/// Normalise a raw parent field to `None` when it encodes an unknown parent.
///
/// This is the single point where missing parents are recognised; every
/// record built through [`PedigreeRecord::new`], deserialised with serde, or
/// read with [`crate::data::io`] passes through it.
pub fn normalize_parent(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty()
        || UNKNOWN_PARENT_TOKENS
            .iter()
            .any(|token| trimmed.eq_ignore_ascii_case(token))
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn deserialize_parent<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(normalize_parent(raw.as_deref()))
}

fn deserialize_line_name<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().to_string())
}

/// A single pedigree row: a line with its optional male and female parent.
///
/// Serialises with the same field names as the delimited input header
/// (`LineName`, `MaleParent`, `FemaleParent`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PedigreeRecord {
    #[serde(deserialize_with = "deserialize_line_name")]
    pub line_name: String,
    #[serde(default, deserialize_with = "deserialize_parent")]
    pub male_parent: Option<String>,
    #[serde(default, deserialize_with = "deserialize_parent")]
    pub female_parent: Option<String>,
}

impl PedigreeRecord {
    /// Build a record, normalising both parent fields.
    pub fn new(line_name: &str, male_parent: Option<&str>, female_parent: Option<&str>) -> Self {
        Self {
            line_name: line_name.trim().to_string(),
            male_parent: normalize_parent(male_parent),
            female_parent: normalize_parent(female_parent),
        }
    }

    /// A record with no recorded parents.
    pub fn founder(line_name: &str) -> Self {
        Self::new(line_name, None, None)
    }

    /// Whether both parents are unknown.
    pub fn is_founder(&self) -> bool {
        self.male_parent.is_none() && self.female_parent.is_none()
    }

    /// Recorded parent names, male first.
    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.male_parent
            .as_deref()
            .into_iter()
            .chain(self.female_parent.as_deref())
    }
}

/// A planned cross that does not exist yet, used to preview the kinship of
/// potential progeny against the recorded pedigree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HypotheticalCross {
    pub name: String,
    pub female_parent: String,
    pub male_parent: String,
}

/// Ordered pedigree table, as loaded from an external source.
///
/// The table keeps every row it is given, including rows that repeat a line
/// name. Duplicate handling happens when the table is indexed; see
/// [`PedigreeIndex`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PedigreeTable {
    records: Vec<PedigreeRecord>,
}

impl PedigreeTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<PedigreeRecord>) -> Self {
        Self { records }
    }

    /// Build a table from (line, male parent, female parent) triples.
    pub fn from_triples(triples: &[(&str, Option<&str>, Option<&str>)]) -> Self {
        triples
            .iter()
            .map(|&(line, male, female)| PedigreeRecord::new(line, male, female))
            .collect()
    }

    /// Number of rows, duplicates included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PedigreeRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PedigreeRecord> {
        self.records.iter()
    }

    /// Append a single row.
    pub fn push(&mut self, record: PedigreeRecord) {
        self.records.push(record);
    }

    /// Wholesale replacement (e.g. a new upload). Returns the previous rows.
    pub fn replace(&mut self, records: Vec<PedigreeRecord>) -> Vec<PedigreeRecord> {
        std::mem::replace(&mut self.records, records)
    }

    /// Index the table for O(1) parent and child lookups.
    pub fn index(&self) -> PedigreeIndex<'_> {
        PedigreeIndex::new(self)
    }

    /// Content hash of the table, suitable as a cache key for results
    /// computed from this snapshot within the same process.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.records.hash(&mut hasher);
        hasher.finish()
    }

    /// Drop lines that have no parents and are nobody's parent.
    ///
    /// Such lines carry no relationship information: in every matrix they
    /// are unrelated to all other lines.
    pub fn without_isolated_founders(&self) -> Self {
        let referenced: std::collections::HashSet<&str> =
            self.records.iter().flat_map(|r| r.parents()).collect();

        self.records
            .iter()
            .filter(|r| !r.is_founder() || referenced.contains(r.line_name.as_str()))
            .cloned()
            .collect()
    }

    /// Return a copy of the table with planned crosses appended.
    pub fn with_hypothetical_progeny(&self, crosses: &[HypotheticalCross]) -> Self {
        let mut table = self.clone();
        table.extend(crosses.iter().map(|c| {
            PedigreeRecord::new(&c.name, Some(&c.male_parent), Some(&c.female_parent))
        }));
        table
    }
}

impl FromIterator<PedigreeRecord> for PedigreeTable {
    fn from_iter<I: IntoIterator<Item = PedigreeRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl Extend<PedigreeRecord> for PedigreeTable {
    fn extend<I: IntoIterator<Item = PedigreeRecord>>(&mut self, iter: I) {
        self.records.extend(iter);
    }
}

impl<'a> IntoIterator for &'a PedigreeTable {
    type Item = &'a PedigreeRecord;
    type IntoIter = std::slice::Iter<'a, PedigreeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// A row that was ignored because an earlier row used the same line name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateLine {
    pub line_name: String,
    /// Table row that is used for this line.
    pub kept_row: usize,
    /// Table row that was ignored.
    pub ignored_row: usize,
}

/// Read-only index over a [`PedigreeTable`] snapshot.
///
/// Duplicate policy: the **first** row for a line name wins. Later rows with
/// the same name are ignored by every lookup and reported through
/// [`PedigreeIndex::duplicates`] (and a log warning).
#[derive(Debug, Clone)]
pub struct PedigreeIndex<'a> {
    table: &'a PedigreeTable,
    /// Line name to the table row that defines it.
    positions: HashMap<&'a str, usize>,
    /// Parent name to the rows of its children, in table order.
    children: HashMap<&'a str, Vec<usize>>,
    /// Defining rows in table order.
    order: Vec<usize>,
    duplicates: Vec<DuplicateLine>,
}

impl<'a> PedigreeIndex<'a> {
    pub fn new(table: &'a PedigreeTable) -> Self {
        let mut positions: HashMap<&'a str, usize> = HashMap::with_capacity(table.len());
        let mut order = Vec::with_capacity(table.len());
        let mut duplicates = Vec::new();

        for (row, record) in table.records.iter().enumerate() {
            match positions.get(record.line_name.as_str()) {
                Some(&kept_row) => duplicates.push(DuplicateLine {
                    line_name: record.line_name.clone(),
                    kept_row,
                    ignored_row: row,
                }),
                None => {
                    positions.insert(record.line_name.as_str(), row);
                    order.push(row);
                }
            }
        }

        let mut children: HashMap<&'a str, Vec<usize>> = HashMap::new();
        for &row in &order {
            let record = &table.records[row];
            if let Some(male) = record.male_parent.as_deref() {
                children.entry(male).or_default().push(row);
            }
            // A selfed line lists the same parent twice; index the child once.
            if let Some(female) = record.female_parent.as_deref() {
                if record.male_parent.as_deref() != Some(female) {
                    children.entry(female).or_default().push(row);
                }
            }
        }

        if !duplicates.is_empty() {
            warn!(
                "{} duplicate line name row(s) ignored (first occurrence wins), e.g. '{}'",
                duplicates.len(),
                duplicates[0].line_name
            );
            for dup in &duplicates {
                debug!(
                    "duplicate line '{}': keeping row {}, ignoring row {}",
                    dup.line_name, dup.kept_row, dup.ignored_row
                );
            }
        }

        Self {
            table,
            positions,
            children,
            order,
            duplicates,
        }
    }

    /// The indexed table snapshot.
    pub fn table(&self) -> &'a PedigreeTable {
        self.table
    }

    /// Number of distinct lines.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, line: &str) -> bool {
        self.positions.contains_key(line)
    }

    /// The defining record of a line.
    pub fn record(&self, line: &str) -> Option<&'a PedigreeRecord> {
        self.positions
            .get(line)
            .map(|&row| &self.table.records[row])
    }

    /// Recorded (male, female) parents of a line; `(None, None)` if the line
    /// has no record.
    pub fn parents_of(&self, line: &str) -> (Option<&'a str>, Option<&'a str>) {
        match self.record(line) {
            Some(rec) => (rec.male_parent.as_deref(), rec.female_parent.as_deref()),
            None => (None, None),
        }
    }

    /// Like [`PedigreeIndex::parents_of`], but parents without a record of
    /// their own are reported as unknown.
    pub fn known_parents_of(&self, line: &str) -> (Option<&'a str>, Option<&'a str>) {
        let (male, female) = self.parents_of(line);
        (
            male.filter(|p| self.contains(p)),
            female.filter(|p| self.contains(p)),
        )
    }

    /// Records listing `line` as male or female parent, in table order.
    pub fn children_of(&self, line: &str) -> impl Iterator<Item = &'a PedigreeRecord> + '_ {
        let table = self.table;
        self.children
            .get(line)
            .into_iter()
            .flatten()
            .map(move |&row| &table.records[row])
    }

    /// Defining records in table order (ignored duplicates excluded).
    pub fn records(&self) -> impl Iterator<Item = &'a PedigreeRecord> + '_ {
        let table = self.table;
        self.order.iter().map(move |&row| &table.records[row])
    }

    /// Distinct line names in table order.
    pub fn line_names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.records().map(|r| r.line_name.as_str())
    }

    /// Defining records of the given lines, in table order. Names without a
    /// record are skipped.
    pub fn subset<S: AsRef<str>>(&self, lines: &[S]) -> Vec<&'a PedigreeRecord> {
        let mut rows: Vec<usize> = lines
            .iter()
            .filter_map(|l| self.positions.get(l.as_ref()).copied())
            .collect();
        rows.sort_unstable();
        rows.dedup();
        rows.into_iter().map(|row| &self.table.records[row]).collect()
    }

    /// Rows ignored under the first-occurrence-wins policy.
    pub fn duplicates(&self) -> &[DuplicateLine] {
        &self.duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_table() -> PedigreeTable {
        PedigreeTable::from_triples(&[
            ("L1", None, None),
            ("L2", None, None),
            ("L3", Some("L1"), Some("L2")),
        ])
    }

    #[test]
    fn test_normalize_parent_variants() {
        assert_eq!(normalize_parent(None), None);
        assert_eq!(normalize_parent(Some("")), None);
        assert_eq!(normalize_parent(Some("   ")), None);
        assert_eq!(normalize_parent(Some("NA")), None);
        assert_eq!(normalize_parent(Some("nan")), None);
        assert_eq!(normalize_parent(Some("Unknown")), None);
        assert_eq!(normalize_parent(Some("UNKNOWN")), None);
        assert_eq!(normalize_parent(Some(" CP 96-1252 ")), Some("CP 96-1252".to_string()));
        assert_eq!(normalize_parent(Some("0")), Some("0".to_string()));
    }

    #[test]
    fn test_parents_of() {
        let table = simple_table();
        let index = table.index();
        assert_eq!(index.len(), 3);
        assert_eq!(index.parents_of("L3"), (Some("L1"), Some("L2")));
        assert_eq!(index.parents_of("L1"), (None, None));
        assert_eq!(index.parents_of("missing"), (None, None));
    }

    #[test]
    fn test_known_parents_ignores_unresolved() {
        let table = PedigreeTable::from_triples(&[
            ("A", None, None),
            ("B", Some("A"), Some("Ghost")),
        ]);
        let index = table.index();
        assert_eq!(index.parents_of("B"), (Some("A"), Some("Ghost")));
        assert_eq!(index.known_parents_of("B"), (Some("A"), None));
    }

    #[test]
    fn test_unknown_token_normalized_on_construction() {
        let table = PedigreeTable::from_triples(&[("X", Some("unknown"), Some("NaN"))]);
        assert!(table.records()[0].is_founder());
    }

    #[test]
    fn test_duplicate_first_occurrence_wins() {
        let table = PedigreeTable::from_triples(&[
            ("P", None, None),
            ("Q", None, None),
            ("C", Some("P"), None),
            ("C", Some("Q"), Some("P")),
        ]);
        let index = table.index();

        assert_eq!(table.len(), 4);
        assert_eq!(index.len(), 3);
        assert_eq!(index.parents_of("C"), (Some("P"), None));
        assert_eq!(
            index.duplicates(),
            &[DuplicateLine {
                line_name: "C".to_string(),
                kept_row: 2,
                ignored_row: 3,
            }]
        );
        // The ignored row does not contribute child links.
        assert_eq!(index.children_of("Q").count(), 0);
    }

    #[test]
    fn test_children_of_selfed_line_listed_once() {
        let table = PedigreeTable::from_triples(&[
            ("A", None, None),
            ("S1", Some("A"), Some("A")),
            ("X", None, Some("A")),
        ]);
        let index = table.index();
        let kids: Vec<&str> = index.children_of("A").map(|r| r.line_name.as_str()).collect();
        assert_eq!(kids, vec!["S1", "X"]);
    }

    #[test]
    fn test_subset_in_table_order() {
        let table = simple_table();
        let index = table.index();
        let subset = index.subset(&["L3", "nope", "L1", "L3"]);
        let names: Vec<&str> = subset.iter().map(|r| r.line_name.as_str()).collect();
        assert_eq!(names, vec!["L1", "L3"]);
    }

    #[test]
    fn test_without_isolated_founders() {
        let table = PedigreeTable::from_triples(&[
            ("L1", None, None),
            ("L2", None, None),
            ("Lonely", None, None),
            ("L3", Some("L1"), Some("L2")),
        ]);
        let filtered = table.without_isolated_founders();
        let names: Vec<&str> = filtered.iter().map(|r| r.line_name.as_str()).collect();
        assert_eq!(names, vec!["L1", "L2", "L3"]);
    }

    #[test]
    fn test_with_hypothetical_progeny_leaves_original() {
        let table = simple_table();
        let preview = table.with_hypothetical_progeny(&[HypotheticalCross {
            name: "NEW".to_string(),
            female_parent: "L3".to_string(),
            male_parent: "L1".to_string(),
        }]);
        assert_eq!(table.len(), 3);
        assert_eq!(preview.len(), 4);
        assert_eq!(preview.index().parents_of("NEW"), (Some("L1"), Some("L3")));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = simple_table();
        let mut b = simple_table();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.push(PedigreeRecord::founder("L4"));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_replace_returns_previous_rows() {
        let mut table = simple_table();
        let old = table.replace(vec![PedigreeRecord::founder("Z")]);
        assert_eq!(old.len(), 3);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_serde_uses_header_names_and_normalizes() {
        let json = r#"[{"LineName":"A","MaleParent":"unknown","FemaleParent":null},
                       {"LineName":"B","MaleParent":"A"}]"#;
        let table: PedigreeTable = serde_json::from_str(json).unwrap();
        assert!(table.records()[0].is_founder());
        assert_eq!(table.records()[1].male_parent.as_deref(), Some("A"));
        assert_eq!(table.records()[1].female_parent, None);
    }

    #[test]
    fn test_serde_trims_line_names() {
        let json = r#"[{"LineName":" A ","MaleParent":null,"FemaleParent":null},
                       {"LineName":"B","MaleParent":"A","FemaleParent":null}]"#;
        let table: PedigreeTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.records()[0].line_name, "A");
        let index = table.index();
        assert!(index.contains("A"));
        assert_eq!(index.known_parents_of("B"), (Some("A"), None));
    }
}
