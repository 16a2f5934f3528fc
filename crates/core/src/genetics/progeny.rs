use std::collections::HashSet;

use serde::Serialize;

use super::lineage::EdgeRole;
use super::pedigree::{PedigreeIndex, PedigreeRecord};

/// A child of a queried parent, with the role that parent played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progeny<'a> {
    pub record: &'a PedigreeRecord,
    /// `Male` or `Female`; a selfed child reports `Male`.
    pub role: EdgeRole,
}

/// Lines produced by crossing `a` and `b`, in either direction.
pub fn progeny_of_cross<'a>(
    index: &PedigreeIndex<'a>,
    a: &str,
    b: &str,
) -> Vec<&'a PedigreeRecord> {
    index
        .children_of(a)
        .filter(|rec| {
            let (male, female) = (rec.male_parent.as_deref(), rec.female_parent.as_deref());
            (male == Some(a) && female == Some(b)) || (male == Some(b) && female == Some(a))
        })
        .collect()
}

/// Every line that lists `parent` as male or female parent.
pub fn progeny_of_parent<'a>(index: &PedigreeIndex<'a>, parent: &str) -> Vec<Progeny<'a>> {
    index
        .children_of(parent)
        .map(|record| Progeny {
            record,
            role: if record.male_parent.as_deref() == Some(parent) {
                EdgeRole::Male
            } else {
                EdgeRole::Female
            },
        })
        .collect()
}

/// Female-parent chain of a line: mother, grandmother through the female
/// side, and so on, nearest first.
///
/// A parent without a record of its own ends the chain. A repeated name also
/// ends it, so cycles terminate.
pub fn maternal_line(index: &PedigreeIndex<'_>, line: &str) -> Vec<String> {
    uniparental_line(index, line, |rec| rec.female_parent.as_deref())
}

/// Male-parent chain of a line, nearest first. See [`maternal_line`].
pub fn paternal_line(index: &PedigreeIndex<'_>, line: &str) -> Vec<String> {
    uniparental_line(index, line, |rec| rec.male_parent.as_deref())
}

fn uniparental_line<'a>(
    index: &PedigreeIndex<'a>,
    line: &str,
    parent: impl Fn(&'a PedigreeRecord) -> Option<&'a str>,
) -> Vec<String> {
    let mut chain = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    seen.insert(line);

    let mut current = index.record(line);
    while let Some(next) = current.and_then(&parent) {
        if !seen.insert(next) {
            break;
        }
        chain.push(next.to_string());
        current = index.record(next);
    }
    chain
}
