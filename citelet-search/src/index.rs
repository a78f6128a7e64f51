//! In-memory fuzzy title index.
//!
//! Built from merged item records, queried by title. Construction walks and
//! normalizes every title up front; that is the blocking work the protocol
//! exists to keep off the caller's thread.

use serde::{Deserialize, Serialize};

use crate::records::ItemRecord;

/// One query hit.
///
/// Scores are in `[0, 1]` and lower is better; result lists are sorted
/// ascending so the best hit comes first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub record: ItemRecord,
    pub score: f64,
    /// Byte range of the match within the lowercased title, when the match
    /// is contiguous.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<(usize, usize)>,
}

pub struct SearchIndex {
    entries: Vec<Entry>,
}

struct Entry {
    record: ItemRecord,
    haystack: String,
}

impl SearchIndex {
    /// Index every record that has a title; untitled records cannot match
    /// and are left out.
    pub fn build(records: Vec<ItemRecord>) -> Self {
        let entries = records
            .into_iter()
            .filter_map(|record| {
                let haystack = record.title.as_deref()?.to_lowercase();
                Some(Entry { record, haystack })
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rank titles against `query`, best first, at most `limit` hits.
    ///
    /// Contiguous matches always rank above subsequence matches; among
    /// contiguous matches, longer coverage and earlier position win. Ties
    /// fall back to item id so results are stable.
    pub fn query(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .filter_map(|entry| score(entry, &needle))
            .collect();
        hits.sort_by(|a, b| {
            a.score
                .total_cmp(&b.score)
                .then(a.record.item_id.cmp(&b.record.item_id))
        });
        hits.truncate(limit);
        hits
    }
}

/// Score one entry against the lowercased needle, `None` when it misses.
///
/// Substring hits land in `[0, 0.6)`, subsequence hits in `[0.7, 0.9)`, so
/// the two classes never interleave.
fn score(entry: &Entry, needle: &str) -> Option<SearchHit> {
    let haystack = &entry.haystack;
    let length = haystack.len().max(1) as f64;

    if let Some(start) = haystack.find(needle) {
        let coverage = needle.len() as f64 / length;
        let position = start as f64 / length;
        return Some(SearchHit {
            record: entry.record.clone(),
            score: (1.0 - coverage) * 0.5 + position * 0.1,
            matched: Some((start, start + needle.len())),
        });
    }

    is_subsequence(haystack, needle).then(|| SearchHit {
        record: entry.record.clone(),
        score: 0.9 - (needle.len() as f64 / length) * 0.2,
        matched: None,
    })
}

fn is_subsequence(haystack: &str, needle: &str) -> bool {
    let mut rest = haystack.chars();
    needle.chars().all(|wanted| rest.any(|c| c == wanted))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(item_id: i64, title: Option<&str>) -> ItemRecord {
        ItemRecord {
            item_id,
            item_key: format!("KEY{item_id}"),
            title: title.map(String::from),
            date: None,
            creators: Vec::new(),
            citekey: None,
            extra: Default::default(),
        }
    }

    fn index(titles: &[(i64, &str)]) -> SearchIndex {
        SearchIndex::build(
            titles
                .iter()
                .map(|(id, title)| record(*id, Some(title)))
                .collect(),
        )
    }

    #[test]
    fn untitled_records_are_not_indexed() {
        let idx = SearchIndex::build(vec![record(1, Some("Titled")), record(2, None)]);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let idx = index(&[(1, "Quantum Computation and Quantum Information")]);
        let hits = idx.query("QUANTUM", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].matched, Some((0, 7)));
    }

    #[test]
    fn fuller_coverage_ranks_first() {
        let idx = index(&[
            (1, "Attention is all you need in very long form with extra words"),
            (2, "Attention"),
        ]);
        let hits = idx.query("attention", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.item_id, 2);
    }

    #[test]
    fn substring_hits_rank_above_subsequence_hits() {
        let idx = index(&[
            (1, "graph networks"),           // subsequence hit for "gn"
            (2, "aligning gnomes"),          // substring hit for "gn"
        ]);
        let hits = idx.query("gn", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.item_id, 2);
        assert!(hits[0].matched.is_some());
        assert!(hits[1].matched.is_none());
    }

    #[test]
    fn misses_produce_no_hit() {
        let idx = index(&[(1, "Deep residual learning")]);
        assert!(idx.query("zzzz", 10).is_empty());
    }

    #[test]
    fn blank_query_returns_nothing() {
        let idx = index(&[(1, "Anything")]);
        assert!(idx.query("   ", 10).is_empty());
    }

    #[test]
    fn limit_caps_the_result_list() {
        let idx = index(&[(1, "search a"), (2, "search b"), (3, "search c")]);
        assert_eq!(idx.query("search", 2).len(), 2);
    }
}
