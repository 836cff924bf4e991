//! Per-session series count reconciliation

use super::classifier::ClassificationResult;
use crate::config::TagSet;
use serde::Serialize;
use std::collections::BTreeMap;

/// A tag whose observed series count differs from its declared `Count`
///
/// Advisory only: a mismatch never fails a classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountMismatch {
    pub tag: String,
    pub expected: u32,
    pub observed: usize,
}

/// Counts matches per tag across a session
///
/// A series counts once for each tag it matched, so ambiguous series count
/// toward every one of their tags.
pub fn count_matches<'a, I>(results: I) -> BTreeMap<String, usize>
where
    I: IntoIterator<Item = &'a ClassificationResult>,
{
    let mut counts = BTreeMap::new();
    for result in results {
        for tag in result.tags() {
            *counts.entry(tag.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

/// Compares observed counts with the declared `Count` of every active tag
///
/// Tags that declare no `Count` are skipped. Active tags never observed are
/// treated as observed zero times.
pub fn reconcile_counts(matches_per_tag: &BTreeMap<String, usize>, tags: &TagSet) -> Vec<CountMismatch> {
    tags.active()
        .filter_map(|def| {
            let expected = def.count?;
            let observed = matches_per_tag.get(&def.name).copied().unwrap_or(0);
            (observed != expected as usize).then(|| CountMismatch {
                tag: def.name.clone(),
                expected,
                observed,
            })
        })
        .collect()
}
