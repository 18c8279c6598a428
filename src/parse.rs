//! Helpers for slicing and summarising entry tables

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::types::{Entry, EventKind};

/// Count entries of each kind
pub fn count_by_kind<'a, I>(entries: I) -> BTreeMap<EventKind, usize>
where
    I: IntoIterator<Item = &'a Entry>,
{
    let mut counts = BTreeMap::new();
    for entry in entries {
        *counts.entry(entry.event_kind).or_insert(0) += 1;
    }
    counts
}

/// Keep only entries whose kind is in `allowed`, e.g. `{Meal, Snack}`
pub fn extract_meals(entries: &[Entry], allowed: &BTreeSet<EventKind>) -> Vec<Entry> {
    let (kept, discarded): (Vec<&Entry>, Vec<&Entry>) = entries
        .iter()
        .partition(|entry| allowed.contains(&entry.event_kind));

    debug!(discarded = ?count_by_kind(discarded), "discarding entries");
    info!(kept = ?count_by_kind(kept.iter().copied()), "extracted entries");

    kept.into_iter().cloned().collect()
}
