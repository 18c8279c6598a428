//! Per-participant event streams
//!
//! Entries are held in one table; a [`ParticipantStream`] is an ordered view of
//! the positions in that table belonging to one participant. Stages compute
//! per-position results on each stream and write them back by table position,
//! so the assembled output always lines up with the input table.

use std::collections::BTreeMap;

use crate::error::CleanError;
use crate::types::Entry;

/// Ordered view over one participant's entries
#[derive(Debug, Clone)]
pub struct ParticipantStream<'a> {
    pub participant_id: i64,
    table: &'a [Entry],
    positions: Vec<usize>,
}

impl<'a> ParticipantStream<'a> {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Entry at stream index `i`
    pub fn get(&self, i: usize) -> Option<&'a Entry> {
        self.positions.get(i).map(|&pos| &self.table[pos])
    }

    /// Table position of stream index `i`
    pub fn position(&self, i: usize) -> usize {
        self.positions[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &'a Entry)> + '_ {
        self.positions.iter().map(move |&pos| (pos, &self.table[pos]))
    }

    /// Fail unless timestamps never decrease along the stream
    pub fn check_sorted(&self) -> Result<(), CleanError> {
        for pair in self.positions.windows(2) {
            let (prev, next) = (&self.table[pair[0]], &self.table[pair[1]]);
            if next.timestamp < prev.timestamp {
                return Err(CleanError::Unsorted {
                    participant_id: self.participant_id,
                    row_id: next.row_id,
                });
            }
        }
        Ok(())
    }
}

/// Group table positions by participant, preserving table order within each group
///
/// Streams are returned in ascending participant id so that every run visits
/// participants in the same order.
pub fn partition(table: &[Entry]) -> Vec<ParticipantStream<'_>> {
    let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (pos, entry) in table.iter().enumerate() {
        groups.entry(entry.participant_id).or_default().push(pos);
    }

    groups
        .into_iter()
        .map(|(participant_id, positions)| ParticipantStream {
            participant_id,
            table,
            positions,
        })
        .collect()
}

/// Sort entries by timestamp, breaking ties by ingestion order
pub fn sort_entries(entries: &mut [Entry]) {
    entries.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.row_id.cmp(&b.row_id))
    });
}
