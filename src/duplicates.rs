//! Duplicate entry detection
//!
//! A watch entry is a duplicate when the participant's previous entry has the same
//! kind, portion size, utensil and location and was logged less than the threshold
//! earlier. Comparison happens strictly within one participant's stream.

use chrono::Duration;

use crate::error::CleanError;
use crate::stream::{partition, ParticipantStream};
use crate::types::Entry;

/// Default maximum gap between duplicate entries, in minutes
pub const DEFAULT_DUPLICATE_MINUTES: i64 = 5;

/// Detector for repeated consecutive entries
#[derive(Debug, Clone, Copy)]
pub struct DuplicateDetector {
    threshold: Duration,
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_DUPLICATE_MINUTES))
    }
}

impl DuplicateDetector {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    /// Threshold in whole minutes; negative or out-of-range values are rejected
    pub fn with_threshold_minutes(minutes: i64) -> Result<Self, CleanError> {
        threshold_minutes(minutes).map(Self::new)
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Boolean mask aligned with `entries`, true for each duplicate
    ///
    /// Each participant's entries must already be in timestamp order.
    pub fn detect(&self, entries: &[Entry]) -> Result<Vec<bool>, CleanError> {
        let mut mask = vec![false; entries.len()];

        for stream in partition(entries) {
            stream.check_sorted()?;
            for (pos, duplicate) in self.detect_stream(&stream) {
                mask[pos] = duplicate;
            }
        }

        Ok(mask)
    }

    fn detect_stream(&self, stream: &ParticipantStream<'_>) -> Vec<(usize, bool)> {
        let mut previous: Option<&Entry> = None;
        stream
            .iter()
            .map(|(pos, entry)| {
                let duplicate = previous.is_some_and(|prev| self.is_repeat(prev, entry));
                previous = Some(entry);
                (pos, duplicate)
            })
            .collect()
    }

    fn is_repeat(&self, prev: &Entry, entry: &Entry) -> bool {
        entry.event_kind == prev.event_kind
            && same_attribute(&prev.portion_size, &entry.portion_size)
            && same_attribute(&prev.utensil, &entry.utensil)
            && same_attribute(&prev.location, &entry.location)
            && entry.timestamp - prev.timestamp < self.threshold
    }
}

/// Duplicate threshold as a duration
pub fn threshold_minutes(minutes: i64) -> Result<Duration, CleanError> {
    if minutes < 0 {
        return Err(CleanError::InvalidOption(format!(
            "duplicate threshold must not be negative: {} minutes",
            minutes
        )));
    }
    Duration::try_minutes(minutes).ok_or_else(|| {
        CleanError::InvalidOption(format!("duplicate threshold out of range: {} minutes", minutes))
    })
}

/// Missing attributes never match, not even each other
fn same_attribute(a: &Option<String>, b: &Option<String>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if x == y)
}

/// Detect duplicates with the default five-minute threshold
pub fn detect(entries: &[Entry]) -> Result<Vec<bool>, CleanError> {
    DuplicateDetector::default().detect(entries)
}
