//! Flagging of entries logged during catch-up periods
//!
//! Three independent left-to-right passes run over each participant's stream,
//! each looking for its own kind of categorized start marker:
//!
//! 1. bounded (Normal/Early/Late): flag everything up to the matching end
//! 2. long: validate the fixed `No response`, entry, `Catch-up end` continuation
//! 3. open-ended: flag intake entries logged within five minutes of the start
//!
//! Flags are only ever added, and never placed on marker rows.

use chrono::{Duration, NaiveDateTime};
use tracing::warn;

use crate::error::CleanError;
use crate::stream::{partition, ParticipantStream};
use crate::types::{CatchupCategory, Entry, EventKind};

/// An open-ended period ends once this much time has passed
pub const OPEN_ENDED_TIMEOUT_MINUTES: i64 = 30;

/// Intake entries this close to an open-ended start belong to its period
pub const OPEN_ENDED_WINDOW_MINUTES: i64 = 5;

/// Read head over a participant stream
#[derive(Debug)]
pub struct StreamCursor<'s, 'a> {
    stream: &'s ParticipantStream<'a>,
    index: usize,
}

impl<'s, 'a> StreamCursor<'s, 'a> {
    pub fn new(stream: &'s ParticipantStream<'a>, index: usize) -> Self {
        Self { stream, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Entry under the read head, `None` past the end of the stream
    pub fn current(&self) -> Option<&'a Entry> {
        self.stream.get(self.index)
    }

    /// Table position under the read head
    pub fn position(&self) -> Option<usize> {
        (self.index < self.stream.len()).then(|| self.stream.position(self.index))
    }

    /// Move one entry forward and return the entry now under the read head
    pub fn advance(&mut self) -> Option<&'a Entry> {
        self.index += 1;
        self.current()
    }
}

/// Flag entries inside catch-up periods
///
/// `categories` must be aligned with `entries`, as produced by
/// [`categorize`](super::categorize).
pub fn flag(
    entries: &[Entry],
    categories: &[Option<CatchupCategory>],
) -> Result<Vec<bool>, CleanError> {
    if entries.len() != categories.len() {
        return Err(CleanError::LengthMismatch(format!(
            "{} entries but {} categories",
            entries.len(),
            categories.len()
        )));
    }

    let mut flags = vec![false; entries.len()];
    for stream in partition(entries) {
        stream.check_sorted()?;
        flag_bounded(&stream, categories, &mut flags);
        validate_long(&stream, categories)?;
        flag_open_ended(&stream, categories, &mut flags)?;
    }

    Ok(flags)
}

/// Pass 1: flag every non-marker entry between a bounded start and its end
pub fn flag_bounded(
    stream: &ParticipantStream<'_>,
    categories: &[Option<CatchupCategory>],
    flags: &mut [bool],
) {
    let mut inside = false;
    for (position, entry) in stream.iter() {
        match entry.event_kind {
            EventKind::CatchupStart => {
                inside = categories[position].is_some_and(|c| c.is_bounded());
            }
            EventKind::CatchupEnd => inside = false,
            _ if inside => flags[position] = true,
            _ => {}
        }
    }
}

/// Pass 2: check the stream shape following every long start
///
/// The start must be followed by `No response`, one entry that is not treated
/// as part of the catch-up, and then `Catch-up end`. Nothing is flagged.
pub fn validate_long(
    stream: &ParticipantStream<'_>,
    categories: &[Option<CatchupCategory>],
) -> Result<(), CleanError> {
    for index in starts_with(stream, categories, CatchupCategory::Long) {
        let mut cursor = StreamCursor::new(stream, index);
        let Some(start) = cursor.current() else {
            continue;
        };
        let shape_error = |at: Option<NaiveDateTime>, message: String| {
            CleanError::LongCatchupShape {
                participant_id: stream.participant_id,
                timestamp: at.unwrap_or(start.timestamp),
                message,
            }
        };

        match cursor.advance() {
            Some(entry) if entry.event_kind == EventKind::NoResponse => {}
            Some(entry) => {
                return Err(shape_error(
                    Some(entry.timestamp),
                    format!("expected No response, found {}", entry.event_kind),
                ))
            }
            None => return Err(shape_error(None, "stream ended after start".to_string())),
        }

        match cursor.advance() {
            Some(entry) => warn!(
                participant_id = stream.participant_id,
                timestamp = %entry.timestamp,
                event_kind = %entry.event_kind,
                "entry inside long catch-up is not treated as a catch-up entry"
            ),
            None => {
                return Err(shape_error(
                    None,
                    "stream ended after No response".to_string(),
                ))
            }
        }

        match cursor.advance() {
            Some(entry) if entry.event_kind == EventKind::CatchupEnd => {}
            Some(entry) => {
                return Err(shape_error(
                    Some(entry.timestamp),
                    format!("expected Catch-up end, found {}", entry.event_kind),
                ))
            }
            None => {
                return Err(shape_error(
                    None,
                    "stream ended before Catch-up end".to_string(),
                ))
            }
        }
    }

    Ok(())
}

/// Pass 3: flag intake entries logged during open-ended periods
///
/// Scanning from each open-ended start, the first matching rule applies:
/// `No catch-up`, `No response`, more than 30 minutes since the start, or a
/// start with a decided (not open-ended) category all end the period; an intake
/// entry within five minutes of the start is flagged and the scan continues
/// after it. Anything else is an unhandled stream shape.
pub fn flag_open_ended(
    stream: &ParticipantStream<'_>,
    categories: &[Option<CatchupCategory>],
    flags: &mut [bool],
) -> Result<(), CleanError> {
    let timeout = Duration::minutes(OPEN_ENDED_TIMEOUT_MINUTES);
    let window = Duration::minutes(OPEN_ENDED_WINDOW_MINUTES);

    for index in starts_with(stream, categories, CatchupCategory::OpenEnded) {
        let mut cursor = StreamCursor::new(stream, index);
        let Some(start) = cursor.current().map(|e| e.timestamp) else {
            continue;
        };

        while let Some(entry) = cursor.advance() {
            let elapsed = entry.timestamp - start;
            let category = cursor.position().and_then(|pos| categories[pos]);

            match entry.event_kind {
                EventKind::NoCatchup | EventKind::NoResponse => break,
                _ if elapsed > timeout => break,
                EventKind::CatchupStart if category != Some(CatchupCategory::OpenEnded) => break,
                kind if kind.is_intake() && elapsed <= window => {
                    if let Some(pos) = cursor.position() {
                        flags[pos] = true;
                    }
                }
                kind => {
                    return Err(CleanError::OpenEndedShape {
                        participant_id: stream.participant_id,
                        timestamp: entry.timestamp,
                        message: format!(
                            "{} logged {} minutes after the open-ended catch-up",
                            kind,
                            elapsed.num_minutes()
                        ),
                    })
                }
            }
        }
    }

    Ok(())
}

/// Stream indices of start markers with the given category
fn starts_with(
    stream: &ParticipantStream<'_>,
    categories: &[Option<CatchupCategory>],
    category: CatchupCategory,
) -> Vec<usize> {
    stream
        .iter()
        .enumerate()
        .filter(|(_, (position, entry))| {
            entry.event_kind == EventKind::CatchupStart && categories[*position] == Some(category)
        })
        .map(|(index, _)| index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catchup::categorize;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn at(hour: u32, min: u32, sec: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 3, 2)
            .unwrap()
            .and_hms_opt(hour, min, sec)
            .unwrap()
    }

    fn stream(events: &[(EventKind, NaiveDateTime)]) -> Vec<Entry> {
        events
            .iter()
            .enumerate()
            .map(|(i, (kind, time))| Entry::new(i, 1, *time, *kind))
            .collect()
    }

    fn categorize_and_flag(entries: &[Entry]) -> Result<Vec<bool>, CleanError> {
        let categorization = categorize(entries)?;
        flag(entries, &categorization.categories)
    }

    #[test]
    fn test_bounded_period_flags_entries_until_end() {
        let entries = stream(&[
            (EventKind::Meal, at(7, 30, 0)),
            (EventKind::CatchupStart, at(8, 0, 0)),
            (EventKind::Meal, at(8, 0, 10)),
            (EventKind::NoFoodDrink, at(8, 0, 20)),
            (EventKind::CatchupEnd, at(8, 0, 40)),
            (EventKind::Snack, at(8, 30, 0)),
        ]);

        assert_eq!(
            categorize_and_flag(&entries).unwrap(),
            vec![false, false, true, true, false, false]
        );
    }

    #[test]
    fn test_early_and_late_periods_flag_like_normal() {
        let entries = stream(&[
            (EventKind::CatchupStart, at(7, 0, 0)),
            (EventKind::Drink, at(7, 0, 10)),
            (EventKind::CatchupEnd, at(7, 0, 30)),
            (EventKind::CatchupStart, at(9, 0, 0)),
            (EventKind::Snack, at(9, 0, 10)),
            (EventKind::CatchupEnd, at(9, 0, 30)),
        ]);

        assert_eq!(
            categorize_and_flag(&entries).unwrap(),
            vec![false, true, false, false, true, false]
        );
    }

    #[test]
    fn test_open_ended_meal_within_five_minutes() {
        // Never closed, so open-ended; No catch-up ends the scan
        let entries = stream(&[
            (EventKind::CatchupStart, at(9, 0, 0)),
            (EventKind::Meal, at(9, 3, 0)),
            (EventKind::NoCatchup, at(9, 10, 0)),
        ]);

        let categorization = categorize(&entries).unwrap();
        assert_eq!(categorization.categories[0], Some(CatchupCategory::OpenEnded));
        assert_eq!(
            flag(&entries, &categorization.categories).unwrap(),
            vec![false, true, false]
        );
    }

    #[test]
    fn test_open_ended_flags_every_intake_within_window() {
        let entries = stream(&[
            (EventKind::CatchupStart, at(9, 0, 0)),
            (EventKind::Meal, at(9, 2, 0)),
            (EventKind::Drink, at(9, 4, 0)),
            (EventKind::Snack, at(9, 5, 0)),
            (EventKind::NoCatchup, at(12, 0, 0)),
        ]);

        assert_eq!(
            categorize_and_flag(&entries).unwrap(),
            vec![false, true, true, true, false]
        );
    }

    #[test]
    fn test_open_ended_window_measured_from_start() {
        // 09:08 is within five minutes of the meal but not of the start
        let entries = stream(&[
            (EventKind::CatchupStart, at(9, 0, 0)),
            (EventKind::Meal, at(9, 4, 0)),
            (EventKind::Drink, at(9, 8, 0)),
        ]);
        assert!(matches!(
            categorize_and_flag(&entries),
            Err(CleanError::OpenEndedShape { .. })
        ));
    }

    #[test]
    fn test_open_ended_ends_on_no_response_and_timeout() {
        let entries = stream(&[
            (EventKind::CatchupStart, at(9, 0, 0)),
            (EventKind::NoResponse, at(9, 1, 0)),
            (EventKind::Meal, at(9, 2, 0)),
        ]);
        assert_eq!(
            categorize_and_flag(&entries).unwrap(),
            vec![false, false, false]
        );

        let entries = stream(&[
            (EventKind::CatchupStart, at(9, 0, 0)),
            (EventKind::NoFoodDrink, at(9, 31, 0)),
        ]);
        assert_eq!(categorize_and_flag(&entries).unwrap(), vec![false, false]);
    }

    #[test]
    fn test_open_ended_ends_at_decided_start() {
        let entries = stream(&[
            (EventKind::CatchupStart, at(9, 0, 0)),
            (EventKind::Meal, at(9, 1, 0)),
            (EventKind::CatchupStart, at(9, 2, 0)),
            (EventKind::Snack, at(9, 2, 10)),
            (EventKind::CatchupEnd, at(9, 2, 30)),
        ]);

        let categorization = categorize(&entries).unwrap();
        assert_eq!(categorization.categories[0], Some(CatchupCategory::OpenEnded));
        assert_eq!(categorization.categories[2], Some(CatchupCategory::Late));
        // The meal belongs to the open-ended period, the snack to the late one
        assert_eq!(
            flag(&entries, &categorization.categories).unwrap(),
            vec![false, true, false, true, false]
        );
    }

    #[test]
    fn test_open_ended_unhandled_shape_is_fatal() {
        // A meal more than five but less than thirty minutes later
        let entries = stream(&[
            (EventKind::CatchupStart, at(9, 0, 0)),
            (EventKind::Meal, at(9, 10, 0)),
        ]);
        assert!(matches!(
            categorize_and_flag(&entries),
            Err(CleanError::OpenEndedShape { .. })
        ));
    }

    #[test]
    fn test_open_ended_into_open_ended_start_is_fatal() {
        // The first start is superseded and the second is left open, so both are open-ended
        let entries = stream(&[
            (EventKind::CatchupStart, at(9, 0, 0)),
            (EventKind::CatchupStart, at(9, 2, 0)),
        ]);
        let categorization = categorize(&entries).unwrap();
        assert_eq!(
            categorization.categories,
            vec![Some(CatchupCategory::OpenEnded), Some(CatchupCategory::OpenEnded)]
        );

        match flag(&entries, &categorization.categories) {
            Err(CleanError::OpenEndedShape { timestamp, .. }) => {
                assert_eq!(timestamp, at(9, 2, 0))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_long_catchup_shape_validated() {
        let entries = stream(&[
            (EventKind::CatchupStart, at(8, 0, 0)),
            (EventKind::NoResponse, at(8, 0, 30)),
            (EventKind::Meal, at(8, 1, 0)),
            (EventKind::CatchupEnd, at(8, 2, 0)),
        ]);

        let categorization = categorize(&entries).unwrap();
        assert_eq!(categorization.categories[0], Some(CatchupCategory::Long));
        assert_eq!(
            flag(&entries, &categorization.categories).unwrap(),
            vec![false; 4]
        );
    }

    #[test]
    fn test_long_catchup_without_no_response_is_fatal() {
        let entries = stream(&[
            (EventKind::CatchupStart, at(8, 0, 0)),
            (EventKind::Meal, at(8, 0, 30)),
            (EventKind::Meal, at(8, 1, 0)),
            (EventKind::CatchupEnd, at(8, 2, 0)),
        ]);
        assert!(matches!(
            categorize_and_flag(&entries),
            Err(CleanError::LongCatchupShape { .. })
        ));
    }

    #[test]
    fn test_long_catchup_with_extra_entries_is_fatal() {
        let entries = stream(&[
            (EventKind::CatchupStart, at(8, 0, 0)),
            (EventKind::NoResponse, at(8, 0, 30)),
            (EventKind::Meal, at(8, 1, 0)),
            (EventKind::Snack, at(8, 1, 30)),
            (EventKind::CatchupEnd, at(8, 2, 0)),
        ]);
        assert!(matches!(
            categorize_and_flag(&entries),
            Err(CleanError::LongCatchupShape { .. })
        ));
    }

    #[test]
    fn test_markers_never_flagged() {
        let entries = stream(&[
            (EventKind::CatchupStart, at(8, 0, 0)),
            (EventKind::Meal, at(8, 0, 5)),
            (EventKind::CatchupEnd, at(8, 0, 20)),
            (EventKind::CatchupStart, at(10, 0, 0)),
            (EventKind::Meal, at(10, 1, 0)),
        ]);
        let flags = categorize_and_flag(&entries).unwrap();

        for (entry, flagged) in entries.iter().zip(flags) {
            if entry.event_kind.is_marker() {
                assert!(!flagged);
            }
        }
    }

    #[test]
    fn test_mismatched_categories_rejected() {
        let entries = stream(&[(EventKind::Meal, at(8, 0, 0))]);
        assert!(matches!(
            flag(&entries, &[]),
            Err(CleanError::LengthMismatch(_))
        ));
    }

    #[test]
    fn test_cursor_reports_position() {
        let entries = stream(&[
            (EventKind::Meal, at(8, 0, 0)),
            (EventKind::Snack, at(8, 1, 0)),
        ]);
        let streams = partition(&entries);
        let mut cursor = StreamCursor::new(&streams[0], 0);

        assert_eq!(cursor.position(), Some(0));
        assert_eq!(cursor.advance().map(|e| e.event_kind), Some(EventKind::Snack));
        assert_eq!(cursor.index(), 1);
        assert_eq!(cursor.advance(), None);
        assert_eq!(cursor.position(), None);
    }
}
