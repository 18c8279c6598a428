//! Catch-up period categorization
//!
//! Each participant's stream is folded through a two-state machine. A catch-up
//! start opens a period; the matching end closes it and fixes the category of
//! the start marker from the start time and the period's duration. A start that
//! is superseded by another start, or never closed, is open-ended.

use chrono::{Duration, NaiveDateTime, Timelike};
use tracing::{debug, warn};

use crate::error::CleanError;
use crate::stream::{partition, ParticipantStream};
use crate::types::{CatchupCategory, Entry, EventKind};

/// Catch-up periods lasting longer than this are `Long`
pub const LONG_CATCHUP_SECONDS: i64 = 60;

/// Catch-up prompts are scheduled for this hour of the day
pub const SCHEDULED_HOUR: u32 = 8;

/// Starts later than this many minutes past the scheduled hour are `Late`
pub const LATE_GRACE_MINUTES: u32 = 5;

/// Category of a closed catch-up period
///
/// Precedence: long duration, then early start, then late start.
pub fn categorize_period(start: NaiveDateTime, end: NaiveDateTime) -> CatchupCategory {
    if end - start > Duration::seconds(LONG_CATCHUP_SECONDS) {
        CatchupCategory::Long
    } else if start.hour() < SCHEDULED_HOUR {
        CatchupCategory::Early
    } else if is_late(start) {
        CatchupCategory::Late
    } else {
        CatchupCategory::Normal
    }
}

/// Strictly after the grace period following the scheduled hour
fn is_late(start: NaiveDateTime) -> bool {
    let past_hour = (start.minute(), start.second(), start.nanosecond());
    start.hour() > SCHEDULED_HOUR
        || (start.hour() == SCHEDULED_HOUR && past_hour > (LATE_GRACE_MINUTES, 0, 0))
}

/// Whether the machine is inside a catch-up period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchupState {
    Idle,
    Open {
        position: usize,
        start_time: NaiveDateTime,
    },
}

/// A start marker whose category has been decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finalized {
    /// Table position of the start marker
    pub position: usize,
    pub category: CatchupCategory,
}

/// State machine over one participant's stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchupStateMachine {
    participant_id: i64,
    state: CatchupState,
}

impl CatchupStateMachine {
    pub fn new(participant_id: i64) -> Self {
        Self {
            participant_id,
            state: CatchupState::Idle,
        }
    }

    pub fn state(&self) -> CatchupState {
        self.state
    }

    /// Feed the entry at table position `position`
    ///
    /// Returns the next machine and the start marker finalized by this entry, if any.
    pub fn advance(
        self,
        position: usize,
        entry: &Entry,
    ) -> Result<(Self, Option<Finalized>), CleanError> {
        let opened = CatchupState::Open {
            position,
            start_time: entry.timestamp,
        };

        match (entry.event_kind, self.state) {
            (EventKind::CatchupStart, CatchupState::Idle) => Ok((self.with_state(opened), None)),
            (EventKind::CatchupStart, CatchupState::Open { position: prev, .. }) => {
                debug!(
                    participant_id = self.participant_id,
                    superseded_at = %entry.timestamp,
                    "catch-up start superseded by a new start"
                );
                let finalized = Finalized {
                    position: prev,
                    category: CatchupCategory::OpenEnded,
                };
                Ok((self.with_state(opened), Some(finalized)))
            }
            (EventKind::CatchupEnd, CatchupState::Idle) => Err(CleanError::EndWithoutStart {
                participant_id: self.participant_id,
                timestamp: entry.timestamp,
            }),
            (
                EventKind::CatchupEnd,
                CatchupState::Open {
                    position: start,
                    start_time,
                },
            ) => {
                let finalized = Finalized {
                    position: start,
                    category: categorize_period(start_time, entry.timestamp),
                };
                Ok((self.with_state(CatchupState::Idle), Some(finalized)))
            }
            _ => Ok((self, None)),
        }
    }

    /// Close the stream; a period still open becomes open-ended
    pub fn finish(self) -> Option<Finalized> {
        match self.state {
            CatchupState::Idle => None,
            CatchupState::Open {
                position,
                start_time,
            } => {
                warn!(
                    participant_id = self.participant_id,
                    start_time = %start_time,
                    "stream ended inside a catch-up period; treating it as open-ended"
                );
                Some(Finalized {
                    position,
                    category: CatchupCategory::OpenEnded,
                })
            }
        }
    }

    fn with_state(self, state: CatchupState) -> Self {
        Self { state, ..self }
    }
}

/// Categories of every start marker in a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Categorization {
    /// Aligned with the input table; set only on catch-up start rows
    pub categories: Vec<Option<CatchupCategory>>,
    /// Table positions of starts left open when their stream ended
    pub open_at_end: Vec<usize>,
}

impl Categorization {
    pub fn count(&self, category: CatchupCategory) -> usize {
        self.categories
            .iter()
            .filter(|c| **c == Some(category))
            .count()
    }
}

/// Categorize every catch-up start in `entries`
///
/// Each participant's entries must already be in timestamp order.
pub fn categorize(entries: &[Entry]) -> Result<Categorization, CleanError> {
    let mut categorization = Categorization {
        categories: vec![None; entries.len()],
        open_at_end: Vec::new(),
    };

    for stream in partition(entries) {
        stream.check_sorted()?;
        let (finalized, open_at_end) = categorize_stream(&stream)?;
        for Finalized { position, category } in finalized {
            categorization.categories[position] = Some(category);
        }
        categorization.open_at_end.extend(open_at_end);
    }

    categorization.open_at_end.sort_unstable();
    Ok(categorization)
}

fn categorize_stream(
    stream: &ParticipantStream<'_>,
) -> Result<(Vec<Finalized>, Option<usize>), CleanError> {
    let (machine, mut finalized) = stream.iter().try_fold(
        (CatchupStateMachine::new(stream.participant_id), Vec::new()),
        |(machine, mut done), (position, entry)| {
            let (machine, decided) = machine.advance(position, entry)?;
            done.extend(decided);
            Ok::<_, CleanError>((machine, done))
        },
    )?;

    let open_at_end = machine.finish().map(|last| {
        finalized.push(last);
        last.position
    });

    Ok((finalized, open_at_end))
}
