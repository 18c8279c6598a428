//! Catch-up period handling
//!
//! Catch-up periods are administrative windows in which participants log entries
//! they missed earlier. Start markers are categorized first; the categorized
//! stream is then used to flag the entries logged during each period.
//!
//! Pipeline: sorted entries → categorize → flag

pub mod categorizer;
pub mod flagger;

pub use categorizer::{
    categorize, categorize_period, CatchupState, CatchupStateMachine, Categorization, Finalized,
};
pub use flagger::{flag, flag_bounded, flag_open_ended, validate_long, StreamCursor};
