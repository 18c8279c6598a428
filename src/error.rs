//! Error types for EMA cleaning

use chrono::NaiveDateTime;
use thiserror::Error;

/// Errors that abort a cleaning run
///
/// Every variant is fatal: categorization and flagging depend on an unbroken
/// sequential scan, so no partial output is produced once one is raised.
#[derive(Debug, Error)]
pub enum CleanError {
    #[error("Entries for participant {participant_id} are not sorted by timestamp (row {row_id})")]
    Unsorted { participant_id: i64, row_id: usize },

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Unknown event kind: {0:?}")]
    UnknownEventKind(String),

    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("Failed to parse table: {0}")]
    Parse(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catch-up end without an open catch-up start for participant {participant_id} at {timestamp}")]
    EndWithoutStart {
        participant_id: i64,
        timestamp: NaiveDateTime,
    },

    #[error("Unexpected stream shape after long catch-up for participant {participant_id} at {timestamp}: {message}")]
    LongCatchupShape {
        participant_id: i64,
        timestamp: NaiveDateTime,
        message: String,
    },

    #[error("Unhandled entry inside open-ended catch-up for participant {participant_id} at {timestamp}: {message}")]
    OpenEndedShape {
        participant_id: i64,
        timestamp: NaiveDateTime,
        message: String,
    },

    #[error("No distribution date for participant {0}")]
    MissingWindow(i64),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Invalid smoothing window: {0}")]
    InvalidWindow(String),

    #[error("Length mismatch: {0}")]
    LengthMismatch(String),
}
