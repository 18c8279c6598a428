//! EMA Clean - Cleaning of smartwatch meal-logging (EMA) data
//!
//! Turns a raw, noisy entry log into an analysis-ready table through a
//! deterministic pipeline: study window → duplicate removal → catch-up
//! categorization → catch-up entry flagging → calendar annotation.
//!
//! ## Modules
//!
//! - **Cleaning**: [`duplicates`], [`catchup`] and the [`pipeline`] that composes them
//! - **Tables**: [`schema`] readers for entry, window and questionnaire CSVs, and
//!   the [`export`] of the multi-level model table
//! - **Helpers**: entry slicing in [`parse`], accelerometer numerics in [`signal`]

pub mod calendar;
pub mod catchup;
pub mod context;
pub mod duplicates;
pub mod error;
pub mod export;
pub mod parse;
pub mod pipeline;
pub mod schema;
pub mod signal;
pub mod stream;
pub mod types;

pub use context::DataContext;
pub use error::CleanError;
pub use export::ModelTable;
pub use pipeline::{cleaned_smartwatch, CleaningOptions, CleaningOutput, CleaningPipeline, CleaningReport};

// Schema exports
pub use schema::TableAdapter;

pub use types::{CatchupCategory, CleanedEntry, Entry, EventKind};

/// Crate version reported by the CLI
pub const EMA_CLEAN_VERSION: &str = env!("CARGO_PKG_VERSION");
