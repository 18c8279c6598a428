//! Input table schema
//!
//! This module defines the row layouts of the entry, participant-window and
//! questionnaire tables, and the adapter that reads them into typed values.

mod adapter;
mod tables;

pub use adapter::*;
pub use tables::*;
