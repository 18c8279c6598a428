//! Adapter for reading input tables into typed values
//!
//! Raw file ingestion (Stata, Excel, accelerometer binaries) happens upstream;
//! this adapter reads the CSV or NDJSON exports of those tables.

use crate::error::CleanError;
use crate::schema::tables::*;
use crate::types::{Entry, ParticipantWindow, QuestionnaireRecord};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Adapter for converting exported tables to typed rows
pub struct TableAdapter;

impl TableAdapter {
    /// Read the smartwatch entry table from CSV
    ///
    /// Row identities are assigned in file order.
    pub fn read_entries<R: Read>(reader: R) -> Result<Vec<Entry>, CleanError> {
        let records: Vec<EntryRecord> = read_csv(reader, &ENTRY_COLUMNS)?;
        records
            .into_iter()
            .enumerate()
            .map(|(row_id, record)| record.into_entry(row_id))
            .collect()
    }

    /// Read the smartwatch entry table from a CSV file
    pub fn read_entries_path(path: &Path) -> Result<Vec<Entry>, CleanError> {
        Self::read_entries(File::open(path)?)
    }

    /// Parse NDJSON (newline-delimited JSON) entry records
    pub fn parse_entries_ndjson(ndjson: &str) -> Result<Vec<Entry>, CleanError> {
        let mut entries = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record: EntryRecord = serde_json::from_str(trimmed).map_err(|e| {
                CleanError::Parse(format!("Failed to parse line {}: {}", line_num + 1, e))
            })?;
            let row_id = entries.len();
            entries.push(record.into_entry(row_id)?);
        }
        Ok(entries)
    }

    /// Read the participant window table from CSV
    pub fn read_windows<R: Read>(reader: R) -> Result<Vec<ParticipantWindow>, CleanError> {
        let records: Vec<WindowRecord> = read_csv(reader, &WINDOW_COLUMNS)?;
        records.into_iter().map(WindowRecord::into_window).collect()
    }

    pub fn read_windows_path(path: &Path) -> Result<Vec<ParticipantWindow>, CleanError> {
        Self::read_windows(File::open(path)?)
    }

    /// Read the demographic questionnaire from CSV
    ///
    /// Only respondents (`respondent_status == 1`) are returned; other rows may
    /// leave the demographic columns blank.
    pub fn read_questionnaire<R: Read>(reader: R) -> Result<Vec<QuestionnaireRecord>, CleanError> {
        let records: Vec<QuestionnaireRow> = read_csv(reader, &QUESTIONNAIRE_COLUMNS)?;
        let total = records.len();
        let respondents = records
            .into_iter()
            .filter_map(|row| row.into_record().transpose())
            .collect::<Result<Vec<_>, _>>()?;
        debug!(total, respondents = respondents.len(), "read questionnaire");
        Ok(respondents)
    }

    pub fn read_questionnaire_path(path: &Path) -> Result<Vec<QuestionnaireRecord>, CleanError> {
        Self::read_questionnaire(File::open(path)?)
    }
}

/// Check the header row, then deserialize every record
fn read_csv<R: Read, T: DeserializeOwned>(
    reader: R,
    required: &[&[&str]],
) -> Result<Vec<T>, CleanError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = rdr.headers()?.clone();
    for group in required {
        if !group.iter().any(|name| headers.iter().any(|h| h == *name)) {
            return Err(CleanError::MissingColumn(group[0].to_string()));
        }
    }

    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}
