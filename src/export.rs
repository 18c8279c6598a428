//! Model table for the downstream multi-level model
//!
//! One row per cleaned entry, joined to the demographic questionnaire and
//! restricted to participants who wore the smartwatch.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::error::CleanError;
use crate::types::{CleanedEntry, QuestionnaireRecord};

/// Age above which a participant is in the older group
pub const AGE_GROUP_THRESHOLD: i64 = 12;

/// Days in school above which `over_2_days_in_school` is set
pub const SCHOOL_DAYS_THRESHOLD: i64 = 2;

/// Questionnaire code for an unanswered question
const UNANSWERED: i64 = -99;

/// A row of the model table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRow {
    pub p_id: i64,
    pub day: i64,
    pub weekday: String,
    pub is_weekend: u8,
    pub all_in_ramadan: u8,
    /// 0 = male, 1 = female
    pub sex: i64,
    pub ethnicity: i64,
    pub age: i64,
    pub age_group: u8,
    /// Weekday of the participant's first retained entry
    pub first_weekday: String,
    /// Empty when the question was not answered
    pub over_2_days_in_school: Option<u8>,
    /// 1 when the participant answered the prompt
    pub entry: u8,
}

/// Rows ready for CSV export
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTable {
    pub rows: Vec<ModelRow>,
}

impl ModelTable {
    /// Join cleaned entries to the questionnaire
    ///
    /// Only respondents with `respondent_status == 1` are considered; entries of
    /// participants without such a record, or who did not wear the watch, are
    /// dropped. Row order follows `cleaned`.
    pub fn build(cleaned: &[CleanedEntry], questionnaire: &[QuestionnaireRecord]) -> Self {
        let mut respondents: HashMap<i64, &QuestionnaireRecord> = HashMap::new();
        for record in questionnaire.iter().filter(|r| r.respondent_status == 1) {
            respondents.entry(record.residents_id).or_insert(record);
        }

        let mut first_weekday: HashMap<i64, &str> = HashMap::new();
        let mut rows = Vec::new();
        for entry in cleaned {
            let Some(record) = respondents.get(&entry.p_id) else {
                continue;
            };
            if !record.wore_smartwatch() {
                continue;
            }

            let age = record.age_dob as i64;
            let is_weekend = matches!(entry.week_day.as_str(), "Saturday" | "Sunday");
            let first = first_weekday
                .entry(entry.p_id)
                .or_insert(entry.week_day.as_str());

            rows.push(ModelRow {
                p_id: entry.p_id,
                day: entry.day,
                weekday: entry.week_day.clone(),
                is_weekend: is_weekend as u8,
                all_in_ramadan: entry.all_in_ramadan as u8,
                sex: record.respondent_sex - 1,
                ethnicity: record.respondent_ethnicity,
                age,
                age_group: (age > AGE_GROUP_THRESHOLD) as u8,
                first_weekday: (*first).to_string(),
                over_2_days_in_school: school_days(record.phyactq1),
                entry: entry.event_kind.is_response() as u8,
            });
        }

        let participants = first_weekday.len();
        info!(rows = rows.len(), participants, "built model table");
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fraction of rows where the participant answered the prompt
    pub fn response_rate(&self) -> Option<f64> {
        if self.rows.is_empty() {
            return None;
        }
        let answered = self.rows.iter().filter(|r| r.entry == 1).count();
        Some(answered as f64 / self.rows.len() as f64)
    }
}

fn school_days(phyactq1: Option<i64>) -> Option<u8> {
    match phyactq1 {
        Some(days) if days != UNANSWERED => Some((days > SCHOOL_DAYS_THRESHOLD) as u8),
        _ => None,
    }
}

/// Write the model table as CSV with a header row
pub fn write_csv<W: Write>(table: &ModelTable, writer: W) -> Result<(), CleanError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in &table.rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_csv_path(table: &ModelTable, path: &Path) -> Result<(), CleanError> {
    let file = std::fs::File::create(path)?;
    write_csv(table, file)
}
