//! Row records for the input tables
//!
//! Entry, participant-window and questionnaire tables arrive as CSV exports or
//! NDJSON. Each row deserializes into a loose record first and is then converted
//! into the strongly typed domain value, so vocabulary and timestamp problems are
//! reported with the offending text.

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CleanError;
use crate::types::{Entry, ParticipantWindow, QuestionnaireRecord};

/// Accepted date-time layouts, tried in order
const TIMESTAMP_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Column groups required in the entry table (any alias satisfies the group)
pub const ENTRY_COLUMNS: [&[&str]; 3] = [&["p_id"], &["timestamp", "Datetime"], &[
    "event_kind",
    "meal_type",
]];

/// Column groups required in the participant window table
pub const WINDOW_COLUMNS: [&[&str]; 2] = [
    &["participant_id", "residents_id", "p_id"],
    &["distribution_date"],
];

/// Column groups required in the questionnaire table
pub const QUESTIONNAIRE_COLUMNS: [&[&str]; 5] = [
    &["residents_id"],
    &["respondent_status"],
    &["respondent_sex"],
    &["respondent_ethnicity"],
    &["age_dob"],
];

/// Parse a naive local date-time in any of the accepted layouts
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, CleanError> {
    let trimmed = text.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| CleanError::InvalidTimestamp(text.to_string()))
}

/// Like [`parse_timestamp`], but a bare date is accepted as midnight
pub fn parse_date_or_timestamp(text: &str) -> Result<NaiveDateTime, CleanError> {
    parse_timestamp(text).or_else(|err| {
        NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .ok_or(err)
    })
}

/// Missing cells arrive as empty strings or pandas' `nan`
fn clean_attribute(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("nan"))
}

/// One row of the smartwatch entry table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRecord {
    #[serde(deserialize_with = "deserialize_id")]
    pub p_id: i64,
    #[serde(alias = "Datetime")]
    pub timestamp: String,
    #[serde(alias = "meal_type")]
    pub event_kind: String,
    #[serde(default)]
    pub portion_size: Option<String>,
    #[serde(default)]
    pub utensil: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl EntryRecord {
    /// Convert into a typed entry carrying the given row identity
    pub fn into_entry(self, row_id: usize) -> Result<Entry, CleanError> {
        Ok(Entry {
            row_id,
            participant_id: self.p_id,
            timestamp: parse_timestamp(&self.timestamp)?,
            event_kind: self.event_kind.parse()?,
            portion_size: clean_attribute(self.portion_size),
            utensil: clean_attribute(self.utensil),
            location: clean_attribute(self.location),
        })
    }
}

/// One row of the participant window (feasibility) table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowRecord {
    #[serde(alias = "residents_id", alias = "p_id", deserialize_with = "deserialize_id")]
    pub participant_id: i64,
    pub distribution_date: String,
}

impl WindowRecord {
    pub fn into_window(self) -> Result<ParticipantWindow, CleanError> {
        Ok(ParticipantWindow {
            participant_id: self.participant_id,
            distribution_date: parse_date_or_timestamp(&self.distribution_date)?,
        })
    }
}

/// One row of the demographic questionnaire
///
/// Numeric columns are read as floats because exported tables with missing
/// values store integers as `1.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionnaireRow {
    #[serde(deserialize_with = "deserialize_id")]
    pub residents_id: i64,
    pub respondent_status: Option<f64>,
    pub respondent_sex: Option<f64>,
    pub respondent_ethnicity: Option<f64>,
    pub age_dob: Option<f64>,
    #[serde(default)]
    pub phyactq1: Option<f64>,
    #[serde(default)]
    pub smart1_10to17: Option<f64>,
    #[serde(default)]
    pub smart1_7to9: Option<f64>,
}

impl QuestionnaireRow {
    /// Convert a respondent's row into a typed record
    ///
    /// Rows whose `respondent_status` is not 1 carry no demographics and yield
    /// `None`; for respondents every demographic column is required.
    pub fn into_record(self) -> Result<Option<QuestionnaireRecord>, CleanError> {
        let id = self.residents_id;
        if self.respondent_status.map(|v| v.round() as i64) != Some(1) {
            return Ok(None);
        }

        let required = |value: Option<f64>, column: &str| {
            value.ok_or_else(|| CleanError::Parse(format!("Respondent {} has no {}", id, column)))
        };

        Ok(Some(QuestionnaireRecord {
            residents_id: id,
            respondent_status: 1,
            respondent_sex: required(self.respondent_sex, "respondent_sex")?.round() as i64,
            respondent_ethnicity: required(self.respondent_ethnicity, "respondent_ethnicity")?
                .round() as i64,
            age_dob: required(self.age_dob, "age_dob")?,
            phyactq1: self.phyactq1.map(|v| v.round() as i64),
            smart1_10to17: self.smart1_10to17.map(|v| v.round() as i64),
            smart1_7to9: self.smart1_7to9.map(|v| v.round() as i64),
        }))
    }
}

/// Participant ids appear as integers, floats (`25279.0`) or strings
fn deserialize_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an integer participant id")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(|_| E::custom(format!("id out of range: {}", v)))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            if v.fract() == 0.0 && v.is_finite() {
                Ok(v as i64)
            } else {
                Err(E::custom(format!("non-integral id: {}", v)))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
            let trimmed = v.trim();
            if let Ok(id) = trimmed.parse::<i64>() {
                return Ok(id);
            }
            trimmed
                .parse::<f64>()
                .map_err(|_| E::custom(format!("invalid id: {:?}", v)))
                .and_then(|f| self.visit_f64(f))
        }
    }

    deserializer.deserialize_any(IdVisitor)
}
