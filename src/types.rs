//! Core types for the EMA cleaning pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw entries, catch-up categories, participant windows and the
//! cleaned, annotated output rows.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CleanError;

/// Event kinds logged by the smartwatch
///
/// The vocabulary is closed: anything else in the input is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "Meal")]
    Meal,
    #[serde(rename = "Drink")]
    Drink,
    #[serde(rename = "Snack")]
    Snack,
    #[serde(rename = "No food/drink")]
    NoFoodDrink,
    #[serde(rename = "No response")]
    NoResponse,
    #[serde(rename = "No catch-up")]
    NoCatchup,
    #[serde(rename = "Catch-up start")]
    CatchupStart,
    #[serde(rename = "Catch-up end")]
    CatchupEnd,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::Meal,
        EventKind::Drink,
        EventKind::Snack,
        EventKind::NoFoodDrink,
        EventKind::NoResponse,
        EventKind::NoCatchup,
        EventKind::CatchupStart,
        EventKind::CatchupEnd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Meal => "Meal",
            EventKind::Drink => "Drink",
            EventKind::Snack => "Snack",
            EventKind::NoFoodDrink => "No food/drink",
            EventKind::NoResponse => "No response",
            EventKind::NoCatchup => "No catch-up",
            EventKind::CatchupStart => "Catch-up start",
            EventKind::CatchupEnd => "Catch-up end",
        }
    }

    /// Catch-up start/end markers delimit catch-up periods; they are not responses
    pub fn is_marker(&self) -> bool {
        matches!(self, EventKind::CatchupStart | EventKind::CatchupEnd)
    }

    /// Meal, Drink or Snack
    pub fn is_intake(&self) -> bool {
        matches!(self, EventKind::Meal | EventKind::Drink | EventKind::Snack)
    }

    /// Whether the participant actually answered the prompt
    pub fn is_response(&self) -> bool {
        self.is_intake() || *self == EventKind::NoFoodDrink
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = CleanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == trimmed)
            .ok_or_else(|| CleanError::UnknownEventKind(s.to_string()))
    }
}

/// One logged smartwatch entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Stable identity: position in the ingested table
    pub row_id: usize,
    pub participant_id: i64,
    pub timestamp: NaiveDateTime,
    pub event_kind: EventKind,
    pub portion_size: Option<String>,
    pub utensil: Option<String>,
    pub location: Option<String>,
}

impl Entry {
    /// Create an entry with no descriptive attributes
    pub fn new(
        row_id: usize,
        participant_id: i64,
        timestamp: NaiveDateTime,
        event_kind: EventKind,
    ) -> Self {
        Self {
            row_id,
            participant_id,
            timestamp,
            event_kind,
            portion_size: None,
            utensil: None,
            location: None,
        }
    }

    pub fn with_details(
        mut self,
        portion_size: impl Into<String>,
        utensil: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        self.portion_size = Some(portion_size.into());
        self.utensil = Some(utensil.into());
        self.location = Some(location.into());
        self
    }
}

/// Category assigned to every catch-up start marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CatchupCategory {
    Early,
    Late,
    Normal,
    Long,
    #[serde(rename = "Open-ended")]
    OpenEnded,
}

impl CatchupCategory {
    pub const ALL: [CatchupCategory; 5] = [
        CatchupCategory::Early,
        CatchupCategory::Late,
        CatchupCategory::Normal,
        CatchupCategory::Long,
        CatchupCategory::OpenEnded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CatchupCategory::Early => "Early",
            CatchupCategory::Late => "Late",
            CatchupCategory::Normal => "Normal",
            CatchupCategory::Long => "Long",
            CatchupCategory::OpenEnded => "Open-ended",
        }
    }

    /// Early, Late and Normal periods are closed by their own end marker
    pub fn is_bounded(&self) -> bool {
        matches!(
            self,
            CatchupCategory::Early | CatchupCategory::Late | CatchupCategory::Normal
        )
    }
}

impl fmt::Display for CatchupCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Study window of one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantWindow {
    pub participant_id: i64,
    /// When the smartwatch was handed to the participant
    pub distribution_date: NaiveDateTime,
}

/// Demographic questionnaire answers used by the model export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionnaireRecord {
    pub residents_id: i64,
    pub respondent_status: i64,
    /// 1 = male, 2 = female
    pub respondent_sex: i64,
    pub respondent_ethnicity: i64,
    pub age_dob: f64,
    /// Days spent in school last week; -99 when unanswered
    pub phyactq1: Option<i64>,
    pub smart1_10to17: Option<i64>,
    pub smart1_7to9: Option<i64>,
}

impl QuestionnaireRecord {
    /// Whether the respondent took part in the smartwatch arm of the study
    pub fn wore_smartwatch(&self) -> bool {
        self.smart1_10to17 == Some(1) || self.smart1_7to9 == Some(1)
    }
}

/// A cleaned entry annotated with window, calendar and catch-up context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedEntry {
    pub row_id: usize,
    pub p_id: i64,
    pub timestamp: NaiveDateTime,
    pub event_kind: EventKind,
    pub portion_size: Option<String>,
    pub utensil: Option<String>,
    pub location: Option<String>,
    /// Seconds since the device was distributed
    pub delta_seconds: i64,
    /// Whole days since the device was distributed
    pub day: i64,
    pub week_day: String,
    pub in_ramadan: bool,
    /// Every retained entry of this participant falls inside Ramadan
    pub all_in_ramadan: bool,
    /// Set only on catch-up start rows
    pub catchup_category: Option<CatchupCategory>,
    pub catchup_flag: bool,
}
