//! Reference tables for a cleaning run
//!
//! The participant window (feasibility) table and the demographic questionnaire
//! are loaded once by the caller and handed to the pipeline in a [`DataContext`].
//! The context is read-only after construction, so it can be shared freely
//! between runs or threads.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

use crate::error::CleanError;
use crate::schema::TableAdapter;
use crate::types::{ParticipantWindow, QuestionnaireRecord};

/// Already-loaded reference tables
#[derive(Debug, Clone, Default)]
pub struct DataContext {
    windows: BTreeMap<i64, ParticipantWindow>,
    questionnaire: Vec<QuestionnaireRecord>,
}

impl DataContext {
    /// Create a context from participant windows
    ///
    /// When a participant appears more than once, the first row is kept.
    pub fn new(windows: Vec<ParticipantWindow>) -> Self {
        let mut by_participant = BTreeMap::new();
        for window in windows {
            if by_participant.contains_key(&window.participant_id) {
                warn!(
                    participant_id = window.participant_id,
                    "duplicate participant window ignored"
                );
                continue;
            }
            by_participant.insert(window.participant_id, window);
        }

        Self {
            windows: by_participant,
            questionnaire: Vec::new(),
        }
    }

    pub fn with_questionnaire(mut self, questionnaire: Vec<QuestionnaireRecord>) -> Self {
        self.questionnaire = questionnaire;
        self
    }

    /// Load the window table and, optionally, the questionnaire from CSV files
    pub fn from_paths(windows: &Path, questionnaire: Option<&Path>) -> Result<Self, CleanError> {
        let context = Self::new(TableAdapter::read_windows_path(windows)?);
        match questionnaire {
            Some(path) => Ok(context.with_questionnaire(TableAdapter::read_questionnaire_path(path)?)),
            None => Ok(context),
        }
    }

    pub fn window(&self, participant_id: i64) -> Option<&ParticipantWindow> {
        self.windows.get(&participant_id)
    }

    /// When the participant received the device
    pub fn distribution_date(&self, participant_id: i64) -> Result<NaiveDateTime, CleanError> {
        self.window(participant_id)
            .map(|w| w.distribution_date)
            .ok_or(CleanError::MissingWindow(participant_id))
    }

    pub fn participants(&self) -> impl Iterator<Item = i64> + '_ {
        self.windows.keys().copied()
    }

    pub fn questionnaire(&self) -> &[QuestionnaireRecord] {
        &self.questionnaire
    }

    /// Questionnaire answers of a respondent, if any
    pub fn respondent(&self, residents_id: i64) -> Option<&QuestionnaireRecord> {
        self.questionnaire
            .iter()
            .find(|r| r.residents_id == residents_id)
    }
}
