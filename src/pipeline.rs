//! Pipeline orchestration
//!
//! This module provides the public cleaning API. It composes the stages that
//! turn a raw smartwatch entry table into the cleaned, annotated table used by
//! the plotting and modelling steps.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::calendar::{week_day_name, RamadanWindow};
use crate::catchup::{self, Categorization};
use crate::context::DataContext;
use crate::duplicates::{threshold_minutes, DuplicateDetector, DEFAULT_DUPLICATE_MINUTES};
use crate::error::CleanError;
use crate::stream::sort_entries;
use crate::types::{CatchupCategory, CleanedEntry, Entry};

/// Default number of days after distribution before entries count
pub const DEFAULT_EXCLUSION_DAYS: i64 = 1;

/// Options controlling a cleaning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningOptions {
    /// Maximum gap between duplicate entries, in minutes
    pub duplicate_threshold_minutes: i64,
    /// Keep catch-up markers and entries logged during catch-up periods
    pub keep_catchups: bool,
    /// Entries earlier than this many days after distribution are dropped
    pub exclusion_days: i64,
    pub ramadan: RamadanWindow,
}

impl Default for CleaningOptions {
    fn default() -> Self {
        Self {
            duplicate_threshold_minutes: DEFAULT_DUPLICATE_MINUTES,
            keep_catchups: false,
            exclusion_days: DEFAULT_EXCLUSION_DAYS,
            ramadan: RamadanWindow::default(),
        }
    }
}

impl CleaningOptions {
    /// Load options from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, CleanError> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Reject negative or out-of-range durations
    pub fn validate(&self) -> Result<(), CleanError> {
        self.duplicate_threshold()?;
        self.exclusion()?;
        Ok(())
    }

    pub fn duplicate_threshold(&self) -> Result<Duration, CleanError> {
        threshold_minutes(self.duplicate_threshold_minutes)
    }

    /// Time after distribution before entries count
    pub fn exclusion(&self) -> Result<Duration, CleanError> {
        let days = self.exclusion_days;
        if days < 0 {
            return Err(CleanError::InvalidOption(format!(
                "exclusion days must not be negative: {}",
                days
            )));
        }
        Duration::try_days(days).ok_or_else(|| {
            CleanError::InvalidOption(format!("exclusion days out of range: {}", days))
        })
    }

    pub fn to_json(&self) -> Result<String, CleanError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Row counts for one cleaning run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub input_rows: usize,
    /// Entries logged before the participant's window opened
    pub before_window: usize,
    pub duplicates_removed: usize,
    /// Catch-up starts per category
    pub categories: BTreeMap<CatchupCategory, usize>,
    /// Catch-up periods still open when the participant's stream ended
    pub open_ended_at_end: usize,
    /// Entries logged during catch-up periods
    pub flagged_entries: usize,
    /// Markers and flagged entries dropped from the output
    pub catchup_rows_removed: usize,
    pub output_rows: usize,
}

/// Result of a cleaning run
#[derive(Debug, Clone)]
pub struct CleaningOutput {
    /// Cleaned entries in (timestamp, row_id) order
    pub entries: Vec<CleanedEntry>,
    pub report: CleaningReport,
}

/// Entries after deduplication, with their catch-up annotations
struct Annotated {
    entries: Vec<Entry>,
    categorization: Categorization,
    flags: Vec<bool>,
}

/// Cleaning pipeline with fixed options
#[derive(Debug, Clone, Default)]
pub struct CleaningPipeline {
    options: CleaningOptions,
}

impl CleaningPipeline {
    /// Create a pipeline with default options
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CleaningOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CleaningOptions {
        &self.options
    }

    /// Clean an entry table.
    ///
    /// Pipeline stages:
    /// 1. Drop entries logged before the participant's window opened
    /// 2. Sort, detect and drop duplicates
    /// 3. Categorize catch-up starts and flag entries inside catch-up periods
    /// 4. Annotate with window and calendar context, then optionally drop
    ///    catch-up markers and flagged entries
    ///
    /// Any fatal condition aborts the whole run.
    pub fn clean(
        &self,
        context: &DataContext,
        entries: Vec<Entry>,
    ) -> Result<CleaningOutput, CleanError> {
        let mut report = CleaningReport {
            input_rows: entries.len(),
            ..Default::default()
        };

        // Stage 1: study window
        let in_window = self.apply_window(context, entries)?;
        report.before_window = report.input_rows - in_window.len();

        // Stages 2-3: duplicates and catch-ups
        let annotated = self.annotate(in_window, &mut report)?;

        // Stage 4: assemble
        let entries = self.assemble(context, annotated, &mut report)?;
        report.output_rows = entries.len();

        info!(
            input_rows = report.input_rows,
            output_rows = report.output_rows,
            "cleaning finished"
        );

        Ok(CleaningOutput { entries, report })
    }

    /// Run deduplication and catch-up handling without a study window.
    ///
    /// Used to check a raw log for stream-shape problems before the reference
    /// tables are available. Nothing is removed apart from duplicates.
    pub fn inspect(&self, entries: Vec<Entry>) -> Result<CleaningReport, CleanError> {
        let mut report = CleaningReport {
            input_rows: entries.len(),
            ..Default::default()
        };
        let annotated = self.annotate(entries, &mut report)?;
        report.output_rows = annotated.entries.len();
        Ok(report)
    }

    fn apply_window(
        &self,
        context: &DataContext,
        entries: Vec<Entry>,
    ) -> Result<Vec<Entry>, CleanError> {
        let exclusion = self.options.exclusion()?;
        let mut kept = Vec::with_capacity(entries.len());

        for entry in entries {
            let distributed = context.distribution_date(entry.participant_id)?;
            if entry.timestamp - distributed >= exclusion {
                kept.push(entry);
            }
        }

        debug!(kept = kept.len(), "applied study window");
        Ok(kept)
    }

    fn annotate(
        &self,
        mut entries: Vec<Entry>,
        report: &mut CleaningReport,
    ) -> Result<Annotated, CleanError> {
        sort_entries(&mut entries);

        let detector = DuplicateDetector::new(self.options.duplicate_threshold()?);
        let duplicates = detector.detect(&entries)?;
        let entries: Vec<Entry> = entries
            .into_iter()
            .zip(duplicates)
            .filter_map(|(entry, duplicate)| (!duplicate).then_some(entry))
            .collect();
        report.duplicates_removed = report.input_rows - report.before_window - entries.len();
        debug!(removed = report.duplicates_removed, "removed duplicates");

        let categorization = catchup::categorize(&entries)?;
        let flags = catchup::flag(&entries, &categorization.categories)?;

        report.categories = CatchupCategory::ALL
            .into_iter()
            .map(|category| (category, categorization.count(category)))
            .collect();
        report.open_ended_at_end = categorization.open_at_end.len();
        report.flagged_entries = flags.iter().filter(|f| **f).count();
        debug!(
            flagged = report.flagged_entries,
            open_ended_at_end = report.open_ended_at_end,
            "categorized catch-up periods"
        );

        Ok(Annotated {
            entries,
            categorization,
            flags,
        })
    }

    fn assemble(
        &self,
        context: &DataContext,
        annotated: Annotated,
        report: &mut CleaningReport,
    ) -> Result<Vec<CleanedEntry>, CleanError> {
        let Annotated {
            entries,
            categorization,
            flags,
        } = annotated;
        let ramadan = self.options.ramadan;

        let mut cleaned = Vec::with_capacity(entries.len());
        for ((entry, category), flagged) in entries
            .into_iter()
            .zip(categorization.categories)
            .zip(flags)
        {
            if !self.options.keep_catchups && (entry.event_kind.is_marker() || flagged) {
                report.catchup_rows_removed += 1;
                continue;
            }

            let delta = entry.timestamp - context.distribution_date(entry.participant_id)?;
            cleaned.push(CleanedEntry {
                row_id: entry.row_id,
                p_id: entry.participant_id,
                timestamp: entry.timestamp,
                event_kind: entry.event_kind,
                week_day: week_day_name(entry.timestamp).to_string(),
                in_ramadan: ramadan.contains(entry.timestamp),
                all_in_ramadan: false,
                delta_seconds: delta.num_seconds(),
                day: delta.num_days(),
                portion_size: entry.portion_size,
                utensil: entry.utensil,
                location: entry.location,
                catchup_category: category,
                catchup_flag: flagged,
            });
        }

        let outside_ramadan: BTreeSet<i64> = cleaned
            .iter()
            .filter(|e| !e.in_ramadan)
            .map(|e| e.p_id)
            .collect();
        for entry in &mut cleaned {
            entry.all_in_ramadan = !outside_ramadan.contains(&entry.p_id);
        }

        Ok(cleaned)
    }
}

/// Clean an entry table with default options
///
/// # Arguments
/// * `context` - Reference tables holding each participant's distribution date
/// * `entries` - Raw smartwatch entries
/// * `keep_catchups` - Keep catch-up markers and entries logged during catch-ups
pub fn cleaned_smartwatch(
    context: &DataContext,
    entries: Vec<Entry>,
    keep_catchups: bool,
) -> Result<Vec<CleanedEntry>, CleanError> {
    let options = CleaningOptions {
        keep_catchups,
        ..Default::default()
    };
    Ok(CleaningPipeline::with_options(options)
        .clean(context, entries)?
        .entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventKind, ParticipantWindow};
    use chrono::{NaiveDate, NaiveDateTime};
    use pretty_assertions::assert_eq;

    fn at(day: u32, hour: u32, min: u32, sec: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 3, day)
            .unwrap()
            .and_hms_opt(hour, min, sec)
            .unwrap()
    }

    fn context() -> DataContext {
        DataContext::new(vec![
            ParticipantWindow {
                participant_id: 1,
                distribution_date: at(1, 10, 0, 0),
            },
            ParticipantWindow {
                participant_id: 2,
                distribution_date: at(1, 10, 0, 0),
            },
        ])
    }

    fn meal(row_id: usize, p_id: i64, time: NaiveDateTime) -> Entry {
        Entry::new(row_id, p_id, time, EventKind::Meal).with_details("Medium", "Hand", "Home")
    }

    /// A day for participant 1 covering every stage
    fn sample_entries() -> Vec<Entry> {
        vec![
            // Before the window opens
            meal(0, 1, at(1, 12, 0, 0)),
            // Normal catch-up with one entry inside
            Entry::new(1, 1, at(3, 8, 0, 0), EventKind::CatchupStart),
            Entry::new(2, 1, at(3, 8, 0, 20), EventKind::Snack),
            Entry::new(3, 1, at(3, 8, 0, 40), EventKind::CatchupEnd),
            // Meal and its duplicate
            meal(4, 1, at(3, 12, 0, 0)),
            meal(5, 1, at(3, 12, 2, 0)),
            Entry::new(6, 1, at(3, 15, 0, 0), EventKind::NoResponse),
            // Participant 2 logs a meal between participant 1's entries
            meal(7, 2, at(3, 12, 1, 0)),
        ]
    }

    #[test]
    fn test_clean_drops_window_duplicates_and_catchups() {
        let output = CleaningPipeline::new()
            .clean(&context(), sample_entries())
            .unwrap();

        let rows: Vec<(usize, i64)> = output.entries.iter().map(|e| (e.row_id, e.p_id)).collect();
        assert_eq!(rows, vec![(4, 1), (7, 2), (6, 1)]);

        let report = &output.report;
        assert_eq!(report.input_rows, 8);
        assert_eq!(report.before_window, 1);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.categories[&CatchupCategory::Normal], 1);
        assert_eq!(report.categories[&CatchupCategory::Long], 0);
        assert_eq!(report.flagged_entries, 1);
        assert_eq!(report.catchup_rows_removed, 3);
        assert_eq!(report.output_rows, 3);
    }

    #[test]
    fn test_keep_catchups_retains_annotated_rows() {
        let cleaned = cleaned_smartwatch(&context(), sample_entries(), true).unwrap();

        assert_eq!(cleaned.len(), 6);
        let start = cleaned.iter().find(|e| e.row_id == 1).unwrap();
        assert_eq!(start.catchup_category, Some(CatchupCategory::Normal));
        assert!(!start.catchup_flag);

        let snack = cleaned.iter().find(|e| e.row_id == 2).unwrap();
        assert!(snack.catchup_flag);
        assert_eq!(snack.catchup_category, None);
    }

    #[test]
    fn test_window_annotations() {
        let cleaned = cleaned_smartwatch(&context(), sample_entries(), false).unwrap();
        let first = &cleaned[0];

        // 2023-03-03 12:00 is two days and two hours after distribution
        assert_eq!(first.day, 2);
        assert_eq!(first.delta_seconds, 2 * 86_400 + 2 * 3_600);
        assert_eq!(first.week_day, "Friday");
        assert!(!first.in_ramadan);
        assert!(!first.all_in_ramadan);
    }

    #[test]
    fn test_entry_exactly_one_day_after_distribution_kept() {
        let entries = vec![
            meal(0, 1, at(2, 9, 59, 59)),
            meal(1, 1, at(2, 10, 0, 0)),
        ];
        let cleaned = cleaned_smartwatch(&context(), entries, false).unwrap();
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].row_id, 1);
        assert_eq!(cleaned[0].day, 1);
    }

    #[test]
    fn test_all_in_ramadan_per_participant() {
        let ramadan_day = |day: u32| {
            NaiveDate::from_ymd_opt(2023, 3, day)
                .unwrap()
                .and_hms_opt(13, 0, 0)
                .unwrap()
        };
        let context = DataContext::new(vec![
            ParticipantWindow {
                participant_id: 1,
                distribution_date: ramadan_day(20),
            },
            ParticipantWindow {
                participant_id: 2,
                distribution_date: ramadan_day(24),
            },
        ]);
        let entries = vec![
            meal(0, 1, ramadan_day(22)),
            meal(1, 1, ramadan_day(25)),
            meal(2, 2, ramadan_day(26)),
        ];

        let cleaned = cleaned_smartwatch(&context, entries, false).unwrap();
        let flags: Vec<(i64, bool, bool)> = cleaned
            .iter()
            .map(|e| (e.p_id, e.in_ramadan, e.all_in_ramadan))
            .collect();
        assert_eq!(
            flags,
            vec![(1, false, false), (1, true, false), (2, true, true)]
        );
    }

    #[test]
    fn test_missing_window_is_fatal() {
        let entries = vec![meal(0, 3, at(5, 12, 0, 0))];
        let result = CleaningPipeline::new().clean(&context(), entries);
        assert!(matches!(result, Err(CleanError::MissingWindow(3))));
    }

    #[test]
    fn test_stream_shape_error_aborts_run() {
        let entries = vec![
            meal(0, 1, at(3, 7, 0, 0)),
            Entry::new(1, 1, at(3, 8, 0, 0), EventKind::CatchupEnd),
        ];
        let result = CleaningPipeline::new().clean(&context(), entries);
        assert!(matches!(result, Err(CleanError::EndWithoutStart { .. })));
    }

    #[test]
    fn test_unsorted_input_is_sorted_with_stable_ties() {
        let entries = vec![
            Entry::new(0, 1, at(3, 12, 0, 0), EventKind::Drink).with_details("S", "Cup", "Home"),
            meal(1, 1, at(3, 9, 0, 0)),
            Entry::new(2, 1, at(3, 12, 0, 0), EventKind::Snack).with_details("S", "Hand", "Home"),
        ];
        let cleaned = cleaned_smartwatch(&context(), entries, false).unwrap();
        let ids: Vec<usize> = cleaned.iter().map(|e| e.row_id).collect();
        assert_eq!(ids, vec![1, 0, 2]);
    }

    #[test]
    fn test_output_is_deterministic() {
        let pipeline = CleaningPipeline::new();
        let first = pipeline.clean(&context(), sample_entries()).unwrap();
        let second = pipeline.clean(&context(), sample_entries()).unwrap();

        assert_eq!(
            serde_json::to_string(&first.entries).unwrap(),
            serde_json::to_string(&second.entries).unwrap()
        );
        assert_eq!(first.report, second.report);
    }

    #[test]
    fn test_inspect_skips_window() {
        let report = CleaningPipeline::new().inspect(sample_entries()).unwrap();
        assert_eq!(report.before_window, 0);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.output_rows, 7);
    }

    #[test]
    fn test_options_from_partial_json() {
        let options =
            CleaningOptions::from_json(r#"{"keep_catchups": true, "duplicate_threshold_minutes": 3}"#)
                .unwrap();
        assert!(options.keep_catchups);
        assert_eq!(options.duplicate_threshold_minutes, 3);
        assert_eq!(options.exclusion_days, DEFAULT_EXCLUSION_DAYS);
        assert_eq!(options.ramadan, RamadanWindow::default());

        let round_trip = CleaningOptions::from_json(&options.to_json().unwrap()).unwrap();
        assert_eq!(round_trip, options);
    }

    #[test]
    fn test_out_of_range_options_rejected() {
        let result = CleaningOptions::from_json(r#"{"exclusion_days": 9223372036854775807}"#);
        assert!(matches!(result, Err(CleanError::InvalidOption(_))));
        let result = CleaningOptions::from_json(r#"{"duplicate_threshold_minutes": -5}"#);
        assert!(matches!(result, Err(CleanError::InvalidOption(_))));

        // Options built in code are checked when the run starts
        let options = CleaningOptions {
            exclusion_days: i64::MAX,
            ..Default::default()
        };
        let result = CleaningPipeline::with_options(options).clean(&context(), sample_entries());
        assert!(matches!(result, Err(CleanError::InvalidOption(_))));

        let options = CleaningOptions {
            duplicate_threshold_minutes: i64::MIN,
            ..Default::default()
        };
        let result = CleaningPipeline::with_options(options).inspect(sample_entries());
        assert!(matches!(result, Err(CleanError::InvalidOption(_))));
    }
}
