//! EMA CLI - Command-line interface for EMA Clean
//!
//! Commands:
//! - clean: Clean a raw entry table into the annotated table
//! - model: Build the multi-level model CSV from a raw entry table
//! - validate: Check a raw entry table for ordering and catch-up shape errors
//! - vocabulary: Print the event kinds and catch-up categories

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use ema_clean::export::{self, ModelTable};
use ema_clean::{
    CatchupCategory, CleanError, CleanedEntry, CleaningOptions, CleaningPipeline, DataContext,
    Entry, EventKind, TableAdapter, EMA_CLEAN_VERSION,
};

/// EMA - Cleaning of smartwatch meal-logging data
#[derive(Parser)]
#[command(name = "ema")]
#[command(version = EMA_CLEAN_VERSION)]
#[command(about = "Clean smartwatch EMA meal-logging data", long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a raw entry table
    Clean {
        /// Entry table path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Participant window (feasibility) table
        #[arg(short, long)]
        windows: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "csv")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "csv")]
        output_format: OutputFormat,

        #[command(flatten)]
        options: OptionArgs,

        /// Write the row-count report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Build the multi-level model table
    Model {
        /// Entry table path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Participant window (feasibility) table
        #[arg(short, long)]
        windows: PathBuf,

        /// Demographic questionnaire table
        #[arg(short, long)]
        questionnaire: PathBuf,

        /// Output CSV path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "csv")]
        input_format: InputFormat,

        #[command(flatten)]
        options: OptionArgs,
    },

    /// Check a raw entry table for ordering and catch-up shape errors
    Validate {
        /// Entry table path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "csv")]
        input_format: InputFormat,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the event kinds and catch-up categories
    Vocabulary {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Cleaning options; flags override values from `--config`
#[derive(clap::Args)]
struct OptionArgs {
    /// JSON file with cleaning options
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep catch-up markers and entries logged during catch-ups
    #[arg(long)]
    keep_catchups: bool,

    /// Maximum gap between duplicates, in minutes
    #[arg(long)]
    duplicate_minutes: Option<i64>,

    /// Days after distribution before entries count
    #[arg(long)]
    exclusion_days: Option<i64>,
}

impl OptionArgs {
    fn resolve(&self) -> Result<CleaningOptions, EmaCliError> {
        let mut options = match &self.config {
            Some(path) => CleaningOptions::from_json(&fs::read_to_string(path)?)?,
            None => CleaningOptions::default(),
        };

        if self.keep_catchups {
            options.keep_catchups = true;
        }
        if let Some(minutes) = self.duplicate_minutes {
            options.duplicate_threshold_minutes = minutes;
        }
        if let Some(days) = self.exclusion_days {
            options.exclusion_days = days;
        }
        options.validate()?;
        Ok(options)
    }
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Comma-separated values with a header row
    Csv,
    /// Newline-delimited JSON (one entry per line)
    Ndjson,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values with a header row
    Csv,
    /// Newline-delimited JSON (one entry per line)
    Ndjson,
    /// JSON array of entries
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), EmaCliError> {
    match cli.command {
        Commands::Clean {
            input,
            windows,
            output,
            input_format,
            output_format,
            options,
            report,
        } => cmd_clean(
            &input,
            &windows,
            &output,
            input_format,
            output_format,
            &options,
            report.as_deref(),
        ),
        Commands::Model {
            input,
            windows,
            questionnaire,
            output,
            input_format,
            options,
        } => cmd_model(
            &input,
            &windows,
            &questionnaire,
            &output,
            input_format,
            &options,
        ),
        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),
        Commands::Vocabulary { json } => cmd_vocabulary(json),
    }
}

fn cmd_clean(
    input: &Path,
    windows: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    options: &OptionArgs,
    report_path: Option<&Path>,
) -> Result<(), EmaCliError> {
    let options = options.resolve()?;
    debug!(?options, "resolved cleaning options");

    let entries = read_entries(input, &input_format)?;
    let context = DataContext::from_paths(windows, None)?;

    let cleaned = CleaningPipeline::with_options(options).clean(&context, entries)?;

    if let Some(path) = report_path {
        fs::write(path, serde_json::to_string_pretty(&cleaned.report)?)?;
    }

    let output_data = format_output(&cleaned.entries, &output_format)?;
    write_output(output, &output_data)
}

fn cmd_model(
    input: &Path,
    windows: &Path,
    questionnaire: &Path,
    output: &Path,
    input_format: InputFormat,
    options: &OptionArgs,
) -> Result<(), EmaCliError> {
    let mut options = options.resolve()?;
    // The model table only covers prompted entries
    options.keep_catchups = false;

    let entries = read_entries(input, &input_format)?;
    let context = DataContext::from_paths(windows, Some(questionnaire))?;

    let cleaned = CleaningPipeline::with_options(options).clean(&context, entries)?;
    let table = ModelTable::build(&cleaned.entries, context.questionnaire());
    if table.is_empty() {
        return Err(EmaCliError::NoRows);
    }
    if let Some(rate) = table.response_rate() {
        info!(response_rate = rate, "model table ready");
    }

    if output.to_string_lossy() == "-" {
        export::write_csv(&table, io::stdout())?;
    } else {
        export::write_csv_path(&table, output)?;
    }
    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), EmaCliError> {
    let entries = read_entries(input, &input_format)?;
    let report = CleaningPipeline::new().inspect(entries)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Entries:            {}", report.input_rows);
        println!("Duplicates:         {}", report.duplicates_removed);
        println!("Flagged entries:    {}", report.flagged_entries);
        println!("Open at end:        {}", report.open_ended_at_end);
        println!("\nCatch-ups:");
        for (category, count) in &report.categories {
            println!("  {:<12} {}", category.as_str(), count);
        }
    }
    Ok(())
}

fn cmd_vocabulary(json: bool) -> Result<(), EmaCliError> {
    if json {
        let vocabulary = serde_json::json!({
            "event_kinds": EventKind::ALL,
            "catchup_categories": CatchupCategory::ALL,
        });
        println!("{}", serde_json::to_string_pretty(&vocabulary)?);
        return Ok(());
    }

    println!("Event kinds:");
    for kind in EventKind::ALL {
        let class = if kind.is_marker() {
            "marker"
        } else if kind.is_intake() {
            "intake"
        } else if kind.is_response() {
            "response"
        } else {
            "other"
        };
        println!("  {:<16} {}", kind.as_str(), class);
    }
    println!("\nCatch-up categories:");
    for category in CatchupCategory::ALL {
        println!("  {}", category.as_str());
    }
    Ok(())
}

fn read_entries(input: &Path, format: &InputFormat) -> Result<Vec<Entry>, EmaCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(EmaCliError::NoInput);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let entries = match format {
        InputFormat::Csv => TableAdapter::read_entries(input_data.as_bytes())?,
        InputFormat::Ndjson => TableAdapter::parse_entries_ndjson(&input_data)?,
    };
    if entries.is_empty() {
        return Err(EmaCliError::NoEntries);
    }
    info!(entries = entries.len(), "read entry table");
    Ok(entries)
}

fn format_output(entries: &[CleanedEntry], format: &OutputFormat) -> Result<String, EmaCliError> {
    match format {
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(Vec::new());
            for entry in entries {
                wtr.serialize(entry).map_err(CleanError::from)?;
            }
            let bytes = wtr
                .into_inner()
                .map_err(|e| EmaCliError::Io(e.into_error()))?;
            String::from_utf8(bytes).map_err(|e| EmaCliError::Output(e.to_string()))
        }
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for entry in entries {
                lines.push(serde_json::to_string(entry)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(entries)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(entries)?),
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), EmaCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum EmaCliError {
    Io(io::Error),
    Clean(CleanError),
    Json(serde_json::Error),
    NoInput,
    NoEntries,
    NoRows,
    Output(String),
}

impl From<io::Error> for EmaCliError {
    fn from(e: io::Error) -> Self {
        EmaCliError::Io(e)
    }
}

impl From<CleanError> for EmaCliError {
    fn from(e: CleanError) -> Self {
        EmaCliError::Clean(e)
    }
}

impl From<serde_json::Error> for EmaCliError {
    fn from(e: serde_json::Error) -> Self {
        EmaCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<EmaCliError> for CliError {
    fn from(e: EmaCliError) -> Self {
        match e {
            EmaCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            EmaCliError::Clean(e) => {
                let (code, hint) = clean_error_hint(&e);
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            EmaCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            EmaCliError::NoInput => CliError {
                code: "NO_INPUT".to_string(),
                message: "stdin is a terminal".to_string(),
                hint: Some("Pipe an entry table or pass --input <file>".to_string()),
            },
            EmaCliError::NoEntries => CliError {
                code: "NO_ENTRIES".to_string(),
                message: "No entries found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            EmaCliError::NoRows => CliError {
                code: "NO_ROWS".to_string(),
                message: "No entries matched a smartwatch respondent".to_string(),
                hint: Some("Check that p_id matches residents_id in the questionnaire".to_string()),
            },
            EmaCliError::Output(msg) => CliError {
                code: "OUTPUT_ERROR".to_string(),
                message: msg,
                hint: None,
            },
        }
    }
}

fn clean_error_hint(e: &CleanError) -> (&'static str, &'static str) {
    match e {
        CleanError::Unsorted { .. } => ("UNSORTED", "Sort entries by participant and timestamp"),
        CleanError::MissingColumn(_)
        | CleanError::UnknownEventKind(_)
        | CleanError::InvalidTimestamp(_)
        | CleanError::Parse(_)
        | CleanError::Csv(_) => ("PARSE_ERROR", "Check the table's columns and values"),
        CleanError::EndWithoutStart { .. }
        | CleanError::LongCatchupShape { .. }
        | CleanError::OpenEndedShape { .. } => (
            "CATCHUP_SHAPE",
            "Inspect the participant's entries around the reported time",
        ),
        CleanError::MissingWindow(_) => (
            "MISSING_WINDOW",
            "Add the participant to the window table",
        ),
        CleanError::Json(_) => ("JSON_ERROR", "Check JSON syntax"),
        CleanError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
        CleanError::InvalidOption(_) => (
            "INVALID_OPTION",
            "Use non-negative --duplicate-minutes and --exclusion-days",
        ),
        CleanError::InvalidWindow(_) | CleanError::LengthMismatch(_) => {
            ("INVALID_ARGUMENT", "Check the command's arguments")
        }
    }
}
