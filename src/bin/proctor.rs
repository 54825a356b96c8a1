//! Proctor CLI - Command-line interface for Proctor Core
//!
//! Commands:
//! - replay: Replay a session transcript into a report (batch mode)
//! - run: Process transcript records from stdin (streaming mode)
//! - validate: Validate transcript records
//! - config: Print the default configuration
//! - doctor: Diagnose configuration and environment

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use log::{debug, info};
use proctor_core::pipeline::{replay_records, MonitorProcessor};
use proctor_core::transcript::{TranscriptAdapter, TranscriptRecord};
use proctor_core::types::{EventOrder, Report};
use proctor_core::{BellCue, MonitorConfig, MonitorError, PROCTOR_VERSION, PRODUCER_NAME};

/// Proctor - signal-to-event engine for monitored interview sessions
#[derive(Parser)]
#[command(name = "proctor")]
#[command(version = PROCTOR_VERSION)]
#[command(about = "Turn interview monitoring signals into an integrity report", long_about = None)]
struct Cli {
    /// Log pipeline decisions to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a transcript and print the session report (batch mode)
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Configuration file (JSON); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: ConfigOverrides,

        /// Order of events in the report
        #[arg(long, default_value = "oldest-first")]
        order: OrderArg,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },

    /// Process transcript records from stdin, emitting events and alerts as NDJSON
    Run {
        /// Configuration file (JSON); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: ConfigOverrides,

        /// Buffer output instead of flushing after each record
        #[arg(long)]
        no_flush: bool,

        /// Ring the terminal bell on high-severity alerts
        #[arg(long)]
        bell: bool,
    },

    /// Validate transcript records
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default configuration as JSON
    Config,

    /// Diagnose configuration and environment
    Doctor {
        /// Check a configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Per-run overrides applied on top of the config file
#[derive(Args, Clone)]
struct ConfigOverrides {
    /// Seconds of looking away before a focus_lost event
    #[arg(long)]
    focus_threshold: Option<f64>,

    /// Seconds without a face before a no_face event
    #[arg(long)]
    no_face_threshold: Option<f64>,

    /// Minimum milliseconds between two events of the same type
    #[arg(long)]
    event_cooldown_ms: Option<u64>,

    /// Minimum milliseconds between two alerts of the same type
    #[arg(long)]
    alert_cooldown_ms: Option<u64>,

    /// Fire a sustained condition again after each threshold period
    #[arg(long)]
    repeat_sustained: bool,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut MonitorConfig) {
        if let Some(secs) = self.focus_threshold {
            config.focus_loss_threshold_secs = secs;
        }
        if let Some(secs) = self.no_face_threshold {
            config.no_face_threshold_secs = secs;
        }
        if let Some(ms) = self.event_cooldown_ms {
            config.event_cooldown_ms = ms;
        }
        if let Some(ms) = self.alert_cooldown_ms {
            config.alert_cooldown_ms = ms;
        }
        if self.repeat_sustained {
            config.repeat_sustained_events = true;
        }
    }
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

#[derive(Clone, ValueEnum)]
enum OrderArg {
    OldestFirst,
    NewestFirst,
}

impl From<OrderArg> for EventOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::OldestFirst => EventOrder::OldestFirst,
            OrderArg::NewestFirst => EventOrder::NewestFirst,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    match run(cli.command) {
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

fn run(command: Commands) -> Result<(), ProctorCliError> {
    match command {
        Commands::Replay {
            input,
            output,
            input_format,
            config,
            overrides,
            order,
            pretty,
        } => {
            let config = load_config(config.as_deref(), &overrides)?;
            cmd_replay(&input, &output, input_format, &config, order.into(), pretty)
        }
        Commands::Run {
            config,
            overrides,
            no_flush,
            bell,
        } => {
            let config = load_config(config.as_deref(), &overrides)?;
            cmd_run(&config, !no_flush, bell)
        }
        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),
        Commands::Config => cmd_config(),
        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    config: &MonitorConfig,
    order: EventOrder,
    pretty: bool,
) -> Result<(), ProctorCliError> {
    let records = read_records(input, input_format)?;
    if records.is_empty() {
        return Err(ProctorCliError::NoRecords);
    }
    info!("replaying {} records", records.len());

    let report = replay_records(&records, config)?;
    let report = reorder(report, order);

    let mut output_data = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    output_data.push('\n');

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_run(config: &MonitorConfig, flush: bool, bell: bool) -> Result<(), ProctorCliError> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut processor: Option<MonitorProcessor> = None;
    let mut last_timestamp = None;

    for (line_num, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: TranscriptRecord = serde_json::from_str(trimmed).map_err(|e| {
            ProctorCliError::ParseError(format!("Failed to parse line {}: {}", line_num + 1, e))
        })?;
        record.validate().map_err(MonitorError::from)?;
        last_timestamp = Some(record.timestamp());

        let outcome = match processor.as_mut() {
            Some(active) => active.apply_record(&record)?,
            None => {
                let started = start_processor(&record, config)?;
                processor = Some(if bell {
                    started.with_cue(Arc::new(BellCue))
                } else {
                    started
                });
                continue;
            }
        };

        if outcome.is_empty() {
            debug!("line {}: nothing emitted", line_num + 1);
            continue;
        }
        writeln!(stdout, "{}", serde_json::to_string(&outcome)?)?;
        if flush {
            stdout.flush()?;
        }
    }

    let (Some(processor), Some(now)) = (processor, last_timestamp) else {
        return Err(ProctorCliError::NoRecords);
    };
    writeln!(stdout, "{}", serde_json::to_string(&processor.report(now))?)?;
    stdout.flush()?;

    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    json: bool,
) -> Result<(), ProctorCliError> {
    let records = read_records(input, input_format)?;
    let results = TranscriptAdapter::validate_records(&records);

    let report = ValidationReport {
        total_records: records.len(),
        valid_records: records.len() - results.len(),
        invalid_records: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                kind: r.kind.to_string(),
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - {} record (index {}): {}", err.kind, err.index, err.error);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(ProctorCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_config() -> Result<(), ProctorCliError> {
    println!("{}", MonitorConfig::default().to_json()?);
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), ProctorCliError> {
    let mut checks: Vec<DoctorCheck> = vec![DoctorCheck {
        name: "proctor_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Proctor version {}", PROCTOR_VERSION),
    }];

    match config {
        Some(path) if !path.exists() => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: "Config file does not exist, defaults will be used".to_string(),
        }),
        Some(path) => match MonitorConfig::from_file(path) {
            Ok(config) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Config valid (focus {}s, no face {}s, sampling every {}ms)",
                    config.focus_loss_threshold_secs,
                    config.no_face_threshold_secs,
                    config.sampling_interval_ms
                ),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Invalid config: {}", e),
            }),
        },
        None => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "No config file given, defaults will be used".to_string(),
        }),
    }

    let stdin_message = if atty::is(atty::Stream::Stdin) {
        "stdin is a TTY (interactive mode)"
    } else {
        "stdin is a pipe (streaming mode ready)"
    };
    checks.push(DoctorCheck {
        name: "stdin".to_string(),
        status: CheckStatus::Ok,
        message: stdin_message.to_string(),
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: PROCTOR_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Proctor Doctor Report");
        println!("=====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(ProctorCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn load_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<MonitorConfig, ProctorCliError> {
    let mut config = match path {
        Some(path) => MonitorConfig::from_file(path)?,
        None => MonitorConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate().map_err(MonitorError::from)?;
    debug!("effective config: {:?}", config);
    Ok(config)
}

fn start_processor(
    record: &TranscriptRecord,
    config: &MonitorConfig,
) -> Result<MonitorProcessor, ProctorCliError> {
    match record {
        TranscriptRecord::Start {
            timestamp,
            candidate_name,
        } => Ok(MonitorProcessor::start(candidate_name, config, *timestamp)?),
        other => Err(ProctorCliError::ParseError(format!(
            "Transcript must begin with a start record, found {}",
            other.kind()
        ))),
    }
}

fn read_records(
    input: &Path,
    input_format: InputFormat,
) -> Result<Vec<TranscriptRecord>, ProctorCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let records = match input_format {
        InputFormat::Ndjson => TranscriptAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => TranscriptAdapter::parse_array(&input_data)?,
    };
    Ok(records)
}

fn reorder(mut report: Report, order: EventOrder) -> Report {
    if order == EventOrder::NewestFirst {
        report.events.reverse();
    }
    report
}

// Error types

#[derive(Debug)]
enum ProctorCliError {
    Io(io::Error),
    Monitor(MonitorError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for ProctorCliError {
    fn from(e: io::Error) -> Self {
        ProctorCliError::Io(e)
    }
}

impl From<MonitorError> for ProctorCliError {
    fn from(e: MonitorError) -> Self {
        ProctorCliError::Monitor(e)
    }
}

impl From<serde_json::Error> for ProctorCliError {
    fn from(e: serde_json::Error) -> Self {
        ProctorCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ProctorCliError> for CliError {
    fn from(e: ProctorCliError) -> Self {
        match e {
            ProctorCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ProctorCliError::Monitor(MonitorError::Config(e)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'proctor config' to see a valid configuration".to_string()),
            },
            ProctorCliError::Monitor(e @ MonitorError::Validation(_)) => CliError {
                code: "VALIDATION_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'proctor validate' for details".to_string()),
            },
            ProctorCliError::Monitor(e) => CliError {
                code: "SESSION_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Ensure the transcript starts with a start record".to_string()),
            },
            ProctorCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ProctorCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Ensure input is not empty".to_string()),
            },
            ProctorCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            ProctorCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            ProctorCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    kind: String,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
