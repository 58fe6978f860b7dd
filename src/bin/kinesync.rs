//! Kinesync CLI - Command-line interface for the behavior synchronization engine
//!
//! Commands:
//! - plan: Synchronize behavior requests into plans (batch mode)
//! - run: Plan streaming requests from stdin against live plans (streaming mode)
//! - validate: Validate behavior requests
//! - markers: Print speech timing markers for an utterance
//! - profiles: List or show cultural profiles
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use kinesync::types::{Formality, SpeechContext};
use kinesync::{
    BehaviorCoordinator, BehaviorRequest, BehaviorTables, CulturalDatabase, MotionSensitivity,
    SpeechTimingAnalyzer, SyncConfig, SyncError, SynchronizedBehaviorPlan, KINESYNC_VERSION,
    PRODUCER_NAME,
};

/// Kinesync - Speech-aligned behavior scheduling for virtual characters
#[derive(Parser)]
#[command(name = "kinesync")]
#[command(version = KINESYNC_VERSION)]
#[command(about = "Synchronize gestures, expressions and head movements with speech", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Engine configuration shared by the planning commands
#[derive(clap::Args)]
struct EngineArgs {
    /// Pipeline configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Per-type timing table overrides (JSON)
    #[arg(long)]
    tables: Option<PathBuf>,

    /// Cultural profile database (JSON list); built-in profiles when absent
    #[arg(long)]
    profiles: Option<PathBuf>,

    /// Motion sensitivity preference
    #[arg(long, default_value = "full")]
    motion: MotionLevel,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize behavior requests into plans (batch mode)
    Plan {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Plan streaming requests from stdin against live plans (streaming mode)
    Run {
        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Advance the coordinator clock by this much after each request (ms)
        #[arg(long, default_value = "0")]
        advance_ms: f64,

        /// Flush output after each record
        #[arg(long, default_value = "true")]
        flush: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Validate behavior requests
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print speech timing markers for an utterance
    Markers {
        /// Utterance text
        #[arg(long)]
        text: String,

        /// Estimated speech duration (ms)
        #[arg(long)]
        duration_ms: f64,

        /// Conversation formality
        #[arg(long, default_value = "neutral")]
        formality: FormalityArg,

        /// Cultural region whose speech tempo applies
        #[arg(long)]
        region: Option<String>,
    },

    /// List cultural profiles, or show one
    Profiles {
        /// Region to show in full
        #[arg(long)]
        region: Option<String>,

        /// Cultural profile database (JSON list); built-in profiles when absent
        #[arg(long)]
        profiles: Option<PathBuf>,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Check a pipeline configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Check a cultural profile database file
        #[arg(long)]
        profiles: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one request per line)
    Ndjson,
    /// A single JSON request
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one plan per line)
    Ndjson,
    /// JSON array of plans
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum MotionLevel {
    Full,
    Reduced,
    Minimal,
}

impl From<MotionLevel> for MotionSensitivity {
    fn from(level: MotionLevel) -> Self {
        match level {
            MotionLevel::Full => MotionSensitivity::Full,
            MotionLevel::Reduced => MotionSensitivity::Reduced,
            MotionLevel::Minimal => MotionSensitivity::Minimal,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FormalityArg {
    Casual,
    Neutral,
    Formal,
}

impl From<FormalityArg> for Formality {
    fn from(arg: FormalityArg) -> Self {
        match arg {
            FormalityArg::Casual => Formality::Casual,
            FormalityArg::Neutral => Formality::Neutral,
            FormalityArg::Formal => Formality::Formal,
        }
    }
}

fn main() -> ExitCode {
    // Logs go to stderr; stdout carries plan output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

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

fn run(cli: Cli) -> Result<(), KinesyncCliError> {
    match cli.command {
        Commands::Plan {
            input,
            output,
            input_format,
            output_format,
            engine,
        } => cmd_plan(&input, &output, input_format, output_format, &engine),

        Commands::Run {
            output_format,
            advance_ms,
            flush,
            engine,
        } => cmd_run(output_format, advance_ms, flush, &engine),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Markers {
            text,
            duration_ms,
            formality,
            region,
        } => cmd_markers(&text, duration_ms, formality, region.as_deref()),

        Commands::Profiles { region, profiles } => cmd_profiles(region.as_deref(), profiles.as_deref()),

        Commands::Doctor {
            config,
            profiles,
            json,
        } => cmd_doctor(config.as_deref(), profiles.as_deref(), json),
    }
}

fn cmd_plan(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    engine: &EngineArgs,
) -> Result<(), KinesyncCliError> {
    let input_data = read_input(input)?;
    let requests = parse_requests(&input_data, &input_format)?;

    if requests.is_empty() {
        return Err(KinesyncCliError::NoRequests);
    }

    // Requests in one batch are independent; none is checked against another
    let coordinator = build_coordinator(engine)?;
    let mut plans: Vec<SynchronizedBehaviorPlan> = Vec::with_capacity(requests.len());
    for request in &requests {
        plans.push(coordinator.synchronize_request(request)?);
    }

    let output_data = format_output(&plans, &output_format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_run(
    output_format: OutputFormat,
    advance_ms: f64,
    flush: bool,
    engine: &EngineArgs,
) -> Result<(), KinesyncCliError> {
    let mut coordinator = build_coordinator(engine)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let request = BehaviorRequest::from_json(trimmed).map_err(|e| {
            KinesyncCliError::ParseError(format!("Failed to parse request: {}", e))
        })?;

        let plan = coordinator.plan(&request)?;
        let output = format_output(std::slice::from_ref(plan.as_ref()), &output_format)?;

        write!(stdout, "{}", output)?;
        if flush {
            stdout.flush()?;
        }

        coordinator.advance_time(advance_ms);
    }

    stdout.flush()?;
    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    json: bool,
) -> Result<(), KinesyncCliError> {
    let input_data = read_input(input)?;

    let documents: Vec<&str> = match input_format {
        InputFormat::Ndjson => input_data
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect(),
        InputFormat::Json => vec![input_data.as_str()],
    };

    let errors: Vec<ValidationErrorDetail> = documents
        .iter()
        .enumerate()
        .filter_map(|(index, doc)| {
            let result = BehaviorRequest::from_json(doc).and_then(|r| r.validate());
            result.err().map(|e| ValidationErrorDetail {
                index,
                error: e.to_string(),
            })
        })
        .collect();

    let report = ValidationReport {
        total_requests: documents.len(),
        valid_requests: documents.len() - errors.len(),
        invalid_requests: errors.len(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total requests:   {}", report.total_requests);
        println!("Valid requests:   {}", report.valid_requests);
        println!("Invalid requests: {}", report.invalid_requests);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Request {}: {}", err.index, err.error);
            }
        }
    }

    if report.invalid_requests > 0 {
        Err(KinesyncCliError::ValidationFailed(report.invalid_requests))
    } else {
        Ok(())
    }
}

fn cmd_markers(
    text: &str,
    duration_ms: f64,
    formality: FormalityArg,
    region: Option<&str>,
) -> Result<(), KinesyncCliError> {
    let tempo = match region {
        Some(region) => {
            let database = CulturalDatabase::builtin();
            let profile = database
                .get(region)
                .ok_or_else(|| SyncError::UnknownCulturalProfile(region.to_string()))?;
            profile.speech_tempo
        }
        None => 1.0,
    };

    let context = SpeechContext {
        formality: formality.into(),
        ..SpeechContext::default()
    };
    let config = SyncConfig::default();
    let markers =
        SpeechTimingAnalyzer::new(config.timing).analyze_with_tempo(text, duration_ms, &context, tempo);

    println!("{}", serde_json::to_string_pretty(&markers)?);
    Ok(())
}

fn cmd_profiles(region: Option<&str>, profiles: Option<&Path>) -> Result<(), KinesyncCliError> {
    let database = load_profiles(profiles)?;

    match region {
        Some(region) => {
            let profile = database
                .get(region)
                .ok_or_else(|| SyncError::UnknownCulturalProfile(region.to_string()))?;
            println!("{}", serde_json::to_string_pretty(profile)?);
        }
        None => {
            println!("Cultural Profiles");
            println!("=================");
            for profile in database.profiles() {
                println!(
                    "  {:<18} {} (intensity x{:.2}, frequency x{:.2}, tempo x{:.2})",
                    profile.region,
                    profile.display_name,
                    profile.intensity_scale,
                    profile.frequency_scale,
                    profile.speech_tempo
                );
            }
        }
    }

    Ok(())
}

fn cmd_doctor(
    config: Option<&Path>,
    profiles: Option<&Path>,
    json: bool,
) -> Result<(), KinesyncCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "kinesync_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Kinesync version {}", KINESYNC_VERSION),
    });

    if let Some(config_path) = config {
        checks.push(check_file(config_path, "config", |content| {
            SyncConfig::from_json(content)
                .and_then(|c| c.validate())
                .map(|()| "Configuration valid".to_string())
        }));
    } else {
        let status = match SyncConfig::default().validate() {
            Ok(()) => CheckStatus::Ok,
            Err(_) => CheckStatus::Error,
        };
        checks.push(DoctorCheck {
            name: "config".to_string(),
            status,
            message: "Using default configuration".to_string(),
        });
    }

    if let Some(profiles_path) = profiles {
        checks.push(check_file(profiles_path, "profiles", |content| {
            CulturalDatabase::from_json(content)
                .map(|db| format!("Profile database valid ({} regions)", db.len()))
        }));
    } else {
        checks.push(DoctorCheck {
            name: "profiles".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "Using built-in profiles ({} regions)",
                CulturalDatabase::builtin().len()
            ),
        });
    }

    // Check stdin is available (for streaming mode)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: KINESYNC_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Kinesync Doctor Report");
        println!("======================");
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

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(KinesyncCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, KinesyncCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_requests(
    input_data: &str,
    input_format: &InputFormat,
) -> Result<Vec<BehaviorRequest>, KinesyncCliError> {
    match input_format {
        InputFormat::Json => Ok(vec![BehaviorRequest::from_json(input_data)?]),
        InputFormat::Ndjson => input_data
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .enumerate()
            .map(|(i, line)| {
                BehaviorRequest::from_json(line).map_err(|e| {
                    KinesyncCliError::ParseError(format!("Line {}: {}", i + 1, e))
                })
            })
            .collect(),
    }
}

fn load_profiles(path: Option<&Path>) -> Result<CulturalDatabase, KinesyncCliError> {
    match path {
        Some(path) => Ok(CulturalDatabase::from_json(&fs::read_to_string(path)?)?),
        None => Ok(CulturalDatabase::builtin()),
    }
}

fn build_coordinator(engine: &EngineArgs) -> Result<BehaviorCoordinator, KinesyncCliError> {
    let config = match &engine.config {
        Some(path) => SyncConfig::from_json(&fs::read_to_string(path)?)?,
        None => SyncConfig::default(),
    };
    let tables = match &engine.tables {
        Some(path) => BehaviorTables::from_json(&fs::read_to_string(path)?)?,
        None => BehaviorTables::default(),
    };
    let profiles = load_profiles(engine.profiles.as_deref())?;

    Ok(BehaviorCoordinator::new(
        config,
        tables,
        profiles,
        engine.motion.into(),
    )?)
}

fn check_file(
    path: &Path,
    name: &str,
    parse: impl Fn(&str) -> kinesync::Result<String>,
) -> DoctorCheck {
    if !path.exists() {
        return DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: format!("{} does not exist", path.display()),
        };
    }
    match fs::read_to_string(path) {
        Ok(content) => match parse(&content) {
            Ok(message) => DoctorCheck {
                name: name.to_string(),
                status: CheckStatus::Ok,
                message,
            },
            Err(e) => DoctorCheck {
                name: name.to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            },
        },
        Err(e) => DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot read {}: {}", path.display(), e),
        },
    }
}

fn format_output(
    plans: &[SynchronizedBehaviorPlan],
    format: &OutputFormat,
) -> Result<String, KinesyncCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for plan in plans {
                lines.push(serde_json::to_string(plan)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(plans)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(plans)?),
    }
}

// Error types

#[derive(Debug)]
enum KinesyncCliError {
    Io(io::Error),
    Sync(SyncError),
    Json(serde_json::Error),
    NoRequests,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for KinesyncCliError {
    fn from(e: io::Error) -> Self {
        KinesyncCliError::Io(e)
    }
}

impl From<SyncError> for KinesyncCliError {
    fn from(e: SyncError) -> Self {
        KinesyncCliError::Sync(e)
    }
}

impl From<serde_json::Error> for KinesyncCliError {
    fn from(e: serde_json::Error) -> Self {
        KinesyncCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<KinesyncCliError> for CliError {
    fn from(e: KinesyncCliError) -> Self {
        match e {
            KinesyncCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            KinesyncCliError::Sync(e) => {
                let (code, hint) = match &e {
                    SyncError::InvalidBehaviorEvent { .. } | SyncError::InvalidRequest(_) => {
                        ("INVALID_REQUEST", "Run 'kinesync validate' for details")
                    }
                    SyncError::UnknownCulturalProfile(_) => {
                        ("UNKNOWN_PROFILE", "Run 'kinesync profiles' to list regions")
                    }
                    SyncError::UnknownPlan(_) => ("UNKNOWN_PLAN", "The plan may have finished"),
                    SyncError::InvalidConfig(_) => {
                        ("INVALID_CONFIG", "Run 'kinesync doctor --config <file>'")
                    }
                    SyncError::ObserverFailed(_) => ("OBSERVER_FAILED", "Check observer setup"),
                    SyncError::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            KinesyncCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            KinesyncCliError::NoRequests => CliError {
                code: "NO_REQUESTS".to_string(),
                message: "No requests found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            KinesyncCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} requests failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            KinesyncCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            KinesyncCliError::ParseError(msg) => CliError {
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
    total_requests: usize,
    valid_requests: usize,
    invalid_requests: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
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
