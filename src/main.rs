//! Binary entry point for the faultline CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Print the feature header
//! faultline header
//!
//! # Turn parser output into a feature file
//! faultline extract --sites sites.json --out chart_1.var.tsv
//!
//! # Run one predict round trip
//! faultline predict --subject chart_1.json \
//!     --var-features chart_1.var.tsv --legal x=String --legal count=int
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};

use faultline::error::{FaultlineError, FaultlineResult, OutputErrorCode};
use faultline::feature::FeatureRegistry;
use faultline::output::{emit_response, ErrorResponse, ExtractResponse, PredictResponse};
use faultline::predict::{PredictRequest, Predictor};
use faultline::site::UseSite;
use faultline::subject::Subject;
use faultline::tsv;

// ============================================================================
// CLI Structure
// ============================================================================

/// Repair-predicate synthesis for Java fault localization.
#[derive(Parser, Debug)]
#[command(
    name = "faultline",
    version,
    about = "Repair-predicate synthesis for Java fault localization"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Log level for tracing output.
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the tab-separated feature header.
    Header,
    /// Extract feature rows from a JSON array of use sites.
    Extract {
        /// JSON file holding the use sites.
        #[arg(long)]
        sites: PathBuf,
        /// Output TSV file (default: stdout).
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run one predict round trip against the external model.
    Predict {
        /// Subject configuration (JSON).
        #[arg(long)]
        subject: PathBuf,
        /// Variable-feature rows (TSV with header).
        #[arg(long)]
        var_features: Option<PathBuf>,
        /// Expression-feature rows (TSV with header).
        #[arg(long)]
        expr_features: Option<PathBuf>,
        /// In-scope variable as `<name>=<type>`; repeatable.
        #[arg(long = "legal", value_parser = parse_legal_variable)]
        legal: Vec<(String, String)>,
        /// JSON object mapping in-scope variable names to types.
        #[arg(long)]
        legal_file: Option<PathBuf>,
    },
}

/// Parse an in-scope variable in `<name>=<type>` format.
fn parse_legal_variable(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, ty)) if !name.trim().is_empty() && !ty.trim().is_empty() => {
            Ok((name.trim().to_string(), ty.trim().to_string()))
        }
        _ => Err(format!(
            "invalid variable '{}', expected '<name>=<type>' (e.g., 'count=int')",
            s
        )),
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            let response = ErrorResponse::from_error(&err);

            // Errors go to stdout as JSON, like every other response
            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();

            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Execute the CLI command.
fn execute(cli: Cli) -> FaultlineResult<()> {
    match cli.command {
        Command::Header => execute_header(),
        Command::Extract { sites, out } => execute_extract(&sites, out.as_deref()),
        Command::Predict {
            subject,
            var_features,
            expr_features,
            legal,
            legal_file,
        } => execute_predict(
            &subject,
            var_features.as_deref(),
            expr_features.as_deref(),
            legal,
            legal_file.as_deref(),
        ),
    }
}

// ============================================================================
// Commands
// ============================================================================

fn execute_header() -> FaultlineResult<()> {
    let registry = FeatureRegistry::with_defaults();
    let mut stdout = io::stdout();
    writeln!(stdout, "{}", registry.header())
        .map_err(|e| FaultlineError::io(Path::new("<stdout>"), e))
}

fn execute_extract(sites_path: &Path, out: Option<&Path>) -> FaultlineResult<()> {
    let content =
        fs::read_to_string(sites_path).map_err(|e| FaultlineError::io(sites_path, e))?;
    let sites: Vec<UseSite> = serde_json::from_str(&content).map_err(|e| {
        FaultlineError::invalid_args(format!(
            "{} is not a JSON array of use sites: {}",
            sites_path.display(),
            e
        ))
    })?;

    let registry = FeatureRegistry::with_defaults();
    let rows = registry.extract_all(&sites);
    debug!("Extracted {} rows from {} sites", rows.len(), sites.len());

    match out {
        Some(path) => {
            let written = tsv::write_feature_file(path, &registry.header(), &rows)
                .map_err(|e| FaultlineError::io(path, e))?;
            let response =
                ExtractResponse::new(sites.len(), written, path.display().to_string());
            emit_response(&response, &mut io::stdout())
                .map_err(|e| FaultlineError::io(Path::new("<stdout>"), e))
        }
        None => {
            let mut stdout = io::stdout().lock();
            let mut print = || -> io::Result<()> {
                writeln!(stdout, "{}", registry.header())?;
                for row in &rows {
                    writeln!(stdout, "{}", row)?;
                }
                stdout.flush()
            };
            print().map_err(|e| FaultlineError::io(Path::new("<stdout>"), e))
        }
    }
}

fn execute_predict(
    subject_path: &Path,
    var_features: Option<&Path>,
    expr_features: Option<&Path>,
    legal: Vec<(String, String)>,
    legal_file: Option<&Path>,
) -> FaultlineResult<()> {
    if var_features.is_none() && expr_features.is_none() {
        return Err(FaultlineError::invalid_args(
            "at least one of --var-features or --expr-features is required",
        ));
    }

    let subject = Subject::load(subject_path)?;
    let mut legal_variables = match legal_file {
        Some(path) => read_legal_file(path)?,
        None => BTreeMap::new(),
    };
    legal_variables.extend(legal);

    let request = PredictRequest {
        var_features: read_rows(var_features)?,
        expr_features: read_rows(expr_features)?,
        legal_variables,
    };
    info!(
        "Predicting for {} with {} variable rows, {} expression rows, {} legal variables",
        subject.key(),
        request.var_features.len(),
        request.expr_features.len(),
        request.legal_variables.len()
    );

    let predictor = Predictor::with_defaults();
    let (conditions, report) = predictor.predict_with_report(&subject, &request);

    let response = PredictResponse::new(subject.key(), conditions, report);
    emit_response(&response, &mut io::stdout())
        .map_err(|e| FaultlineError::io(Path::new("<stdout>"), e))
}

fn read_rows(path: Option<&Path>) -> FaultlineResult<Vec<faultline::feature::FeatureRow>> {
    match path {
        Some(path) => tsv::read_feature_rows(path).map_err(|e| FaultlineError::io(path, e)),
        None => Ok(Vec::new()),
    }
}

fn read_legal_file(path: &Path) -> FaultlineResult<BTreeMap<String, String>> {
    let content = fs::read_to_string(path).map_err(|e| FaultlineError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        FaultlineError::invalid_args(format!(
            "{} is not a JSON object of name to type: {}",
            path.display(),
            e
        ))
    })
}
