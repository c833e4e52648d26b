//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use livecourses_core::envelope;
use livecourses_core::{Pipeline, PipelineOutcome, PipelineStage, ProgressReporter, SilentProgress};
use livecourses_scrape::HealthProber;
use livecourses_shared::{
    AppConfig, LiveCoursesError, PipelineConfig, ResultEnvelope, RunStatus, SearchCriteria,
    SearchRequest, init_config, load_config, load_config_from,
};
use tracing::{error, info};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Search live training courses and enrich them with details.
#[derive(Parser)]
#[command(
    name = "livecourses",
    version,
    about = "Search live training courses through a scrape provider and print a JSON result envelope.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.livecourses/livecourses.toml.
    #[arg(long, global = true, env = "LIVECOURSES_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a live course search.
    Search {
        /// Search keywords (defaults to the configured keywords).
        #[arg(short, long)]
        keywords: Option<String>,

        /// Search location (defaults to the configured location).
        #[arg(short, long)]
        location: Option<String>,

        #[command(flatten)]
        overrides: RunOverrides,
    },

    /// Run a search from a JSON request body: `{ "keywords"?, "location"? }`.
    Request {
        /// File holding the request body, or `-` for stdin.
        #[arg(default_value = "-")]
        input: String,

        #[command(flatten)]
        overrides: RunOverrides,
    },

    /// Check whether the scrape provider is reachable.
    Health,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Per-run overrides of config values.
#[derive(clap::Args, Clone, Debug)]
pub(crate) struct RunOverrides {
    /// Whole-run time budget in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Number of leading courses that get a detail fetch.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Disable the progress spinner.
    #[arg(long)]
    pub no_progress: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so stdout stays
/// pure JSON.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "livecourses=info",
        1 => "livecourses=debug",
        _ => "livecourses=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command and return the process exit code.
pub(crate) async fn run(cli: Cli) -> Result<i32> {
    let loaded = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    };

    match cli.command {
        Command::Search {
            keywords,
            location,
            overrides,
        } => {
            let config = match loaded {
                Ok(config) => config,
                Err(e) => return print_failure(&config_failure(&e)),
            };
            let request = SearchRequest { keywords, location };
            cmd_search(&config, request, &overrides).await
        }
        Command::Request { input, overrides } => {
            let config = match loaded {
                Ok(config) => config,
                Err(e) => return print_failure(&config_failure(&e)),
            };
            let request = match load_request(&input, &config) {
                Ok(request) => request,
                Err(env) => return print_failure(&env),
            };
            cmd_search(&config, request, &overrides).await
        }
        Command::Health => cmd_health(&loaded?).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&loaded?),
        },
    }
}

/// Envelope for a config file that could not be loaded.
fn config_failure(e: &LiveCoursesError) -> ResultEnvelope {
    error!(error = %e, "failed to load config");
    envelope::failure(
        RunStatus::ConfigError,
        SearchCriteria::default(),
        Vec::new(),
        e.to_string(),
    )
}

/// Read and parse the request body; any failure becomes an error envelope.
fn load_request(
    input: &str,
    config: &AppConfig,
) -> std::result::Result<SearchRequest, ResultEnvelope> {
    read_request(input).map_err(|e| {
        error!(error = %e, "rejected request body");
        envelope::failure(
            RunStatus::Error,
            SearchRequest::default().resolve(&config.defaults),
            Vec::new(),
            format!("{e:#}"),
        )
    })
}

fn print_failure(env: &ResultEnvelope) -> Result<i32> {
    println!("{}", serde_json::to_string_pretty(env)?);
    info!(status = %env.status, http_status = env.status.http_status(), "run rejected");
    Ok(1)
}

fn read_request(input: &str) -> Result<SearchRequest> {
    let body = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .wrap_err("failed to read request body from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input)
            .wrap_err_with(|| format!("failed to read request body from '{input}'"))?
    };

    if body.trim().is_empty() {
        return Ok(SearchRequest::default());
    }

    serde_json::from_str(&body).map_err(|e| eyre!("invalid request body: {e}"))
}

async fn cmd_search(
    config: &AppConfig,
    request: SearchRequest,
    overrides: &RunOverrides,
) -> Result<i32> {
    let criteria = request.resolve(&config.defaults);

    let mut pipeline_config = PipelineConfig::from(config);
    if let Some(secs) = overrides.timeout_secs {
        pipeline_config.global_timeout = Duration::from_secs(secs.max(1));
    }
    if let Some(limit) = overrides.limit {
        pipeline_config.enrichment_limit = limit;
    }

    info!(
        keywords = %criteria.keywords,
        location = %criteria.location,
        limit = pipeline_config.enrichment_limit,
        "searching live courses"
    );

    let pipeline = Pipeline::new(pipeline_config);
    let outcome = if overrides.no_progress {
        pipeline.run(criteria, &SilentProgress).await
    } else {
        let reporter = CliProgress::new();
        pipeline.run(criteria, &reporter).await
    };

    println!("{}", serde_json::to_string_pretty(&outcome.envelope)?);

    Ok(if outcome.http_status() == 200 { 0 } else { 1 })
}

async fn cmd_health(config: &AppConfig) -> Result<i32> {
    let pipeline_config = PipelineConfig::from(config);
    let prober = HealthProber::from_config(&pipeline_config)?;

    if prober.is_available().await {
        println!("available: {}", pipeline_config.base_url);
        Ok(0)
    } else {
        println!("unavailable: {}", pipeline_config.base_url);
        Ok(1)
    }
}

fn cmd_config_init() -> Result<i32> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(0)
}

fn cmd_config_show(config: &AppConfig) -> Result<i32> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(0)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, stage: PipelineStage) {
        self.spinner.set_message(stage.label());
    }

    fn candidate_progress(&self, title: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Enriching [{current}/{total}] {title}"));
    }

    fn done(&self, outcome: &PipelineOutcome) {
        self.spinner.finish_and_clear();
        eprintln!(
            "  {} — {} course(s) in {:.1}s (HTTP {})",
            outcome.status,
            outcome.envelope.total,
            outcome.elapsed.as_secs_f64(),
            outcome.http_status()
        );
    }
}
