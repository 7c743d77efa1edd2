mod activity;
mod auth;
mod config;
mod forge;
mod pipeline;
mod report;
mod window;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use chrono::NaiveDate;
use clap::Parser;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use auth::AuthError;
use config::{Config, ConfigError, Credentials};
use forge::gh_cli::{GhCliForge, GhCommand};
use forge::rest::{RestForge, DEFAULT_API_URL};
use forge::retry::DEFAULT_MAX_RETRIES;
use forge::{Forge, ForgeError, RetryPolicy};
use pipeline::{CancellationFlag, OrganizationPipeline, RepoFilter};
use report::{ReportError, ReportWriter, RunStatus};
use window::DateWindow;

/// Exit code for a run stopped by Ctrl+C.
const EXIT_INTERRUPTED: u8 = 130;

/// Collect pull request activity (creation, comments, reviews, merges) across every
/// repository of a GitHub organization into a single JSON report.
#[derive(Parser, Debug)]
#[command(name = "pr-activity", version, about)]
struct Cli {
    /// GitHub organization name
    #[arg(long)]
    org: String,

    /// Output JSON file [default: <org>.json]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// GitHub personal access token (falls back to GITHUB_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// GitHub App ID (falls back to GITHUB_APP_ID)
    #[arg(long)]
    app_id: Option<u64>,

    /// GitHub App private key PEM file (falls back to GITHUB_APP_PRIVATE_KEY)
    #[arg(long)]
    private_key: Option<PathBuf>,

    /// GitHub App installation ID (falls back to GITHUB_APP_INSTALLATION_ID)
    #[arg(long)]
    installation_id: Option<u64>,

    /// Start date, inclusive (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    since: Option<NaiveDate>,

    /// End date, inclusive (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    until: Option<NaiveDate>,

    /// Also log progress to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Fetch through the `gh` CLI instead of the REST API (useful for EMU orgs)
    #[arg(long)]
    use_gh_cli: bool,

    /// Path to the `gh` executable
    #[arg(long)]
    gh_path: Option<PathBuf>,

    /// REST API base URL, for GitHub Enterprise Server
    #[arg(long)]
    api_url: Option<String>,

    /// Only include repos matching this glob, e.g. '*api*' (repeatable)
    #[arg(long = "include-repo", value_name = "PATTERN")]
    include_repo: Vec<String>,

    /// Exclude repos matching this glob, e.g. '*test*' (repeatable)
    #[arg(long = "ignore-repo", value_name = "PATTERN")]
    ignore_repo: Vec<String>,

    /// Attempts per rate-limited call before giving up
    #[arg(long)]
    max_retries: Option<u32>,

    /// Debug log file [default: <org>.log]
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| format!("Invalid date format. Use YYYY-MM-DD: {e}"))
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Forge(#[from] ForgeError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

enum Backend {
    Rest {
        api_url: String,
        credentials: Credentials,
    },
    GhCli {
        program: PathBuf,
    },
}

/// Everything a run needs, after merging CLI flags over the config file.
struct Settings {
    org: String,
    output: PathBuf,
    window: DateWindow,
    backend: Backend,
    max_retries: u32,
    filter: RepoFilter,
}

impl Settings {
    fn resolve(cli: Cli, config: Config) -> Result<Settings, ConfigError> {
        let Config {
            mut github,
            fetch,
            repositories,
        } = config;

        let backend = if cli.use_gh_cli || fetch.use_gh_cli {
            Backend::GhCli {
                program: cli.gh_path.or(fetch.gh_path).unwrap_or_else(|| PathBuf::from("gh")),
            }
        } else {
            if cli.token.is_some() {
                github.token = cli.token;
            }
            if cli.app_id.is_some() {
                github.app_id = cli.app_id;
            }
            if cli.private_key.is_some() {
                github.private_key = cli.private_key;
            }
            if cli.installation_id.is_some() {
                github.installation_id = cli.installation_id;
            }
            Backend::Rest {
                credentials: github.credentials()?,
                api_url: cli
                    .api_url
                    .or(github.api_url)
                    .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            }
        };

        let include: Vec<String> = repositories.include.into_iter().chain(cli.include_repo).collect();
        let exclude: Vec<String> = repositories.exclude.into_iter().chain(cli.ignore_repo).collect();
        if !include.is_empty() {
            info!(patterns = %include.join(", "), "including only matching repositories");
        }
        if !exclude.is_empty() {
            info!(patterns = %exclude.join(", "), "excluding matching repositories");
        }

        Ok(Settings {
            output: cli
                .output
                .unwrap_or_else(|| PathBuf::from(format!("{}.json", cli.org))),
            org: cli.org,
            window: DateWindow::new(cli.since, cli.until),
            backend,
            max_retries: cli
                .max_retries
                .or(fetch.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            filter: RepoFilter::new(&include, &exclude)?,
        })
    }
}

fn exit_code(status: RunStatus) -> u8 {
    match status {
        RunStatus::Complete => 0,
        RunStatus::Interrupted => EXIT_INTERRUPTED,
        RunStatus::Failed => 1,
    }
}

/// File layer at DEBUG for the whole run, plus stderr at INFO when `verbose`.
fn init_logging(log_file: &Path, verbose: bool) {
    let file_layer = match File::create(log_file) {
        Ok(file) => Some(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_filter(EnvFilter::new("info,pr_activity=debug")),
        ),
        Err(err) => {
            eprintln!("Warning: cannot create log file {}: {err}", log_file.display());
            None
        }
    };

    let stderr_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,pr_activity=info")),
            )
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .init();
}

async fn build_forge(backend: &Backend) -> Result<Box<dyn Forge>, AppError> {
    match backend {
        Backend::GhCli { program } => {
            info!(gh = %program.display(), "using gh CLI for data fetching");
            Ok(Box::new(GhCliForge::new(GhCommand::new(program.clone()))))
        }
        Backend::Rest {
            api_url,
            credentials,
        } => {
            let token = auth::authenticate(credentials, api_url).await?;
            Ok(Box::new(RestForge::new(api_url, token)?))
        }
    }
}

async fn run(settings: Settings) -> Result<RunStatus, AppError> {
    let forge = build_forge(&settings.backend).await?;
    let retry = RetryPolicy::new(settings.max_retries).with_cap(forge.backoff_cap());

    if !settings.window.is_unbounded() {
        info!(window = %settings.window, "date filter");
    }

    let cancel = CancellationFlag::new();
    cancel.cancel_on_ctrl_c();

    let pipeline = OrganizationPipeline::new(forge.as_ref(), retry, settings.window)
        .with_filter(settings.filter)
        .with_cancellation(cancel.clone());
    let mut writer = ReportWriter::new(&settings.org, settings.window, &settings.output);

    info!(org = %settings.org, backend = forge.name(), "fetching PR data");
    let status = match pipeline.run(&settings.org, &mut writer).await {
        Ok(summary) => {
            info!(
                listed = summary.repositories_listed,
                filtered = summary.repositories_filtered,
                failed = summary.repositories_failed,
                recorded = summary.repositories_recorded,
                prs = summary.pull_requests,
                "run finished"
            );
            if summary.interrupted || cancel.is_cancelled() {
                RunStatus::Interrupted
            } else {
                RunStatus::Complete
            }
        }
        Err(err) => {
            error!(error = %err, "run aborted");
            eprintln!("Error: {err}");
            RunStatus::Failed
        }
    };

    writer.persist()?;
    report::print_summary(writer.report(), status, writer.path());
    if status == RunStatus::Complete {
        info!(path = %writer.path().display(), "report written");
    } else {
        info!(path = %writer.path().display(), %status, "partial report saved");
        eprintln!("Partial report saved to: {}", writer.path().display());
    }
    Ok(status)
}

async fn execute(cli: Cli) -> Result<RunStatus, AppError> {
    let config = Config::load()?;
    let settings = Settings::resolve(cli, config)?;
    run(settings).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let log_file = cli
        .log_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.log", cli.org)));
    init_logging(&log_file, cli.verbose);

    let span = info_span!("pr_activity", org = %cli.org);
    match execute(cli).instrument(span).await {
        Ok(status) => ExitCode::from(exit_code(status)),
        Err(err) => {
            warn!(error = %err, "run did not start");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
