//! Command-line interface for the Indy build replay harness.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use indy_harness_config::{
    ENV_BUILD_PROC_NUM, ENV_BUILD_TYPE, ENV_TARGET, EnvironmentSettings, PackageType,
    parse_package_type, parse_workers,
};
use indy_harness_core::event::DEFAULT_SETTLE_DELAY;
use indy_harness_core::integration::DEFAULT_ROUTINES;
use indy_harness_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
use tracing::{Instrument, error, info_span};
use uuid::Uuid;

use crate::client::{AppContext, CliResult};
use crate::commands::build::handle_build;
use crate::commands::dataset::handle_dataset;
use crate::commands::datest::handle_datest;
use crate::commands::event::handle_event;
use crate::commands::integration::handle_integration;
use crate::commands::promote::handle_promote;

const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Parses CLI arguments, installs logging, and executes the requested
/// command. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let logging = LoggingConfig {
        level: &cli.log_level,
        format: cli.log_format.map_or_else(LogFormat::infer, LogFormat::from),
        build_sha: env!("CARGO_PKG_VERSION"),
    };
    let _ = init_logging(&logging);

    let command = command_label(&cli.command);
    let run_id = Uuid::new_v4();
    let result = dispatch(cli)
        .instrument(info_span!("harness", run_id = %run_id, command))
        .await;

    match result {
        Ok(()) => 0,
        Err(err) => {
            let message = err.display_message();
            error!(command, run_id = %run_id, error = %message, "command failed");
            eprintln!("error: {message}");
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli) -> CliResult<()> {
    let settings = EnvironmentSettings::from_env()?;
    let ctx = AppContext::from_settings(&settings, Duration::from_secs(cli.timeout))?;

    match cli.command {
        Command::Build(args) => handle_build(&ctx, args).await,
        Command::Promote(args) => handle_promote(&ctx, args).await,
        Command::Datest(args) => handle_datest(&ctx, args).await,
        Command::Dataset(args) => handle_dataset(&ctx, args).await,
        Command::Integrationtest(args) => handle_integration(&ctx, args).await,
        Command::Event(args) => handle_event(&ctx, args).await,
    }
}

const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Build(_) => "build",
        Command::Promote(_) => "promote",
        Command::Datest(_) => "datest",
        Command::Dataset(_) => "dataset",
        Command::Integrationtest(_) => "integrationtest",
        Command::Event(_) => "event",
    }
}

#[derive(Parser)]
#[command(
    name = "indy-harness",
    about = "Replay recorded builds against an Indy server and verify its behaviour"
)]
pub(crate) struct Cli {
    #[arg(long, global = true, default_value = DEFAULT_LOG_LEVEL)]
    pub(crate) log_level: String,
    #[arg(long, global = true, value_enum)]
    pub(crate) log_format: Option<LogFormatArg>,
    #[arg(
        long,
        global = true,
        env = "INDY_HARNESS_HTTP_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS
    )]
    pub(crate) timeout: u64,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Replay a build through its tracking record.
    Build(BuildArgs),
    /// Promote the uploads of a tracking record.
    Promote(PromoteArgs),
    /// Look up the metadata named by alignment reports.
    Datest(DatestArgs),
    /// Collect a test dataset for a PNC build.
    Dataset(DatasetArgs),
    /// Run the full dataset-driven integration test.
    Integrationtest(IntegrationArgs),
    /// Check repository events while replaying a build's uploads.
    Event(EventArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum LogFormatArg {
    Json,
    Pretty,
}

impl From<LogFormatArg> for LogFormat {
    fn from(format: LogFormatArg) -> Self {
        match format {
            LogFormatArg::Json => Self::Json,
            LogFormatArg::Pretty => Self::Pretty,
        }
    }
}

#[derive(Args, Debug)]
pub(crate) struct BuildArgs {
    /// Server the build was recorded on.
    pub(crate) original: String,
    /// Tracking record identifier on the original server.
    pub(crate) tracking_id: String,
    /// Server to replay against; defaults to the original server.
    #[arg(short = 't', long, env = ENV_TARGET)]
    pub(crate) target: Option<String>,
    #[arg(
        short = 'b',
        long,
        env = ENV_BUILD_TYPE,
        default_value = "maven",
        value_parser = parse_package
    )]
    pub(crate) package_type: PackageType,
    #[arg(
        short = 'p',
        long,
        env = ENV_BUILD_PROC_NUM,
        default_value_t = 1,
        value_parser = parse_worker_count
    )]
    pub(crate) workers: usize,
    /// Override the worker-count derived failure policy.
    #[arg(long)]
    pub(crate) fail_fast: Option<bool>,
    #[arg(long)]
    pub(crate) clear_cache: bool,
    #[arg(long)]
    pub(crate) dry_run: bool,
    /// Extra group constituent, as a store key.
    #[arg(long = "additional-repo")]
    pub(crate) additional_repos: Vec<String>,
    /// Read the tracking record from a file instead of the original server.
    #[arg(long)]
    pub(crate) record_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct PromoteArgs {
    /// Tracking record identifier on the target server.
    pub(crate) tracking_id: String,
    /// Hosted repository name or full store key to promote into.
    pub(crate) promote_target: Option<String>,
    #[arg(short = 't', long, env = ENV_TARGET)]
    pub(crate) target: String,
    #[arg(
        short = 'b',
        long,
        env = ENV_BUILD_TYPE,
        default_value = "maven",
        value_parser = parse_package
    )]
    pub(crate) package_type: PackageType,
    /// Source store key; defaults to the store of the first upload.
    #[arg(long)]
    pub(crate) source: Option<String>,
    /// Renumber promoted paths to `redhat-<version>`.
    #[arg(long)]
    pub(crate) new_version: Option<String>,
    #[arg(long)]
    pub(crate) dry_run: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DatestArgs {
    /// Group serving the aligned metadata, e.g. `DA`.
    pub(crate) da_group: String,
    /// Directory of alignment report JSON files.
    pub(crate) report_dir: PathBuf,
    #[arg(short = 't', long, env = ENV_TARGET)]
    pub(crate) target: String,
    #[arg(
        short = 'p',
        long,
        env = ENV_BUILD_PROC_NUM,
        default_value_t = DEFAULT_ROUTINES,
        value_parser = parse_worker_count
    )]
    pub(crate) workers: usize,
}

#[derive(Args, Debug)]
pub(crate) struct DatasetArgs {
    /// PNC base URL.
    pub(crate) pnc: String,
    /// Indy server holding the tracking records.
    pub(crate) indy: String,
    /// PNC build or group build id.
    pub(crate) build_id: String,
    /// Directory the `dataset/` tree is created in.
    #[arg(long, default_value = ".")]
    pub(crate) root: PathBuf,
}

#[derive(Args, Debug)]
pub(crate) struct IntegrationArgs {
    /// Git URL of the dataset repository.
    pub(crate) dataset_repo: String,
    /// Dataset entry, e.g. `2836` or `2836/builds/AMJMVSDA5EAAE`.
    pub(crate) build_id: String,
    /// Hosted repository to promote into.
    pub(crate) promote_target: Option<String>,
    /// Group name or store key whose metadata is checked.
    pub(crate) meta_check_repo: Option<String>,
    #[arg(short = 't', long, env = ENV_TARGET)]
    pub(crate) target: String,
    #[arg(
        short = 'p',
        long,
        env = ENV_BUILD_PROC_NUM,
        default_value_t = DEFAULT_ROUTINES,
        value_parser = parse_worker_count
    )]
    pub(crate) workers: usize,
    #[arg(long)]
    pub(crate) clear_cache: bool,
    #[arg(short = 'd', long)]
    pub(crate) dry_run: bool,
    /// Stay alive after the checks for debugging.
    #[arg(long)]
    pub(crate) keep_alive: bool,
    /// Seconds to wait after promotion and rollback.
    #[arg(long, default_value_t = DEFAULT_SETTLE_DELAY.as_secs())]
    pub(crate) settle_secs: u64,
    /// Directory the dataset repository is cloned into.
    #[arg(long)]
    pub(crate) workspace: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct EventArgs {
    /// Server the build was recorded on.
    pub(crate) original: String,
    /// Tracking record identifier on the original server.
    pub(crate) tracking_id: String,
    #[arg(short = 't', long, env = ENV_TARGET)]
    pub(crate) target: Option<String>,
    #[arg(
        short = 'b',
        long,
        env = ENV_BUILD_TYPE,
        default_value = "maven",
        value_parser = parse_package
    )]
    pub(crate) package_type: PackageType,
    #[arg(
        short = 'p',
        long,
        env = ENV_BUILD_PROC_NUM,
        default_value_t = 1,
        value_parser = parse_worker_count
    )]
    pub(crate) workers: usize,
    /// Reuse cached upload content from an earlier run.
    #[arg(long)]
    pub(crate) keep_cache: bool,
    #[arg(long)]
    pub(crate) dry_run: bool,
    #[arg(long = "additional-repo")]
    pub(crate) additional_repos: Vec<String>,
    /// Seconds to wait for the server to process repository events.
    #[arg(long, default_value_t = DEFAULT_SETTLE_DELAY.as_secs())]
    pub(crate) settle_secs: u64,
}

fn parse_package(input: &str) -> Result<PackageType, String> {
    parse_package_type(input).map_err(|err| err.detail())
}

fn parse_worker_count(input: &str) -> Result<usize, String> {
    parse_workers(input).map_err(|err| err.detail())
}
