use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use directories::BaseDirs;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use gastore::analytics::AnalyticsHttpClient;
use gastore::app::{App, SplitOptions, StoreOptions, StoreOutcome};
use gastore::config::{CONFIG_FILE, ConfigLoader, ResolvedConfig};
use gastore::error::GastoreError;
use gastore::output::{JsonOutput, OutputMode};
use gastore::query::Query;
use gastore::report::OutputFormat;
use gastore::split::{self, Frequency};
use gastore::store::{GcsHttpClient, UriStore};

#[derive(Parser)]
#[command(name = "gastore")]
#[command(about = "Fetch Google Analytics reports into content-addressed storage")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch one query and store the report")]
    Store(StoreArgs),
    #[command(about = "Split a date range into periods and store each one")]
    Split(SplitArgs),
    #[command(about = "Print the cache key a query resolves to")]
    Key(KeyArgs),
}

#[derive(Args, Clone)]
struct StoreArgs {
    /// Path to a JSON query document (reporting API batchGet body).
    #[arg(long)]
    query: String,

    /// Destination folder URI (file:// or gs://).
    #[arg(long)]
    folder: Option<String>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    format: Option<OutputFormat>,

    #[arg(long)]
    delimiter: Option<char>,

    /// Persist non-golden data instead of failing.
    #[arg(long)]
    allow_non_golden: bool,

    #[arg(long)]
    non_golden_folder: Option<String>,

    #[arg(long)]
    retries: Option<u32>,

    #[arg(long)]
    page_size: Option<u32>,

    #[arg(long)]
    sampling_level: Option<String>,
}

#[derive(Args)]
struct SplitArgs {
    #[command(flatten)]
    store: StoreArgs,

    #[arg(long)]
    start: String,

    #[arg(long)]
    end: String,

    /// Split frequency: D, W or M (daily/weekly/monthly also accepted).
    #[arg(long)]
    freq: String,

    #[arg(long)]
    date_format: Option<String>,

    #[arg(long)]
    week_start: Option<String>,
}

#[derive(Args)]
struct KeyArgs {
    #[arg(long)]
    query: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<GastoreError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GastoreError) -> u8 {
    match error {
        GastoreError::MissingConfig
        | GastoreError::ConfigRead(_)
        | GastoreError::ConfigParse(_)
        | GastoreError::QueryParse(_)
        | GastoreError::MultiReportQuery(_)
        | GastoreError::UnsupportedScheme(_)
        | GastoreError::UnsupportedFormat(_)
        | GastoreError::UnsupportedFrequency(_)
        | GastoreError::InvalidUri(_)
        | GastoreError::InvalidDate { .. }
        | GastoreError::InvalidWeekStart(_)
        | GastoreError::MissingCredentials(_) => 2,
        GastoreError::AnalyticsHttp(_)
        | GastoreError::AnalyticsTimeout(_)
        | GastoreError::AnalyticsStatus { .. }
        | GastoreError::EmptyResponse
        | GastoreError::ObjectStoreHttp(_)
        | GastoreError::ObjectStoreStatus { .. }
        | GastoreError::DataNotGolden
        | GastoreError::Filesystem(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Store(args) => run_store(args, output_mode),
        Commands::Split(args) => run_split(args, output_mode),
        Commands::Key(args) => run_key(args),
    }
}

fn run_store(args: StoreArgs, output_mode: OutputMode) -> miette::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let query = load_query(&args.query)?;
    let folder = resolve_folder(args.folder.as_deref(), &config)?;
    let options = build_store_options(&args, &config);

    let app = build_app()?;
    let outcome = app.store_query(&query, &folder, &options).into_diagnostic()?;

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_outcome(&outcome).into_diagnostic()?,
        OutputMode::Interactive => print_summary(std::slice::from_ref(&outcome)),
    }
    Ok(())
}

fn run_split(args: SplitArgs, output_mode: OutputMode) -> miette::Result<()> {
    let config = load_config(args.store.config.as_deref())?;
    let query = load_query(&args.store.query)?;
    let folder = resolve_folder(args.store.folder.as_deref(), &config)?;
    let options = build_store_options(&args.store, &config);

    let frequency: Frequency = args.freq.parse().into_diagnostic()?;
    let week_start = match &args.week_start {
        Some(value) => split::parse_week_start(value).into_diagnostic()?,
        None => config.week_start,
    };
    let split_options = SplitOptions {
        start_date: args.start,
        end_date: args.end,
        frequency,
        date_format: args
            .date_format
            .unwrap_or_else(|| config.date_format.clone()),
        week_start,
    };

    let app = build_app()?;
    let outcomes = app
        .store_range(&query, &folder, &split_options, &options)
        .into_diagnostic()?;

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_outcomes(&outcomes).into_diagnostic()?,
        OutputMode::Interactive => print_summary(&outcomes),
    }
    Ok(())
}

fn run_key(args: KeyArgs) -> miette::Result<()> {
    let query = load_query(&args.query)?;
    let key = query.cache_key().into_diagnostic()?;
    println!("{key}");
    Ok(())
}

fn build_app() -> miette::Result<App<AnalyticsHttpClient, GcsHttpClient>> {
    let analytics = AnalyticsHttpClient::new().into_diagnostic()?;
    let gcs = GcsHttpClient::new().into_diagnostic()?;
    Ok(App::new(analytics, UriStore::new(gcs)))
}

fn load_config(path: Option<&str>) -> miette::Result<ResolvedConfig> {
    if path.is_some() || Path::new(CONFIG_FILE).exists() {
        ConfigLoader::resolve(path).into_diagnostic()
    } else {
        Ok(ResolvedConfig::default())
    }
}

fn load_query(path: &str) -> miette::Result<Query> {
    let content = fs::read_to_string(path)
        .map_err(|err| GastoreError::Filesystem(format!("read query {path}: {err}")))
        .into_diagnostic()?;
    Query::from_json(&content).into_diagnostic()
}

fn resolve_folder(flag: Option<&str>, config: &ResolvedConfig) -> miette::Result<String> {
    if let Some(folder) = flag {
        return Ok(folder.to_string());
    }
    if let Some(folder) = &config.folder_uri {
        return Ok(folder.clone());
    }
    let base = BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".cache").join("gastore"))
        .ok_or_else(|| GastoreError::Filesystem("unable to resolve cache directory".to_string()))
        .into_diagnostic()?;
    Ok(format!("file://{}", base.display()))
}

fn build_store_options(args: &StoreArgs, config: &ResolvedConfig) -> StoreOptions {
    let mut options = StoreOptions {
        format: args.format.unwrap_or(config.format),
        delimiter: args.delimiter.unwrap_or(config.delimiter),
        only_golden: if args.allow_non_golden {
            false
        } else {
            config.only_golden
        },
        non_golden_folder_uri: args
            .non_golden_folder
            .clone()
            .or_else(|| config.non_golden_folder_uri.clone()),
        ..StoreOptions::default()
    };
    options.fetch.max_retries = args.retries.unwrap_or(config.max_retries);
    options.fetch.page_size = args.page_size.or(config.page_size);
    options.fetch.sampling_level = args
        .sampling_level
        .clone()
        .or_else(|| config.sampling_level.clone());
    options
}

fn print_summary(outcomes: &[StoreOutcome]) {
    let green = "\x1b[32m";
    let cyan = "\x1b[36m";
    let yellow = "\x1b[33m";
    let reset = "\x1b[0m";

    for outcome in outcomes {
        let (label, color) = match outcome.action {
            gastore::app::StoreAction::Cached => ("cached", green),
            gastore::app::StoreAction::Written => ("written", cyan),
        };
        println!("{color}{label:>7}{reset} {}", outcome.uri);
        if outcome.is_data_golden == Some(false) {
            println!("{yellow}        non-golden data{reset}");
        }
    }
}
