use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use podqueue::archive::run_archive;
use podqueue::config::{
    default_config_path, FileConfig, LoadedConfig, OpmlSource, RunConfig, DEFAULT_LOG_FILE,
};
use podqueue::feed;

#[derive(Parser, Debug)]
#[command(
    name = "podqueue",
    version,
    about = "Archive podcast audio and metadata from an OPML subscription list"
)]
struct Args {
    /// OPML file containing a podcast subscription list (`-` reads stdin)
    #[arg(short, long, value_name = "FILE")]
    opml: Option<PathBuf>,

    /// Destination folder for downloads; created if required, with one
    /// sub-directory per podcast
    #[arg(short, long, value_name = "DIR")]
    dest: Option<PathBuf>,

    /// strftime pattern for episode timestamps (default: %Y-%m-%d)
    #[arg(short, long, alias = "time_format", value_name = "FORMAT")]
    time_format: Option<String>,

    /// Print progress to stderr; without it only warnings and errors are logged
    #[arg(short, long)]
    verbose: bool,

    /// Log file path (default: ./podqueue.log)
    #[arg(long, alias = "log_file", value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Config file (default: ~/.config/podqueue/config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Args {
    fn settings(&self) -> FileConfig {
        FileConfig {
            opml: self.opml.clone(),
            dest: self.dest.clone(),
            time_format: self.time_format.clone(),
            verbose: self.verbose.then_some(true),
            log_file: self.log_file.clone(),
        }
    }
}

/// Always log to the append-mode log file; also to stderr when verbose.
fn init_logging(log_file: &Path, verbose: bool) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file: {}", log_file.display()))?;

    let level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,podqueue={}", level)));

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file));
    let stderr_layer = verbose.then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(())
}

async fn read_feed_urls(source: &OpmlSource) -> Result<Vec<String>> {
    let feeds = match source {
        OpmlSource::Path(path) => feed::parse(path)
            .await
            .with_context(|| format!("Failed to parse OPML file: {}", path.display()))?,
        OpmlSource::Stdin => {
            feed::parse_reader(std::io::stdin().lock()).context("Failed to parse OPML from stdin")?
        }
    };
    Ok(feeds)
}

async fn run(config: &RunConfig) -> Result<()> {
    tokio::fs::create_dir_all(&config.dest)
        .await
        .with_context(|| format!("Failed to create destination: {}", config.dest.display()))?;

    let feeds = read_feed_urls(&config.opml).await?;
    if feeds.is_empty() {
        tracing::warn!("No RSS feeds found in OPML");
        return Ok(());
    }

    let client = reqwest::Client::builder()
        .user_agent(concat!("podqueue/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    run_archive(&client, config, &feeds).await;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let loaded = match &config_path {
        Some(path) => FileConfig::load(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => LoadedConfig::default(),
    };
    let settings = loaded.settings.clone().merge(args.settings());

    let log_file = settings
        .log_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
    init_logging(&log_file, settings.verbose.unwrap_or(false))?;
    tracing::info!("----- ----- Initialising ----- -----");
    if let Some(path) = &config_path {
        loaded.report(path);
    }

    let config = match RunConfig::resolve(settings) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    if let Err(e) = run(&config).await {
        tracing::error!(error = %format!("{:#}", e), "Run aborted");
        return Err(e);
    }

    Ok(())
}
