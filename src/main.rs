use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

mod config;
mod error;
mod media;
mod pipeline;
mod retry;
mod server;
mod storage;

use config::Config;
use media::FetcherRegistry;
use pipeline::{Pipeline, Publisher};
use retry::RetryPolicy;
use storage::{ObjectStorage, S3Storage};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download, upload and print a JSON record for every URL
    Process {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Run the HTTP service
    Serve {
        /// Address to listen on, overrides the config file
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Check that the extraction tools are installed
    Check,
}

fn get_config_path(args: &Args) -> Option<String> {
    if let Some(path) = &args.config {
        return Some(path.clone());
    }

    if let Ok(path) = std::env::var("CONFIG_FILE") {
        return Some(path);
    }

    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        let config_path = format!("{}/reelpipe/config.toml", xdg_config_home);
        if std::path::Path::new(&config_path).exists() {
            return Some(config_path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let config_path = format!("{}/.config/reelpipe/config.toml", home.display());
        if std::path::Path::new(&config_path).exists() {
            return Some(config_path);
        }
    }

    None
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match get_config_path(args) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

fn build_pipeline(config: &Config, fetchers: FetcherRegistry) -> Result<Pipeline> {
    config.validate_storage()?;
    let storage: Arc<dyn ObjectStorage> =
        Arc::new(S3Storage::new(&config.storage).context("Failed to initialize object storage")?);

    let retry = RetryPolicy::new(&config.retry);
    let publisher = Publisher::new(
        storage,
        retry.clone(),
        Duration::from_secs(config.storage.presign_expiry_secs),
    );

    Ok(Pipeline::new(
        fetchers,
        publisher,
        retry,
        config.pipeline.max_concurrency,
        config.pipeline.scratch_dir.clone(),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    // stdout carries the JSON records, so logs go to stderr
    if config.get_logging_format() == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    info!("Starting reelpipe...");

    let fetchers =
        FetcherRegistry::from_config(&config).context("Failed to initialize media fetchers")?;

    match args.command {
        Command::Process { urls } => {
            let pipeline = build_pipeline(&config, fetchers)?;
            let records = pipeline.process_batch(&urls).await;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }

            if let Err(e) = fetchers.test_setup().await {
                warn!("Media fetcher test failed: {}", e);
            }

            let pipeline = match build_pipeline(&config, fetchers.clone()) {
                Ok(pipeline) => Some(Arc::new(pipeline)),
                Err(e) => {
                    warn!("Batch processing disabled: {:#}", e);
                    None
                }
            };

            let state = Arc::new(server::AppState {
                fetchers,
                pipeline,
                scratch_dir: config.pipeline.scratch_dir.clone(),
            });
            server::run(&config, state).await?;
        }
        Command::Check => {
            fetchers.test_setup().await?;
        }
    }

    Ok(())
}
