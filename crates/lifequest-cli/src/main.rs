//! # lifequest
//!
//! Command-line driver for the offline cache worker, plus settings
//! inspection.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lifequest_cache::{
    CacheStorage, DiskCacheStorage, Fetcher, HttpFetcher, Request, ServiceWorker, WorkerConfig,
};
use lifequest_settings::{LifeQuestSettings, expand_home, load_settings_from_path, settings_path};

/// LifeQuest command-line tool.
#[derive(Parser, Debug)]
#[command(name = "lifequest", version, about = "LifeQuest offline cache and settings tool")]
struct Cli {
    /// Settings file (defaults to `~/.lifequest/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Offline cache operations.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Settings inspection.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Fetch the manifest into the current cache generation.
    Install,
    /// Delete every cache generation except the current one.
    Activate,
    /// Answer a request cache-first.
    Fetch {
        /// Absolute URL, or a path relative to the configured scope.
        url: String,
    },
    /// List cache generations, or the URLs in one of them.
    List {
        /// Cache to list entries of.
        name: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print the effective settings as JSON.
    Show,
}

fn load(path: Option<&PathBuf>) -> Result<LifeQuestSettings> {
    let path = path.cloned().unwrap_or_else(settings_path);
    load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn init_logging(cli: &Cli, settings: &LifeQuestSettings) {
    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    if cli.json_logs || settings.logging.json {
        lifequest_core::logging::init_json_subscriber(level);
    } else {
        lifequest_core::logging::init_subscriber(level);
    }
}

fn build_worker(settings: &LifeQuestSettings) -> Result<(ServiceWorker, Arc<DiskCacheStorage>)> {
    let storage = Arc::new(DiskCacheStorage::new(expand_home(&settings.cache.storage_dir)));
    let fetcher: Arc<dyn Fetcher> =
        Arc::new(HttpFetcher::with_timeout_ms(settings.cache.request_timeout_ms));
    let worker = ServiceWorker::new(
        WorkerConfig::from_settings(&settings.cache),
        Arc::clone(&storage) as Arc<dyn CacheStorage>,
        fetcher,
    )
    .context("Invalid cache scope")?;
    Ok((worker, storage))
}

async fn run_cache(action: CacheAction, settings: &LifeQuestSettings) -> Result<()> {
    let (worker, storage) = build_worker(settings)?;
    match action {
        CacheAction::Install => {
            let count = worker.on_install().await.context("Install failed")?;
            println!("installed {count} entries into {}", worker.cache_name());
        }
        CacheAction::Activate => {
            let deleted = worker.on_activate().await.context("Activation failed")?;
            if deleted.is_empty() {
                println!("no stale caches");
            }
            for name in deleted {
                println!("deleted {name}");
            }
        }
        CacheAction::Fetch { url } => {
            let url = worker.resolve(&url)?;
            let served = worker
                .on_fetch(&Request::get(url.as_str())?)
                .await
                .with_context(|| format!("Failed to fetch {url}"))?;
            tracing::info!(source = ?served.source, status = served.response.status, "served");
            println!("{}", served.response.text());
        }
        CacheAction::List { name: None } => {
            for name in storage.keys().await.context("Failed to list caches")? {
                let marker = if name == worker.cache_name() { "*" } else { " " };
                println!("{marker} {name}");
            }
        }
        CacheAction::List { name: Some(name) } => {
            for url in storage
                .urls(&name)
                .await
                .with_context(|| format!("Failed to list {name}"))?
            {
                println!("{url}");
            }
        }
    }
    Ok(())
}

fn run_settings(action: &SettingsAction, settings: &LifeQuestSettings) -> Result<()> {
    match action {
        SettingsAction::Show => {
            let json = serde_json::to_string_pretty(settings)?;
            println!("{json}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(cli.settings.as_ref())?;
    init_logging(&cli, &settings);

    match cli.command {
        Command::Cache { action } => run_cache(action, &settings).await,
        Command::Settings { action } => run_settings(&action, &settings),
    }
}
