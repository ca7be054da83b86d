mod cli;

use assetforge::assets::{AssetService, AssetStorage};
use assetforge::compression::{
    events, CompressionError, CompressionService, FfmpegTranscoder, LocalFilesystem,
    RecoveryReport, SqliteCatalog,
};
use assetforge::config::{self, Config};
use assetforge_common::AssetId;
use assetforge_db::pool::init_pool;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, TagCommands};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// Everything a command needs, wired from the configuration.
struct App {
    config: Config,
    compression: Arc<CompressionService>,
    assets: AssetService,
}

impl App {
    fn open(config: Config) -> Result<Self> {
        let assets_dir = &config.storage.assets_dir;
        std::fs::create_dir_all(assets_dir)
            .with_context(|| format!("Failed to create assets directory: {:?}", assets_dir))?;
        let assets_dir = std::fs::canonicalize(assets_dir)
            .with_context(|| format!("Failed to resolve assets directory: {:?}", assets_dir))?;

        let db_path = &config.storage.database_path;
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }
        tracing::info!("Opening catalog at {}", db_path.display());
        let pool = init_pool(&db_path.to_string_lossy())
            .with_context(|| format!("Failed to open database: {:?}", db_path))?;

        let compression = Arc::new(CompressionService::with_events(
            config.compression.clone(),
            assets_dir.clone(),
            Arc::new(SqliteCatalog::new(pool.clone())),
            Arc::new(FfmpegTranscoder::new(&config.compression)),
            Arc::new(LocalFilesystem),
            events::channel(),
        ));

        let assets = AssetService::new(
            pool.clone(),
            AssetStorage::new(assets_dir),
            config.upload.max_upload_bytes,
        )
        .with_compression(Arc::clone(&compression));

        Ok(Self {
            config,
            compression,
            assets,
        })
    }

    /// Run recovery unless another process holds the store lock.
    ///
    /// Returns `None` when the store is locked.
    fn recover(&self) -> Result<Option<RecoveryReport>> {
        let report = match self.compression.recover() {
            Ok(report) => report,
            Err(CompressionError::StoreLocked(lock)) => {
                tracing::debug!(lock = %lock.display(), "Store lock held elsewhere");
                return Ok(None);
            }
            Err(e) => return Err(e).context("Startup recovery failed"),
        };
        if report.is_clean() {
            tracing::debug!("Startup recovery found nothing to do");
        } else {
            tracing::info!(?report, "Startup recovery finished");
        }
        Ok(Some(report))
    }

    /// Recover and start workers for a one-shot command.
    ///
    /// When another process holds the store, new jobs are left pending for
    /// it and `false` is returned.
    fn start_workers(&self) -> Result<bool> {
        if self.recover()?.is_none() {
            eprintln!(
                "Store is in use by another assetforge process; compression is left to it"
            );
            return Ok(false);
        }
        self.spawn_event_logger();
        Ok(self.compression.start())
    }

    /// One line per asset with the state of its latest compression job.
    fn print_states(&self, ids: &[AssetId]) -> Result<()> {
        for &id in ids {
            let details = self.assets.get(id)?;
            let asset = &details.asset;
            let state = match self.assets.jobs(id)?.first() {
                None => "stored".to_string(),
                Some(job) => match (&job.error, asset.compression_ratio) {
                    (Some(error), _) => format!("{} ({})", job.status, error),
                    (None, Some(ratio)) => format!("{} (ratio {:.2})", job.status, ratio),
                    (None, None) => job.status.to_string(),
                },
            };
            println!("{}  {}  {}  {}", asset.id, asset.original_name, asset.file_kind, state);
        }
        Ok(())
    }

    /// Log job events until the channel closes.
    fn spawn_event_logger(&self) {
        let Some(mut rx) = self.compression.subscribe() else {
            return;
        };
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => tracing::debug!(?event, "Job event"),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Job event logger fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}

async fn start(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let app = App::open(config)?;

    tracing::info!("Starting assetforge");
    if app.recover()?.is_none() {
        anyhow::bail!(
            "Another assetforge process is already running on {}",
            app.config.storage.assets_dir.display()
        );
    }
    app.spawn_event_logger();

    let mut sweep = None;
    if app.compression.start() {
        let requeued = app
            .compression
            .reconcile()
            .context("Failed to re-queue pending jobs")?;
        sweep = app
            .config
            .compression
            .reconcile_interval()
            .map(|period| app.compression.spawn_reconcile_sweep(period));
        tracing::info!(
            workers = app.config.compression.worker_count,
            requeued,
            "Compression workers running; press Ctrl-C to stop"
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down...");
    if let Some(handle) = sweep {
        handle.abort();
    }
    app.compression.shutdown().await;
    Ok(())
}

async fn ingest(files: &[PathBuf], tags: &[String], config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let app = App::open(config)?;
    app.start_workers()?;

    let mut uploaded = Vec::new();
    let mut failed = 0usize;
    for file in files {
        match app.assets.upload(file, tags) {
            Ok(details) => uploaded.push(details.asset.id),
            Err(e) => {
                eprintln!("✗ {}: {}", file.display(), e);
                failed += 1;
            }
        }
    }

    app.compression.drain().await;
    app.print_states(&uploaded)?;

    if failed > 0 {
        anyhow::bail!("{} of {} files failed to ingest", failed, files.len());
    }
    Ok(())
}

async fn compress(asset_ids: &[String], config_path: Option<&Path>) -> Result<()> {
    let ids = parse_asset_ids(asset_ids)?;
    let config = config::load_config_or_default(config_path)?;
    let app = App::open(config)?;
    let workers = app.start_workers()?;

    let mut queued = Vec::new();
    let mut failed = 0usize;
    for &id in &ids {
        match app.assets.compress(id) {
            Ok(_) => queued.push(id),
            // Pending for the process holding the store
            Err(CompressionError::QueueClosed) if !workers => queued.push(id),
            Err(e) => {
                eprintln!("✗ {}: {}", id, e);
                failed += 1;
            }
        }
    }

    app.compression.drain().await;
    app.print_states(&queued)?;

    if failed > 0 {
        anyhow::bail!("{} of {} assets could not be queued", failed, ids.len());
    }
    Ok(())
}

fn list(tags: &[String], limit: i64, offset: i64, config_path: Option<&Path>) -> Result<()> {
    let app = App::open(config::load_config_or_default(config_path)?)?;
    let assets = app.assets.list(offset, limit, tags)?;
    if assets.is_empty() {
        println!("No assets");
        return Ok(());
    }

    for asset in assets {
        let compressed = match asset.compression_ratio {
            Some(ratio) if asset.is_compressed => format!("compressed (ratio {:.2})", ratio),
            _ => "original".to_string(),
        };
        println!(
            "{}  {}  {}  {} bytes  {}",
            asset.id, asset.original_name, asset.file_kind, asset.size_bytes, compressed
        );
    }
    Ok(())
}

fn delete(asset_ids: &[String], config_path: Option<&Path>) -> Result<()> {
    let ids = parse_asset_ids(asset_ids)?;
    let app = App::open(config::load_config_or_default(config_path)?)?;
    let deleted = app.assets.delete_many(&ids)?;

    for id in &ids {
        if deleted.contains(id) {
            println!("Deleted {}", id);
        } else {
            eprintln!("✗ {}: not found", id);
        }
    }

    let missing = ids.len() - deleted.len();
    if missing > 0 {
        anyhow::bail!("{} of {} assets were not found", missing, ids.len());
    }
    Ok(())
}

fn tags(command: TagCommands, config_path: Option<&Path>) -> Result<()> {
    let app = App::open(config::load_config_or_default(config_path)?)?;

    match command {
        TagCommands::List => {
            let tags = app.assets.tags()?;
            if tags.is_empty() {
                println!("No tags");
            }
            for tag in tags {
                println!("{}  {}", tag.name, tag.color);
            }
        }
        TagCommands::Add { name, color } => {
            let tag = app.assets.create_tag(&name, &color)?;
            println!("Created tag {} ({})", tag.name, tag.color);
        }
        TagCommands::Attach { name, asset_ids } => {
            let ids = parse_asset_ids(&asset_ids)?;
            let attached = app.assets.tag_assets(&name, &ids)?;
            println!("Tagged {} of {} assets with {}", attached, ids.len(), name);
        }
        TagCommands::Untag { asset_id, name } => {
            let id = parse_asset_id(&asset_id)?;
            if app.assets.untag(id, &name)? {
                println!("Removed {} from {}", name, id);
            } else {
                println!("{} is not tagged {}", id, name);
            }
        }
        TagCommands::Delete { name } => {
            let deleted = app.assets.delete_tag(&name)?;
            for id in &deleted {
                println!("Deleted {}", id);
            }
            println!("Deleted tag {} and {} assets", name, deleted.len());
        }
    }
    Ok(())
}

fn parse_asset_id(raw: &str) -> Result<AssetId> {
    raw.parse()
        .with_context(|| format!("Invalid asset id: {}", raw))
}

fn parse_asset_ids(raw: &[String]) -> Result<Vec<AssetId>> {
    raw.iter().map(|r| parse_asset_id(r)).collect()
}

fn show(asset_id: &str, json: bool, config_path: Option<&Path>) -> Result<()> {
    let id = parse_asset_id(asset_id)?;
    let app = App::open(config::load_config_or_default(config_path)?)?;
    let details = app.assets.get(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&details)?);
        return Ok(());
    }

    let asset = &details.asset;
    println!("Asset: {}", asset.id);
    println!("Name: {}", asset.original_name);
    println!("Kind: {}", asset.file_kind);
    println!("Size: {} bytes", asset.size_bytes);
    println!("Path: {}", asset.storage_path);
    println!("Compressed: {}", if asset.is_compressed { "yes" } else { "no" });
    if let Some(ratio) = asset.compression_ratio {
        println!("Compression ratio: {:.2}", ratio);
    }
    if let Some(ref backup) = asset.backup_path {
        println!("Original: {}", backup);
    }
    println!("Created: {}", asset.created_at);
    let tags: Vec<&str> = details.tags.iter().map(|t| t.name.as_str()).collect();
    println!("Tags: {}", if tags.is_empty() { "-".to_string() } else { tags.join(", ") });

    Ok(())
}

fn jobs(asset_id: &str, config_path: Option<&Path>) -> Result<()> {
    let id = parse_asset_id(asset_id)?;
    let app = App::open(config::load_config_or_default(config_path)?)?;
    // Distinguish an unknown asset from one with no history
    app.assets.get(id)?;

    let jobs = app.assets.jobs(id)?;
    if jobs.is_empty() {
        println!("No compression jobs for {}", id);
        return Ok(());
    }

    for job in jobs {
        print!("{}  {:<10}  {:>3}%  created {}", job.id, job.status, job.progress, job.created_at);
        if let Some(ref completed) = job.completed_at {
            print!("  finished {}", completed);
        }
        if let Some(ref error) = job.error {
            print!("  error: {}", error);
        }
        println!();
    }
    Ok(())
}

fn recover(config_path: Option<&Path>) -> Result<()> {
    let app = App::open(config::load_config_or_default(config_path)?)?;
    let Some(report) = app.recover()? else {
        anyhow::bail!(
            "Store is in use by another assetforge process; stop it before running recover"
        );
    };

    println!("Swaps committed:      {}", report.swaps_committed);
    println!("Swaps rolled forward: {}", report.swaps_rolled_forward);
    println!("Swaps rolled back:    {}", report.swaps_rolled_back);
    println!("Swaps unresolved:     {}", report.swaps_unresolved);
    println!("Orphaned jobs failed: {}", report.orphaned_jobs_failed);
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    println!("Checking external tools...\n");

    let ffmpeg = &config.compression.ffmpeg_path;
    let available = match which::which(ffmpeg) {
        Ok(path) => {
            println!("✓ ffmpeg - {}", path.display());
            true
        }
        Err(_) => {
            println!("✗ ffmpeg ({})", ffmpeg.display());
            false
        }
    };

    println!();
    if available {
        println!("All required tools are available!");
    } else if config.compression.enabled {
        println!("ffmpeg is missing. Install it or set FFMPEG_PATH; compression jobs will fail.");
    } else {
        println!("ffmpeg is missing, but compression is disabled.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            config::load_config_or_default(None)?
        }
    };

    let c = &config.compression;
    println!("✓ Configuration is valid");
    println!("  Assets dir: {}", config.storage.assets_dir.display());
    println!("  Database: {}", config.storage.database_path.display());
    println!("  Max upload: {} bytes", config.upload.max_upload_bytes);
    println!("  Compression enabled: {}", c.enabled);
    println!("    Workers: {}", c.worker_count);
    println!("    Queue capacity: {}", c.queue_capacity);
    println!("    Image quality: {}", c.image_quality);
    println!("    Persistence failure: {:?}", c.persistence_failure);
    match c.reconcile_interval() {
        Some(interval) => println!("    Reconcile sweep: every {}s", interval.as_secs()),
        None => println!("    Reconcile sweep: startup only"),
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "assetforge=trace,assetforge_db=debug,assetforge_common=debug".to_string()
        } else {
            "assetforge=info,assetforge_db=info".to_string()
        }
    });

    // Logs go to stderr; stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start(cli.config.as_deref()))
        }
        Commands::Ingest { files, tags } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(ingest(&files, &tags, cli.config.as_deref()))
        }
        Commands::Compress { asset_ids } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(compress(&asset_ids, cli.config.as_deref()))
        }
        Commands::List {
            tags: tag_names,
            limit,
            offset,
        } => list(&tag_names, limit, offset, cli.config.as_deref()),
        Commands::Delete { asset_ids } => delete(&asset_ids, cli.config.as_deref()),
        Commands::Tags { command } => tags(command, cli.config.as_deref()),
        Commands::Show { asset_id, json } => show(&asset_id, json, cli.config.as_deref()),
        Commands::Jobs { asset_id } => jobs(&asset_id, cli.config.as_deref()),
        Commands::Recover => recover(cli.config.as_deref()),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("assetforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
