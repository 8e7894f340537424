//! Cadence - resumable Substrate event processor.
//!
//! # Usage
//!
//! ```bash
//! # Apply migrations only
//! cadence migrate --env .env.production
//!
//! # Process from the persisted cursor
//! cadence run
//!
//! # Re-process from a given height with extra descriptor schemas
//! BLOCK_HEIGHT=120000 cadence run --entities 'entities/*.json'
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use cadence_core::error::IndexerError;
use cadence_core::metrics::init_metrics;
use cadence_core::query::{PageLimits, QueryEngine};
use cadence_core::services::{CursorManager, ProcessingRunner, RunnerConfig};
use cadence_mappings::{LoadedMappings, builtin_packs, load_descriptors};
use cadence_storage::{Database, DatabaseConfig, PgEntityStore};
use cadence_substrate::Endpoint;

/// Cadence CLI - Substrate event processor.
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(about = "Cadence - resumable Substrate event processor")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Extra environment file, loaded before `.env`.
    #[arg(long = "env", global = true, value_name = "FILE")]
    env_file: Option<PathBuf>,

    /// PostgreSQL database URL.
    #[arg(
        long,
        global = true,
        env = "DATABASE_URL",
        default_value = "postgres://localhost/cadence"
    )]
    database_url: String,

    /// Comma-separated mapping packs to enable.
    #[arg(
        long,
        global = true,
        env = "MAPPINGS",
        value_delimiter = ',',
        default_value = "balances"
    )]
    mappings: Vec<String>,

    /// Glob of JSON entity descriptors, relative to the working directory.
    #[arg(long, global = true, env = "ENTITIES_GLOB", value_name = "GLOB")]
    entities: Option<String>,

    /// Stream name the cursor is stored under.
    #[arg(long, global = true, env = "PROCESSOR_NAME", default_value = "cadence")]
    processor_name: String,

    /// Largest page a query may request.
    #[arg(
        long,
        global = true,
        env = "QUERY_MAX_LIMIT",
        default_value = "1000",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    query_max_limit: u32,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON log output.
    #[arg(long, global = true, env = "JSON_LOGS")]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply migrations, then process blocks until stopped.
    Run(RunArgs),
    /// Apply migrations and exit.
    Migrate,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Height to start from; 0 resumes from the persisted cursor.
    #[arg(long, env = "BLOCK_HEIGHT", default_value = "0")]
    height: u64,

    /// Stop after this height instead of following the chain.
    #[arg(long, env = "END_HEIGHT")]
    end_height: Option<u64>,

    /// Indexer endpoint: `http(s)://` for a Hydra indexer, `ws(s)://` for a node.
    #[arg(
        long,
        env = "INDEXER_ENDPOINT_URL",
        default_value = "http://localhost:4010/graphql"
    )]
    endpoint_url: String,

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9090")]
    metrics_port: u16,
}

impl RunArgs {
    /// `0` means "resume".
    fn requested_height(&self) -> Option<u64> {
        (self.height > 0).then_some(self.height)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = load_cli()?;
    init_tracing(&cli.global.log_level, cli.global.json_logs);

    // ─────────────────────────────────────────────────────────────────────────
    // 🚀 STARTUP
    // ─────────────────────────────────────────────────────────────────────────
    info!(processor = %cli.global.processor_name, "🚀 Starting Cadence");
    debug!(database_url = %mask_password(&cli.global.database_url), "Database endpoint");

    let mappings = load_mappings(&cli.global)?;

    // ─────────────────────────────────────────────────────────────────────────
    // 🗄️ DATABASE
    // ─────────────────────────────────────────────────────────────────────────
    info!("🗄️  Connecting to database...");
    let db_config =
        DatabaseConfig::for_processor(&cli.global.database_url, &cli.global.processor_name);
    let db = Database::connect(&db_config)
        .await
        .context("Failed to connect to database")?;
    let db = Arc::new(db);
    let store = Arc::new(PgEntityStore::new(db.clone()));
    let mut cursor = CursorManager::new(store, cli.global.processor_name.clone());

    let outcome = match &cli.command {
        Command::Migrate => migrate(&mut cursor, &mappings).await,
        Command::Run(args) => run(&cli.global, args, cursor, mappings).await,
    };

    db.close().await;
    outcome
}

/// Parse flags, load env files, then parse again so env fallbacks see them.
///
/// Neither file overrides variables already set in the process
/// environment; the `--env` file is loaded first and wins over `.env`.
fn load_cli() -> Result<Cli> {
    let first = Cli::parse();
    if let Some(path) = &first.global.env_file {
        dotenvy::from_path(path)
            .with_context(|| format!("Failed to load env file {}", path.display()))?;
    }
    dotenvy::dotenv().ok();
    Ok(Cli::parse())
}

fn load_mappings(global: &GlobalArgs) -> Result<LoadedMappings> {
    let mut packs = builtin_packs();
    packs
        .retain_named(global.mappings.as_slice())
        .context("Invalid --mappings")?;

    let descriptors = match &global.entities {
        Some(glob) => load_descriptors(".", glob).context("Failed to load entity descriptors")?,
        None => Vec::new(),
    };

    packs
        .load(descriptors)
        .context("Failed to load mapping packs")
}

async fn migrate(
    cursor: &mut CursorManager<PgEntityStore>,
    mappings: &LoadedMappings,
) -> Result<()> {
    let report = cursor
        .migrate(&mappings.migrations)
        .await
        .context("Failed to run migrations")?;

    for step in &report.applied {
        info!("   📦 Applied {}", step);
    }
    info!(
        applied = report.applied.len(),
        skipped = report.skipped,
        mismatched = report.mismatched.len(),
        "✅ Migrations complete"
    );
    Ok(())
}

async fn run(
    global: &GlobalArgs,
    args: &RunArgs,
    mut cursor: CursorManager<PgEntityStore>,
    mappings: LoadedMappings,
) -> Result<()> {
    let metrics_enabled = start_metrics(args.metrics_port);

    migrate(&mut cursor, &mappings).await?;

    // ─────────────────────────────────────────────────────────────────────────
    // 🔗 ENDPOINT
    // ─────────────────────────────────────────────────────────────────────────
    let endpoint = Endpoint::connect(&args.endpoint_url)
        .await
        .context("Failed to connect to indexer endpoint")?;
    info!(kind = ?endpoint.kind(), "🔗 Endpoint connected");

    let config = RunnerConfig {
        actor: global.processor_name.clone(),
        end_height: args.end_height,
        ..Default::default()
    };
    let mut runner = ProcessingRunner::new(
        config,
        Arc::new(endpoint),
        cursor,
        mappings.schemas,
        mappings.handlers,
        QueryEngine::new(PageLimits::with_max(global.query_max_limit)),
    );

    // ─────────────────────────────────────────────────────────────────────────
    // ⚡ PROCESSING
    // ─────────────────────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("🛑 Shutting down after the current block...");
        let _ = shutdown_tx.send(true);
    });

    info!("✅ Cadence ready");
    if metrics_enabled {
        info!("   📊 Metrics:  http://localhost:{}/metrics", args.metrics_port);
    } else {
        info!("   📊 Metrics:  disabled");
    }
    info!("   Press Ctrl+C to stop");

    match runner.run(args.requested_height(), shutdown_rx).await {
        Ok(last) => {
            info!(last_processed = last, "🛑 Processing complete");
            Ok(())
        }
        Err(IndexerError::ShutdownRequested) => {
            info!(
                last_processed = runner.cursor().last_processed(),
                "🛑 Shutdown complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "❌ Processor stopped");
            Err(e).context("Processing failed")
        }
    }
}

/// Prometheus exporter; failures don't stop the processor.
fn start_metrics(port: u16) -> bool {
    let addr = match format!("0.0.0.0:{port}").parse::<std::net::SocketAddr>() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("⚠️  Invalid metrics address: {}. Continuing without metrics.", e);
            return false;
        }
    };

    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            init_metrics();
            true
        }
        Err(e) => {
            warn!("⚠️  Failed to start metrics exporter: {}. Continuing without metrics.", e);
            false
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Mask password in database URL for logging.
fn mask_password(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
