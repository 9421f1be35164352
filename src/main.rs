//! Podium Leaderboard Service
//!
//! Standalone ranking service over an in-memory Score Store seeded from a
//! JSON or YAML file.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Podium Service                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │    Score     │───▶│ Leaderboard  │───▶│     HTTP     │       │
//! │  │    Store     │    │    Engine    │    │    Server    │       │
//! │  │   (seeded)   │    │ (cache tier) │    │   (hyper)    │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use podium::adapters::{InMemoryScoreStore, LoggingEventPublisher};
use podium::engine::{EngineConfig, LeaderboardEngine};
use podium::error::{Error, Result};
use podium::server;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Podium - cache-resident leaderboard service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP bind address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: String,

    /// Page cache time-to-live in seconds
    #[arg(long, env = "PAGE_TTL_SECONDS", default_value = "300")]
    page_ttl_seconds: u64,

    /// Largest accepted page size
    #[arg(long, env = "MAX_PAGE_SIZE", default_value = "100")]
    max_page_size: u64,

    /// Page size when the request gives none
    #[arg(long, env = "DEFAULT_PAGE_SIZE", default_value = "10")]
    default_page_size: u64,

    /// Request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECONDS", default_value = "10")]
    request_timeout_seconds: u64,

    /// Concurrent derived-count lookups during a rebuild
    #[arg(long, env = "REBUILD_CONCURRENCY", default_value = "16")]
    rebuild_concurrency: usize,

    /// Score seed file (.json, .yaml or .yml)
    #[arg(long, env = "SEED_FILE")]
    seed_file: Option<PathBuf>,

    /// Do not rebuild the index on startup
    #[arg(long, env = "SKIP_STARTUP_REBUILD")]
    skip_startup_rebuild: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            page_ttl: Duration::from_secs(self.page_ttl_seconds),
            max_page_size: self.max_page_size,
            default_page_size: self.default_page_size,
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            rebuild_concurrency: self.rebuild_concurrency,
            rebuild_on_open: !self.skip_startup_rebuild,
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("Starting Podium leaderboard service");
    info!("  Listen address: {}", args.listen_addr);
    info!("  Page TTL: {} seconds", args.page_ttl_seconds);
    info!(
        "  Page size: default {}, max {}",
        args.default_page_size, args.max_page_size
    );
    info!("  Request timeout: {} seconds", args.request_timeout_seconds);

    let store = match &args.seed_file {
        Some(path) => InMemoryScoreStore::from_seed_file(path).await.map_err(|e| {
            error!("Failed to load seed file {}: {}", path.display(), e);
            e
        })?,
        None => {
            warn!("No seed file given, starting with an empty score store");
            InMemoryScoreStore::new()
        }
    };

    let engine = LeaderboardEngine::builder(Arc::new(store))
        .config(args.engine_config())
        .publisher(Arc::new(LoggingEventPublisher::at_level(Level::INFO)))
        .build()?;
    let engine = Arc::new(engine);

    // Rebuilds before any traffic is accepted when the index is empty.
    if let Some(report) = engine.open().await? {
        info!(
            "Startup rebuild: {} processed, {} added, {} failed",
            report.processed, report.added, report.failed
        );
    }

    let listener = server::bind(&args.listen_addr).await?;
    let shutdown = CancellationToken::new();

    let server_handle = tokio::spawn(server::serve(
        listener,
        Arc::clone(&engine),
        shutdown.clone(),
    ));

    // Page cache janitor
    let janitor_engine = Arc::clone(&engine);
    let janitor_shutdown = shutdown.clone();
    let purge_every = engine.config().page_ttl.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_every);
        loop {
            tokio::select! {
                _ = janitor_shutdown.cancelled() => break,
                _ = interval.tick() => {
                    match janitor_engine.purge_expired_pages() {
                        Ok(0) => {}
                        Ok(purged) => debug!("Purged {} expired pages", purged),
                        Err(e) => debug!("Skipped page purge: {}", e),
                    }
                }
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::Internal(format!("Failed to listen for shutdown signal: {}", e)))?;
    info!("Shutdown signal received");

    shutdown.cancel();
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Server error: {}", e),
        Err(e) => error!("Server task failed: {}", e),
    }

    engine.close().await;
    info!("Podium shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let hyper_directive = "hyper=warn"
        .parse::<Directive>()
        .map_err(|e| Error::Config(format!("Invalid log directive: {}", e)))?;

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive(hyper_directive);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }

    Ok(())
}
