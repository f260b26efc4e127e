//! settings-sync CLI
//!
//! Inspect and edit a file-backed settings store, and watch it for changes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         settings-sync                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────────┐    ┌──────────────┐   │
//! │  │  FileStore   │───▶│ SettingsManager  │───▶│   Logging    │   │
//! │  │ (json/yaml)  │    │  refresh loop    │    │  publisher   │   │
//! │  └──────────────┘    └──────────────────┘    └──────────────┘   │
//! │                               │                                  │
//! │                               ▼                                  │
//! │                        /metrics (hyper)                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use settings_sync::adapters::{FileStore, LoggingEventPublisher};
use settings_sync::{ManagerConfig, Row, SettingsManager, SettingsStore};

// =============================================================================
// CLI Arguments
// =============================================================================

/// settings-sync - Typed, cached settings with incremental refresh
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (.json, .yaml or .yml)
    #[arg(long, env = "SETTINGS_STORE", default_value = "settings.json")]
    store: PathBuf,

    /// Never write to the settings file
    #[arg(long, env = "SETTINGS_READ_ONLY")]
    read_only: bool,

    /// Refresh interval in seconds
    #[arg(long, env = "REFRESH_INTERVAL_SECONDS", default_value = "30")]
    refresh_interval_seconds: u64,

    /// Seconds a repeated failure is reported at debug level only
    #[arg(long, env = "REPEATING_ERROR_WINDOW_SECONDS", default_value = "90")]
    repeating_error_window_seconds: u64,

    /// Metrics server bind address (disabled when unset)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every row of a category
    List { category: String },

    /// Write one row
    Set {
        category: String,
        name: String,
        /// Stored text; use --null for a missing value
        #[arg(required_unless_present = "null")]
        value: Option<String>,
        /// Store a null value
        #[arg(long, conflicts_with = "value")]
        null: bool,
    },

    /// Print whether a flag is set
    Flag { name: String },

    /// Refresh until Ctrl-C, logging every change
    Watch,
}

impl Args {
    fn manager_config(&self) -> ManagerConfig {
        ManagerConfig::default()
            .with_refresh_interval(Duration::from_secs(self.refresh_interval_seconds))
            .with_repeating_error_window(Duration::from_secs(self.repeating_error_window_seconds))
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let store = Arc::new(FileStore::new(&args.store).read_only(args.read_only));
    info!(path = %args.store.display(), format = ?store.format(), "Using settings store");

    match &args.command {
        Command::List { category } => {
            let rows = store
                .read_category(category)
                .await
                .with_context(|| format!("reading category {}", category))?;
            for row in rows {
                println!(
                    "{} = {} ({})",
                    row.name,
                    row.value.as_deref().unwrap_or("<null>"),
                    row.updated_at.to_rfc3339()
                );
            }
        }
        Command::Set {
            category,
            name,
            value,
            null,
        } => {
            if store.is_read_only() {
                warn!(category = %category, name = %name, "Store is read-only, write ignored");
                println!("{}", write_outcome(true, false));
                return Ok(());
            }
            let value = if *null { None } else { value.clone() };
            let row = Row::new(category.as_str(), name.as_str(), value, chrono::Utc::now());
            let inserted = store
                .write_row(row)
                .await
                .with_context(|| format!("writing {}.{}", category, name))?;
            println!("{}", write_outcome(false, inserted));
        }
        Command::Flag { name } => {
            let manager = SettingsManager::new(store.clone())?.with_config(args.manager_config());
            let set = manager.is_flag_set(name).await?;
            println!("{}", set);
        }
        Command::Watch => watch(&args, store).await?,
    }

    Ok(())
}

fn write_outcome(read_only: bool, inserted: bool) -> &'static str {
    match (read_only, inserted) {
        (true, _) => "ignored (read-only store)",
        (false, true) => "inserted",
        (false, false) => "updated",
    }
}

async fn watch(args: &Args, store: Arc<FileStore>) -> Result<()> {
    let manager = Arc::new(
        SettingsManager::new(store)?
            .with_config(args.manager_config())
            .with_publisher(Arc::new(LoggingEventPublisher::info_level())),
    );

    if let Some(addr) = args.metrics_addr.clone() {
        let registry = manager.metrics().registry().clone();
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(&addr, registry).await {
                error!("Metrics server error: {:#}", e);
            }
        });
    }

    let token = CancellationToken::new();
    let refresh = manager.spawn_refresh_loop(token.clone());
    info!(
        interval = ?manager.config().refresh_interval,
        "Watching settings, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Shutting down");
    token.cancel();
    refresh.await.context("refresh loop panicked")?;

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

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?);

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

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, registry: Registry) -> Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use prometheus::{Encoder, TextEncoder, TEXT_FORMAT};
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn metrics_handler(
        req: Request<hyper::body::Incoming>,
        registry: Registry,
    ) -> std::result::Result<Response<Full<Bytes>>, std::convert::Infallible> {
        if req.uri().path() != "/metrics" {
            let mut response = Response::new(Full::new(Bytes::from("not found")));
            *response.status_mut() = StatusCode::NOT_FOUND;
            return Ok(response);
        }

        let mut buffer = Vec::new();
        let response = match TextEncoder::new().encode(&registry.gather(), &mut buffer) {
            Ok(()) => {
                let mut response = Response::new(Full::new(Bytes::from(buffer)));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_FORMAT));
                response
            }
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                let mut response = Response::new(Full::new(Bytes::from("encoding error")));
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response
            }
        };
        Ok(response)
    }

    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid metrics server address {}", addr))?;

    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind metrics server")?;

    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .context("metrics server accept error")?;

        let io = TokioIo::new(stream);
        let registry = registry.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| metrics_handler(req, registry.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Metrics server connection error: {}", e);
            }
        });
    }
}
