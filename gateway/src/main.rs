use clap::Parser;
use mimalloc::MiMalloc;
use std::fmt::Display;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

use survei_core::config::{Config, StoreKind};
use survei_core::endpoints::status::SURVEI_VERSION;
use survei_core::observability::{self, LogFormat};
use survei_core::routes::build_router;
use survei_core::storage::PhotoStorageKind;
use survei_core::utils::gateway::AppStateData;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the gateway config file. Incompatible with `--default-config`
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Use the default config: in-memory store, photo uploads disabled. Incompatible with `--config-file`
    #[arg(long)]
    default_config: bool,

    /// Socket address to listen on. Incompatible with `[gateway].bind_address`
    #[arg(long)]
    bind_address: Option<SocketAddr>,

    /// Sets the log format used for all gateway logs.
    #[arg(long)]
    #[arg(value_enum)]
    #[clap(default_value_t = LogFormat::default())]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    // Set up logs and metrics immediately, so that we can use `tracing`.
    observability::setup_logs(args.log_format).expect_pretty("Failed to set up logs");

    tracing::info!("Starting Survey Gateway {SURVEI_VERSION}");

    let metrics_handle = observability::setup_metrics().expect_pretty("Failed to set up metrics");

    if args.config_file.is_some() && args.default_config {
        tracing::error!("Cannot specify both `--config-file` and `--default-config`");
        std::process::exit(1);
    }

    let config = if let Some(path) = &args.config_file {
        Arc::new(
            Config::load_from_path(path)
                .ok() // Don't print the error here, since it was already printed when it was constructed
                .expect_pretty(&format!("Failed to load config file `{}`", path.display())),
        )
    } else {
        if !args.default_config {
            tracing::warn!(
                "No config file provided, so the default config will be used. Use `--config-file path/to/survei.toml` to specify a config file, or `--default-config` to silence this warning."
            );
        }
        Arc::new(Config::default())
    };

    let bind_address = match (args.bind_address, config.gateway.bind_address) {
        (Some(_), Some(_)) => {
            tracing::error!(
                "You must not specify both `--bind-address` and `[gateway].bind_address`"
            );
            std::process::exit(1);
        }
        (Some(bind_address), None) | (None, Some(bind_address)) => bind_address,
        // Default to 0.0.0.0:3000
        (None, None) => SocketAddr::from(([0, 0, 0, 0], 3000)),
    };

    let app_state = AppStateData::new(config.clone())
        .await
        .expect_pretty("Failed to initialize AppState");

    let router = build_router(app_state, Some(metrics_handle));

    let listener = match tokio::net::TcpListener::bind(bind_address).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == ErrorKind::AddrInUse => {
            tracing::error!(
                "Failed to bind to socket address {bind_address}: {e}. Tip: Ensure no other process is using port {} or try a different port.",
                bind_address.port()
            );
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("Failed to bind to socket address {bind_address}: {e}");
            std::process::exit(1);
        }
    };

    // This will give us the chosen port if the user specified a port of 0
    let actual_bind_address = listener
        .local_addr()
        .expect_pretty("Failed to get bind address from listener");

    tracing::info!("Survey Gateway is listening on {actual_bind_address}");

    match &args.config_file {
        Some(path) => tracing::info!("├ Configuration: {}", path.display()),
        None => tracing::info!("├ Configuration: default"),
    }

    let store_pretty = match config.store.kind {
        StoreKind::Postgrest => "PostgREST",
        StoreKind::Postgres => "Postgres",
        StoreKind::Memory => "in-memory",
    };
    tracing::info!(
        "├ Feedback Store: {store_pretty} (table: {})",
        config.store.table
    );

    match &config.photo_storage {
        PhotoStorageKind::S3Compatible { bucket_name, .. } => tracing::info!(
            "├ Photo Storage: S3-compatible (bucket: {})",
            bucket_name.as_deref().unwrap_or("from environment")
        ),
        PhotoStorageKind::Filesystem { path, .. } => {
            tracing::info!("├ Photo Storage: filesystem ({path})");
        }
        PhotoStorageKind::Disabled => tracing::info!("├ Photo Storage: disabled"),
    }

    tracing::info!(
        "└ Max Photo Size: {} bytes",
        config.gateway.max_photo_size_bytes
    );

    // Start the server
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect_pretty("Failed to start server");
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect_pretty("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect_pretty("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    #[cfg(unix)]
    let hangup = async {
        signal::unix::signal(signal::unix::SignalKind::hangup())
            .expect_pretty("Failed to install SIGHUP handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let hangup = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        }
        () = hangup => {
            tracing::info!("Received SIGHUP signal");
        }
    };
}

/// ┌──────────────────────────────────────────────────────────────────────────┐
/// │                           MAIN.RS ESCAPE HATCH                           │
/// └──────────────────────────────────────────────────────────────────────────┘
///
/// No panic, unwrap, or expect anywhere in the codebase, except for the private
/// `expect_pretty` method, which is only used in main.rs during startup.
/// Once the server is running, every error is handled gracefully.
///
/// `expect_pretty` logs the error message and exits with a status code of 1.
trait ExpectPretty<T> {
    fn expect_pretty(self, msg: &str) -> T;
}

impl<T, E: Display> ExpectPretty<T> for Result<T, E> {
    fn expect_pretty(self, msg: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::error!("{msg}: {err}");
                std::process::exit(1);
            }
        }
    }
}

impl<T> ExpectPretty<T> for Option<T> {
    fn expect_pretty(self, msg: &str) -> T {
        match self {
            Some(value) => value,
            None => {
                tracing::error!("{msg}");
                std::process::exit(1);
            }
        }
    }
}
