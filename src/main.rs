//! Binary entry point for simple-crud.
//!
//! This binary provides the CLI interface for the todo server.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use simple_crud::api;
use simple_crud::observability::{self, InitOptions, MetricsHandle};
use simple_crud::services::{BackendFactory, INITIAL_CONNECT_TIMEOUT};
use simple_crud::{ActiveBackend, AppConfig, FallbackPolicy};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::watch;

/// Simple CRUD - a minimal todo-list backend.
#[derive(Parser)]
#[command(name = "simple-crud")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server.
    Serve(ServeArgs),

    /// Print the effective configuration.
    Config(ServeArgs),
}

/// Flags that override configuration.
#[derive(Args, Default)]
struct ServeArgs {
    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(long)]
    database_url: Option<String>,

    /// Directory with the frontend files.
    #[arg(long)]
    public_dir: Option<PathBuf>,

    /// Reject API calls while the database is unreachable instead of
    /// serving from memory.
    #[arg(long)]
    require_persistent: bool,
}

impl ServeArgs {
    fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(url) = &self.database_url {
            config = config.with_database_url(url.as_str());
        }
        if let Some(dir) = &self.public_dir {
            config = config.with_public_dir(dir.as_path());
        }
        if self.require_persistent {
            config = config.with_fallback(FallbackPolicy::Disabled);
        }
        config
    }
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let (config, warnings) = match AppConfig::load(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let (config, serve) = match &cli.command {
        Commands::Serve(args) => (args.apply(config), true),
        Commands::Config(args) => (args.apply(config), false),
    };

    if !serve {
        for warning in &warnings {
            eprintln!("Warning: {warning}");
        }
        return match config.to_toml_string() {
            Ok(text) => {
                print!("{text}");
                ExitCode::SUCCESS
            },
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            },
        };
    }

    let observability = match observability::init_from_config(
        &config.observability,
        InitOptions {
            verbose: cli.verbose,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };
    observability::install_panic_hook();
    for warning in &warnings {
        tracing::warn!("{warning}");
    }

    match run_server(config, observability.metrics().cloned()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "Server failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Connects the stores and serves HTTP until a shutdown signal arrives.
async fn run_server(config: AppConfig, metrics: Option<MetricsHandle>) -> anyhow::Result<()> {
    let backends = BackendFactory::create_all(&config);

    if backends.connect(INITIAL_CONNECT_TIMEOUT).await {
        tracing::info!("Connected to PostgreSQL");
    } else if backends.has_persistent() {
        tracing::warn!("PostgreSQL unreachable at startup; will keep retrying");
    }

    let service = backends.service();
    match service.active_backend() {
        ActiveBackend::Persistent => tracing::info!("Serving todos from PostgreSQL"),
        ActiveBackend::Memory => {
            tracing::warn!("Serving todos from the in-memory store; records are lost on exit");
        },
        ActiveBackend::Unavailable => {
            tracing::warn!("Fallback disabled; API calls fail until PostgreSQL is reachable");
        },
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = backends.spawn_monitor(shutdown_rx);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        port = config.port,
        public_dir = %config.public_dir.display(),
        fallback = %config.fallback,
        "Server running"
    );
    tracing::info!("App available at: http://localhost:{}", config.port);
    tracing::info!("Health check at: http://localhost:{}/health", config.port);

    let state = api::AppState::new(service).with_metrics(metrics);
    let app = api::app(state, &config.public_dir);
    api::serve(listener, app, shutdown_signal()).await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = monitor {
        handle.await.context("connection monitor task failed")?;
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
