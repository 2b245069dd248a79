//! OnAir broadcast service (onair-bc) - Main entry point

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use onair_bc::audio::SoxTool;
use onair_bc::config::RadioConfig;
use onair_common::config::{default_config_path, load_toml_file, RootFolderResolver};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

const MODULE_NAME: &str = "onair-bc";

/// Command-line arguments for onair-bc
#[derive(Parser, Debug)]
#[command(name = "onair-bc")]
#[command(about = "Live audio broadcast service with effect splicing")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "ONAIR_PORT")]
    port: Option<u16>,

    /// Root folder that relative paths resolve against
    #[arg(short, long, env = "ONAIR_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "ONAIR_CONFIG")]
    config: Option<PathBuf>,

    /// Song to broadcast (overrides the config file)
    #[arg(short, long, env = "ONAIR_SONG")]
    song: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing; the configured level is applied once the config is read
    let (filter, filter_handle) = reload::Layer::new(log_filter("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = args.config.clone().or_else(|| default_config_path(MODULE_NAME));
    let mut config: RadioConfig = match &config_path {
        Some(path) => load_toml_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => RadioConfig::default(),
    };

    if let Err(e) = filter_handle.reload(log_filter(&config.logging.level)) {
        warn!("Failed to apply log level {}: {}", config.logging.level, e);
    }

    info!(
        "Starting OnAir broadcast service v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
    );
    match &config_path {
        Some(path) if path.exists() => info!("Configuration: {}", path.display()),
        // A missing file was reported while loading
        Some(_) => {}
        None => warn!("No config directory on this platform, using built-in defaults"),
    }

    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder.clone())
        .with_toml_root(config.root_folder.clone())
        .resolve();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(song) = args.song {
        config.paths.song = song;
    }
    config.resolve_paths(&root_folder);
    config.validate().context("Invalid configuration")?;

    info!("Root folder: {}", root_folder.display());
    info!("Song: {}", config.paths.song.display());
    info!("Effects: {}", config.paths.fx_dir.display());

    let tool = Arc::new(SoxTool::new(config.audio.tool_program.clone()));
    info!("Audio tool: {}", tool.program());
    let ctx = onair_bc::build_app_context(&config, tool);
    let controller = ctx.controller.clone();
    let app = onair_bc::api::create_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    controller.orchestrator().stop().await;
    info!("Server shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("onair_bc={0},onair_common={0},tower_http=info", level).into()
    })
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
