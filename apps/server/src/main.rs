//! Voicecast Server - headless per-chat voice room playback orchestrator.
//!
//! Accepts chat commands over HTTP, drives one playback session per chat and
//! talks to a voice bridge (or the built-in simulation) for the actual audio.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use voicecast_core::{
    bootstrap_services_with_network, start_server, AppState, LocalIpDetector, NetworkContext,
    TransportBackend,
};

use crate::config::ServerConfig;

/// Voicecast Server - per-chat voice room playback.
#[derive(Parser, Debug)]
#[command(name = "voicecast-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "VOICECAST_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "VOICECAST_BIND_PORT")]
    port: Option<u16>,

    /// Advertise IP address (overrides config file).
    #[arg(short = 'a', long, env = "VOICECAST_ADVERTISE_IP")]
    advertise_ip: Option<std::net::IpAddr>,

    /// Voice bridge base URL; selects the bridge transport.
    #[arg(short = 'b', long, env = "VOICECAST_BRIDGE_URL")]
    bridge_url: Option<String>,

    /// Directory for downloaded audio.
    #[arg(short = 'm', long, env = "VOICECAST_MEDIA_DIR")]
    media_dir: Option<PathBuf>,
}

impl Args {
    /// CLI flags win over file and environment.
    fn override_config(&self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.bind_port = port;
        }
        if let Some(ip) = self.advertise_ip {
            config.advertise_ip = Some(ip);
        }
        if let Some(url) = &self.bridge_url {
            config.bridge_url = Some(url.clone());
            config.transport = TransportBackend::Bridge;
        }
        if let Some(dir) = &self.media_dir {
            config.media_dir = Some(dir.clone());
        }
    }
}

/// The bridge needs an address it can call back on.
fn network_context(config: &ServerConfig) -> Result<NetworkContext> {
    let network = match config.advertise_ip {
        Some(ip) => NetworkContext::explicit(config.bind_port, ip),
        None => NetworkContext::auto_detect(config.bind_port, LocalIpDetector::arc()).context(
            "No advertise IP configured and none could be detected; \
             pass --advertise-ip or set VOICECAST_ADVERTISE_IP",
        )?,
    };
    log::info!(
        "Listening on port {} (0 = pick from range), callbacks via {}",
        config.bind_port,
        network.advertise_ip()
    );
    Ok(network)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Voicecast Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.override_config(&mut config);
    let network = network_context(&config)?;

    let core_config = config.to_core_config();
    let services = bootstrap_services_with_network(&core_config, network)
        .context("Failed to bootstrap services")?;
    log::info!(
        "Transport: {:?}, media: {:?}",
        core_config.transport,
        core_config.media
    );

    services.start_background_tasks();

    let app_state = AppState::new(&services, Arc::new(RwLock::new(core_config)));
    let server_shutdown = CancellationToken::new();
    let server_handle = {
        let shutdown = server_shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = start_server(app_state, shutdown).await {
                log::error!("HTTP server stopped: {}", e);
            }
        })
    };

    shutdown_signal().await;
    log::info!("Stopping: leaving all voice rooms");

    // Sessions leave their rooms first; the bridge may still call back meanwhile.
    services.shutdown().await;

    server_shutdown.cancel();
    if let Err(e) = server_handle.await {
        log::warn!("Server task failed: {}", e);
    }

    log::info!("Voicecast Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
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
                log::error!("Failed to install SIGTERM handler: {}", e);
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
