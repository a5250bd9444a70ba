//! HTTP API layer.
//!
//! Thin handlers that delegate to the command router and the session
//! registry, plus router construction and server startup.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::BootstrappedServices;
use crate::context::NetworkContext;
use crate::events::BroadcastEventBridge;
use crate::protocol_constants::{PORT_RANGE_END, PORT_RANGE_START};
use crate::services::{CommandRouter, LifecycleProcessor};
use crate::session::SessionRegistry;
use crate::state::Config;

pub mod http;
pub mod response;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    /// Live chat sessions.
    pub registry: SessionRegistry,
    /// Parses chat text into session commands.
    pub router: CommandRouter,
    /// Routes bridge callbacks into sessions.
    pub lifecycle: Arc<LifecycleProcessor>,
    /// Source of the server-sent events stream.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Network configuration (port, advertise IP).
    pub network: NetworkContext,
    pub config: Arc<RwLock<Config>>,
}

impl AppState {
    /// Builds the API state from bootstrapped services.
    pub fn new(services: &BootstrappedServices, config: Arc<RwLock<Config>>) -> Self {
        Self {
            registry: services.registry.clone(),
            router: services.router.clone(),
            lifecycle: Arc::clone(&services.lifecycle),
            event_bridge: Arc::clone(&services.event_bridge),
            network: services.network.clone(),
            config,
        }
    }
}

/// Binds the first free port in `start..=end`.
pub async fn find_available_port(start: u16, end: u16) -> Result<(u16, TcpListener), ServerError> {
    for port in start..=end {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Starts the HTTP server on the configured or auto-discovered port.
///
/// Runs until `shutdown` is cancelled, then stops accepting connections and
/// drains in-flight requests.
pub async fn start_server(state: AppState, shutdown: CancellationToken) -> Result<(), ServerError> {
    let preferred_port = state.config.read().preferred_port;
    let (port, listener) = if preferred_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], preferred_port));
        (preferred_port, TcpListener::bind(&addr).await?)
    } else {
        find_available_port(PORT_RANGE_START, PORT_RANGE_END).await?
    };

    state.network.set_port(port);

    log::info!("[Api] Server listening on http://0.0.0.0:{}", port);
    let app = http::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    log::info!("[Api] Server stopped");
    Ok(())
}
