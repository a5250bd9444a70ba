//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. Adapters (live or simulated)
//! are picked here from [`Config`], never probed at runtime.

use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::{LocalIpDetector, NetworkContext};
use crate::error::{VoicecastError, VoicecastResult};
use crate::events::{BroadcastEventBridge, EventEmitter, LoggingEventEmitter};
use crate::media::{MediaSource, SimulatedMedia, YtDlpMedia};
use crate::protocol_constants::LIFECYCLE_CHANNEL_CAPACITY;
use crate::services::{CommandRouter, LifecycleProcessor};
use crate::session::{Generations, SessionDeps, SessionRegistry};
use crate::state::{Config, MediaBackend, TransportBackend};
use crate::transport::{BridgeTransport, LifecycleSender, SimulatedTransport, StreamTransport};

/// Container for all bootstrapped services.
///
/// Consumed by [`crate::AppState`] to build the HTTP state.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Live chat sessions.
    pub registry: SessionRegistry,
    /// Chat text entry point.
    pub router: CommandRouter,
    /// Routes `StreamEnded` notifications into sessions.
    pub lifecycle: Arc<LifecycleProcessor>,
    /// Event bridge feeding the SSE endpoint.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Network configuration (port, advertise IP).
    pub network: NetworkContext,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
    background_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BootstrappedServices {
    /// Starts the lifecycle forwarder. Calling it twice is a no-op.
    pub fn start_background_tasks(&self) {
        if let Some(task) = self.lifecycle.start(self.cancel_token.clone()) {
            self.background_tasks.lock().push(task);
            log::info!("[Bootstrap] Lifecycle forwarder started");
        }
    }

    /// Initiates graceful shutdown of all services.
    ///
    /// Every session leaves its room before this returns.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        self.cancel_token.cancel();
        self.registry.shutdown().await;

        let tasks = std::mem::take(&mut *self.background_tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                log::warn!("[Bootstrap] Background task failed: {:?}", e);
            }
        }

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the HTTP client used to reach the voice bridge.
fn create_http_client(config: &Config) -> VoicecastResult<Client> {
    Client::builder()
        .timeout(config.transport_timeout())
        .build()
        .map_err(|e| VoicecastError::Internal(format!("Failed to create HTTP client: {e}")))
}

fn create_media(config: &Config) -> Arc<dyn MediaSource> {
    match config.media {
        MediaBackend::YtDlp => {
            log::info!(
                "[Bootstrap] Media: yt-dlp ({}), downloads in {}",
                config.ytdlp_path,
                config.media_dir.display()
            );
            Arc::new(YtDlpMedia::new(
                config.ytdlp_path.clone(),
                config.media_dir.clone(),
                config.resolve_timeout(),
                config.fetch_timeout(),
            ))
        }
        MediaBackend::Simulated => {
            log::info!("[Bootstrap] Media: simulated");
            let max_secs = u32::try_from(config.simulated_track_secs).unwrap_or(u32::MAX);
            Arc::new(SimulatedMedia::new(max_secs))
        }
    }
}

fn create_transport(
    config: &Config,
    network: &NetworkContext,
    lifecycle_tx: LifecycleSender,
) -> VoicecastResult<Arc<dyn StreamTransport>> {
    match config.transport {
        TransportBackend::Bridge => {
            let url = config.bridge_url.clone().ok_or_else(|| {
                VoicecastError::Configuration("bridge_url is required when transport = bridge".into())
            })?;
            log::info!("[Bootstrap] Transport: voice bridge at {}", url);
            // The bridge reports stream ends through our HTTP callback.
            drop(lifecycle_tx);
            Ok(Arc::new(BridgeTransport::new(
                create_http_client(config)?,
                url,
                network.clone(),
                config.transport_timeout(),
            )))
        }
        TransportBackend::Simulated => {
            log::info!("[Bootstrap] Transport: simulated");
            Ok(Arc::new(SimulatedTransport::new(
                lifecycle_tx,
                std::time::Duration::from_secs(config.simulated_track_secs),
            )))
        }
    }
}

/// Bootstraps all services, auto-detecting the advertise IP.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or IP detection fails.
pub fn bootstrap_services(config: &Config) -> VoicecastResult<BootstrappedServices> {
    let network = NetworkContext::auto_detect(config.preferred_port, LocalIpDetector::arc())
        .map_err(|e| VoicecastError::Network(format!("Failed to detect local IP: {e}")))?;
    bootstrap_services_with_network(config, network)
}

/// Bootstraps all services with an explicit network context.
///
/// Wiring order:
///
/// 1. Event bridge (with a logging emitter attached)
/// 2. Lifecycle channel between the transport and the processor
/// 3. Media source and streaming transport, chosen by configuration
/// 4. Session registry, command router and lifecycle processor
///
/// Background tasks are not started; call
/// [`BootstrappedServices::start_background_tasks`].
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the HTTP client
/// cannot be built.
pub fn bootstrap_services_with_network(
    config: &Config,
    network: NetworkContext,
) -> VoicecastResult<BootstrappedServices> {
    config.validate().map_err(VoicecastError::Configuration)?;

    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
    event_bridge.set_external_emitter(Arc::new(LoggingEventEmitter));

    let (lifecycle_tx, lifecycle_rx) = mpsc::channel(LIFECYCLE_CHANNEL_CAPACITY);

    let media = create_media(config);
    let transport = create_transport(config, &network, lifecycle_tx)?;

    let registry = SessionRegistry::new(
        SessionDeps {
            media,
            transport,
            emitter: Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
            generations: Generations::default(),
            max_queue_len: config.queue_cap(),
        },
        config.command_channel_capacity,
    );
    let router = CommandRouter::new(registry.clone());
    let lifecycle = Arc::new(LifecycleProcessor::new(registry.clone(), lifecycle_rx));

    Ok(BootstrappedServices {
        registry,
        router,
        lifecycle,
        event_bridge,
        network,
        cancel_token: CancellationToken::new(),
        background_tasks: Arc::new(Mutex::new(Vec::new())),
    })
}
