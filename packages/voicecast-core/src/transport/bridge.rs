//! Voice-bridge transport.
//!
//! Talks JSON over HTTP to a sidecar that holds the actual voice-chat
//! connection. Every room operation is a `POST {bridge}/rooms/{room}/...`.
//! The sidecar reports finished streams by calling back
//! `POST /callbacks/stream-ended` on our HTTP server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::retry::with_retry;
use super::{
    ProvisionError, RoomId, RoomProvisioning, StreamControl, StreamRequest, TransportError,
    TransportResult,
};
use crate::context::NetworkContext;
use crate::protocol_constants::{
    BRIDGE_CODE_INVALID_ROOM, BRIDGE_CODE_NOT_ADMIN, BRIDGE_CODE_NO_ACTIVE_ROOM,
    BRIDGE_CODE_STREAM_ACTIVE,
};

/// Error body returned by the bridge on non-2xx responses.
#[derive(Debug, Deserialize)]
struct BridgeErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

/// HTTP client for the voice-bridge sidecar.
#[derive(Clone)]
pub struct BridgeTransport {
    client: Client,
    base_url: String,
    network: NetworkContext,
    timeout: Duration,
}

impl BridgeTransport {
    /// Creates a transport for the bridge at `base_url`.
    ///
    /// `network` supplies the callback URL handed over on provisioning.
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        network: NetworkContext,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            network,
            timeout,
        }
    }

    fn room_url(&self, room: RoomId, action: &str) -> String {
        format!("{}/rooms/{}/{}", self.base_url, room, action)
    }

    /// Sends one POST and maps the outcome to a [`TransportError`].
    async fn post(&self, room: RoomId, action: &str, body: &serde_json::Value) -> TransportResult<()> {
        let url = self.room_url(room, action);
        log::debug!("[Bridge] POST {}", url);

        let res = self
            .client
            .post(&url)
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = res.status();
        if status.is_success() {
            return Ok(());
        }

        let text = res.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<BridgeErrorBody>(&text) {
            Ok(body) => TransportError::Rejected {
                code: body.code,
                message: body.message,
            },
            Err(_) => TransportError::Status(status.as_u16(), text),
        })
    }

    async fn post_with_retry(
        &self,
        room: RoomId,
        action: &str,
        body: serde_json::Value,
    ) -> TransportResult<()> {
        with_retry(action, || self.post(room, action, &body)).await
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Unreachable(err.to_string())
    }
}

fn stream_body(request: &StreamRequest) -> serde_json::Value {
    json!({
        "media": request.handle.as_str(),
        "generation": request.generation,
        "duration_secs": request.duration_secs,
    })
}

/// Maps a bridge rejection code onto the provisioning taxonomy.
fn provision_error(err: TransportError) -> ProvisionError {
    match &err {
        TransportError::Rejected { code, .. } => match code.as_str() {
            BRIDGE_CODE_NOT_ADMIN => ProvisionError::NotAdmin,
            BRIDGE_CODE_NO_ACTIVE_ROOM => ProvisionError::NoActiveRoom,
            BRIDGE_CODE_INVALID_ROOM => ProvisionError::InvalidRoom,
            _ => ProvisionError::Transport(err),
        },
        _ => ProvisionError::Transport(err),
    }
}

#[async_trait]
impl RoomProvisioning for BridgeTransport {
    async fn provision(&self, room: RoomId) -> Result<(), ProvisionError> {
        let body = json!({ "callback_url": self.network.stream_ended_callback_url() });
        self.post_with_retry(room, "provision", body)
            .await
            .map_err(provision_error)?;
        log::info!("[Bridge] Provisioned room {}", room);
        Ok(())
    }

    async fn leave(&self, room: RoomId) -> TransportResult<()> {
        self.post_with_retry(room, "leave", json!({})).await?;
        log::info!("[Bridge] Left room {}", room);
        Ok(())
    }
}

#[async_trait]
impl StreamControl for BridgeTransport {
    /// A start that timed out may still have reached the bridge, so a retry
    /// answered with `stream_active` means the earlier attempt went through.
    async fn start_stream(&self, room: RoomId, request: StreamRequest) -> TransportResult<()> {
        let body = stream_body(&request);
        let generation = request.generation;
        let mut attempts = 0u32;
        with_retry("stream", || {
            attempts += 1;
            let retried = attempts > 1;
            let body = &body;
            async move {
                match self.post(room, "stream", body).await {
                    Err(TransportError::Rejected { code, .. })
                        if retried && code == BRIDGE_CODE_STREAM_ACTIVE =>
                    {
                        log::info!(
                            "[Bridge] Room {} already streaming generation {} after retry",
                            room,
                            generation
                        );
                        Ok(())
                    }
                    other => other,
                }
            }
        })
        .await
    }

    async fn replace_stream(&self, room: RoomId, request: StreamRequest) -> TransportResult<()> {
        self.post_with_retry(room, "stream/replace", stream_body(&request))
            .await
    }

    async fn pause(&self, room: RoomId) -> TransportResult<()> {
        self.post_with_retry(room, "pause", json!({})).await
    }

    async fn resume(&self, room: RoomId) -> TransportResult<()> {
        self.post_with_retry(room, "resume", json!({})).await
    }

    async fn set_volume(&self, room: RoomId, level: u8) -> TransportResult<()> {
        self.post_with_retry(room, "volume", json!({ "level": level }))
            .await
    }
}
