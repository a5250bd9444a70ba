//! Centralized error types for the Voicecast core library.
//!
//! Two layers of errors live here:
//! - [`PlaybackError`]: the per-chat taxonomy produced by session transitions.
//!   Its `Display` text is what the chat user sees.
//! - [`VoicecastError`]: application-wide errors for the HTTP layer, mapped to
//!   status codes and rendered as JSON via `IntoResponse`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::media::{FetchError, ResolveError};
use crate::transport::{ProvisionError, TransportError};

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::Timeout => "transport_timeout",
            Self::Unreachable(_) => "transport_unreachable",
            Self::Status(_, _) => "transport_http_status",
            Self::Rejected { .. } => "transport_rejected",
        }
    }
}

impl ErrorCode for ProvisionError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotAdmin => "not_admin",
            Self::NoActiveRoom => "no_active_room",
            Self::InvalidRoom => "invalid_room",
            Self::Transport(e) => e.code(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Playback Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors produced while applying an event to a chat session.
///
/// Every variant is caught at the boundary of the transition that produced it
/// and turned into a reply; none of them is fatal to the session or process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    /// The resolver found nothing for the query.
    #[error("Could not find the requested song.")]
    NotFound,

    /// Downloading or transcoding the media failed.
    #[error("Could not download the requested song: {0}")]
    Fetch(String),

    /// The bot lacks admin rights in the chat.
    #[error("I need to be an admin in this chat to play music!")]
    NotAdmin,

    /// The chat has no live voice chat to join.
    #[error("No active voice chat found. Please start a voice chat first!")]
    NoActiveRoom,

    /// The room exists but cannot be used for streaming.
    #[error("This voice chat cannot be used for playback.")]
    InvalidRoom,

    /// Generic streaming-transport failure.
    #[error("Voice chat error: {0}")]
    Transport(String),

    /// Malformed command argument (bad volume, missing query, ...).
    #[error("{0}")]
    InvalidArgument(String),

    /// Command issued in a one-to-one conversation.
    #[error("I only play music in group voice chats. Add me to a group and start a voice chat there.")]
    WrongChatKind,

    /// The pending queue reached its configured cap.
    #[error("The queue is full ({0} songs). Try again after a few songs have played.")]
    QueueFull(usize),

    /// The chat's inbound event queue is saturated.
    #[error("Too many pending requests for this chat, please slow down.")]
    Busy,

    /// The session dispatcher is gone (shutdown in progress).
    #[error("The player is shutting down.")]
    Shutdown,
}

impl ErrorCode for PlaybackError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Fetch(_) => "fetch_failed",
            Self::NotAdmin => "not_admin",
            Self::NoActiveRoom => "no_active_room",
            Self::InvalidRoom => "invalid_room",
            Self::Transport(_) => "transport_error",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::WrongChatKind => "wrong_chat_kind",
            Self::QueueFull(_) => "queue_full",
            Self::Busy => "busy",
            Self::Shutdown => "shutdown",
        }
    }
}

impl PlaybackError {
    /// Formats the error as a chat reply line.
    #[must_use]
    pub fn to_reply(&self) -> String {
        match self {
            Self::InvalidArgument(_) => format!("⚠️ {}", self),
            _ => format!("❌ {}", self),
        }
    }
}

impl From<ResolveError> for PlaybackError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound => Self::NotFound,
            // Timeouts and crashes of the resolver count as fetch failures.
            ResolveError::Failed(_) => Self::Fetch(err.to_string()),
        }
    }
}

impl From<FetchError> for PlaybackError {
    fn from(err: FetchError) -> Self {
        Self::Fetch(err.to_string())
    }
}

impl From<TransportError> for PlaybackError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<ProvisionError> for PlaybackError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::NotAdmin => Self::NotAdmin,
            ProvisionError::NoActiveRoom => Self::NoActiveRoom,
            ProvisionError::InvalidRoom => Self::InvalidRoom,
            ProvisionError::Transport(e) => e.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Application Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Application-wide error type for the Voicecast server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum VoicecastError {
    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Requested chat has no live session.
    #[error("Session not found: {0}")]
    SessionNotFound(i64),

    /// Network-related error (IP detection, bind failures).
    #[error("Network error: {0}")]
    Network(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Server configuration error (invalid or missing settings).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl VoicecastError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::SessionNotFound(_) => "session_not_found",
            Self::Network(_) => "network_error",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type VoicecastResult<T> = Result<T, VoicecastError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for VoicecastError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
