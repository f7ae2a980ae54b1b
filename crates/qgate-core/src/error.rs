//! Unified error types for the qgate core.
//!
//! Transport-level and gateway-level failures are kept apart: a
//! [`TransportError`] is always recoverable by reconnecting, while a
//! [`GatewayError`] may be fatal (see [`GatewayError::is_fatal`]).

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur on the duplex gateway channel.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The WebSocket handshake or TCP connect failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// The peer closed the connection or the stream ended.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// Writing a frame to the channel failed.
    #[error("failed to send frame: {0}")]
    SendFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Gateway Errors
// =============================================================================

/// Errors produced by the gateway state machine.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Transport failure; the reconnect loop retries after a delay.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be decoded.
    #[error("failed to decode frame: {0}")]
    Decode(String),

    /// The server rejected the session twice in a row.
    ///
    /// This is almost always a subscription to an event category the bot
    /// has no permission for.
    #[error("session rejected twice in a row, check the subscribed intents")]
    InvalidSession,

    /// The connection was constructed without any subscribed intents.
    #[error("no event intents subscribed")]
    NoIntents,

    /// The bot's own identity could not be resolved after one retry.
    #[error("failed to resolve bot identity: {0}")]
    IdentityUnavailable(String),

    /// The server sent something the state machine cannot act on.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Returns `true` if the error must stop the bot instead of reconnecting.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidSession | Self::NoIntents | Self::IdentityUnavailable(_)
        )
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Error type for REST calls.
///
/// Non-2xx responses are *not* errors; they are returned to the caller as
/// responses. This type only covers calls that produced no response at all.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The request could not be built (bad URL, bad header value, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The call timed out.
    #[error("API call timed out")]
    Timeout,
    /// The HTTP transport failed before a response arrived.
    #[error("HTTP transport error: {0}")]
    Http(String),
    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// The request task was cancelled or panicked inside the queue.
    #[error("request task aborted: {0}")]
    Aborted(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

// =============================================================================
// Callback Errors
// =============================================================================

/// A failure raised inside a user callback.
///
/// Produced by the safe-invoke wrapper; never propagated past the dispatcher.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// The callback returned an error.
    #[error("callback failed: {0:#}")]
    Failed(anyhow::Error),
    /// The callback panicked.
    #[error("callback panicked: {0}")]
    Panicked(String),
    /// The worker pool was shut down before the callback could run.
    #[error("callback was cancelled")]
    Cancelled,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Result type for REST calls.
pub type ApiResult<T> = Result<T, ApiError>;
