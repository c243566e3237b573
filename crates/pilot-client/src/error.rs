//! Error types for the Pilot client.
//!
//! Errors are split by how they are handled:
//! - `TransportError` is recovered locally by reconnecting and only ever
//!   surfaces as connection state.
//! - `ApiError` is a failed REST command. It is returned to the caller, local
//!   state is left untouched and nothing is retried.
//! - `InvariantViolation` (from pilot-core) rejects a command before any
//!   network call.
//! - The remaining types report a component that has already shut down.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::time::Duration;

use pilot_core::InvariantViolation;
use thiserror::Error;

// ============================================================================
// Transport
// ============================================================================

/// Failures of a physical socket.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The socket could not be constructed or the handshake failed.
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// The connect did not finish within the probe window.
    #[error("Connection probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    /// The WebSocket layer reported an error on an open socket.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The peer closed the socket.
    #[error("Connection closed by peer")]
    Closed,
}

// ============================================================================
// Channels and routing
// ============================================================================

/// Errors from a channel handle.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The socket is not open; the frame was dropped.
    ///
    /// Frames are never queued across reconnects. Topic subscriptions are
    /// replayed by the router once the channel reopens.
    #[error("Channel is not open")]
    NotOpen,

    /// The channel has shut down (its last lease was released).
    #[error("Channel closed")]
    Closed,

    /// The outbound message could not be serialized.
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from the subscription router.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouterError {
    /// The router actor has shut down.
    #[error("Subscription router is not running")]
    ChannelClosed,
}

// ============================================================================
// REST commands
// ============================================================================

/// A failed REST command.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request could not be sent or the body could not be decoded.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    /// An endpoint URL could not be built.
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Errors while loading client configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// A configured URL is invalid.
    #[error("Invalid URL for {field}: {value} ({reason})")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },
}

// ============================================================================
// Controller
// ============================================================================

/// Errors returned by stream controller commands.
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Rejected locally; no request was sent.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    /// The REST command failed. Local state is unchanged.
    #[error("Command failed: {0}")]
    Command(#[from] ApiError),

    /// The view could not subscribe to its stream.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// The controller was unmounted; any late result was discarded.
    #[error("Stream view is closed")]
    Closed,
}

impl ControllerError {
    /// Returns true if the command was rejected without touching the network.
    #[must_use]
    pub fn is_local_rejection(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}

/// Result type for controller commands.
pub type Result<T> = std::result::Result<T, ControllerError>;
