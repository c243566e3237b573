//! Transport liveness as observed by subscribers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a channel's physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    /// A socket is being established (initial connect or a retry).
    Connecting,

    /// The socket is open and frames flow.
    Open,

    /// The socket closed; a retry may follow.
    Closed,

    /// Retries are exhausted. The channel stays down until reopened.
    Errored,
}

impl ConnectionPhase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Errored => "errored",
        }
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Snapshot of a channel's connection.
///
/// `reconnect_attempt` counts retries since the socket was last open and is
/// reset to zero whenever the channel enters [`ConnectionPhase::Open`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    pub reconnect_attempt: u32,
    pub last_error: Option<String>,
    /// URL of the endpoint the socket is (or was last) attached to.
    pub endpoint: Option<String>,
}

impl ConnectionState {
    pub fn connecting(reconnect_attempt: u32) -> Self {
        Self {
            phase: ConnectionPhase::Connecting,
            reconnect_attempt,
            last_error: None,
            endpoint: None,
        }
    }

    pub fn open(endpoint: impl Into<String>) -> Self {
        Self {
            phase: ConnectionPhase::Open,
            reconnect_attempt: 0,
            last_error: None,
            endpoint: Some(endpoint.into()),
        }
    }

    pub fn closed(reconnect_attempt: u32, error: Option<String>) -> Self {
        Self {
            phase: ConnectionPhase::Closed,
            reconnect_attempt,
            last_error: error,
            endpoint: None,
        }
    }

    pub fn errored(reconnect_attempt: u32, error: impl Into<String>) -> Self {
        Self {
            phase: ConnectionPhase::Errored,
            reconnect_attempt,
            last_error: Some(error.into()),
            endpoint: None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.phase == ConnectionPhase::Open
    }

    #[must_use]
    pub fn is_errored(&self) -> bool {
        self.phase == ConnectionPhase::Errored
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::connecting(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_resets_attempt_counter() {
        let state = ConnectionState::open("ws://localhost:3001/ws/tasks");
        assert!(state.is_open());
        assert_eq!(state.reconnect_attempt, 0);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_errored_keeps_reason() {
        let state = ConnectionState::errored(5, "connection refused");
        assert!(state.is_errored());
        assert_eq!(state.reconnect_attempt, 5);
        assert_eq!(state.last_error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(ConnectionPhase::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionPhase::Errored.to_string(), "errored");
    }
}
