//! Channel actor commands and the notices it publishes.

use std::fmt;

use pilot_core::{ConnectionState, Topic};
use tokio::sync::mpsc;
use url::Url;

// ============================================================================
// Channel identity
// ============================================================================

/// Describes a channel endpoint.
///
/// Two specs with the same primary and fallback URLs share one channel and
/// therefore one socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Endpoint tried first on every open.
    pub primary: Url,

    /// Legacy endpoint tried once when the primary does not answer in time.
    pub fallback: Option<Url>,

    /// Topic assumed for inbound messages that carry no routing id.
    ///
    /// Legacy per-session endpoints push unscoped messages; this names the
    /// session they belong to.
    pub implicit_topic: Option<Topic>,
}

impl ChannelSpec {
    pub fn new(primary: Url) -> Self {
        Self {
            primary,
            fallback: None,
            implicit_topic: None,
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: Url) -> Self {
        self.fallback = Some(fallback);
        self
    }

    #[must_use]
    pub fn with_implicit_topic(mut self, topic: Topic) -> Self {
        self.implicit_topic = Some(topic);
        self
    }

    /// Identity of the channel this spec opens.
    pub fn key(&self) -> ChannelKey {
        match &self.fallback {
            Some(fallback) => ChannelKey(format!("{} | {}", self.primary, fallback)),
            None => ChannelKey(self.primary.to_string()),
        }
    }
}

/// Identity of an open channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey(String);

impl ChannelKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Commands sent to a channel actor.
///
/// All commands are fire-and-forget; the actor reports back through notices
/// and its state watch.
#[derive(Debug)]
pub enum ChannelCommand {
    /// Write a text frame to the open socket.
    ///
    /// Dropped (with a debug log) unless the socket of `generation` is still
    /// the open one when the actor processes it. Frames never carry over to
    /// a later socket.
    Send {
        /// Serialized frame
        frame: String,
        /// Socket generation the frame was written for
        generation: u64,
    },

    /// Register a listener for state changes and inbound frames.
    ///
    /// The listener immediately receives the current state.
    Listen {
        /// Where notices are delivered
        listener: mpsc::UnboundedSender<ChannelNotice>,
    },

    /// Leave the errored state and run the connect sequence again.
    ///
    /// Ignored unless the channel is errored.
    Restart,

    /// Close the socket and stop the actor.
    Shutdown,
}

// ============================================================================
// Notices
// ============================================================================

/// Something that happened on a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The connection state changed.
    State(ConnectionState),

    /// A text frame arrived.
    Frame(String),
}

/// A channel event tagged with the channel it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelNotice {
    pub key: ChannelKey,
    /// Generation of the most recently opened socket.
    pub generation: u64,
    pub event: ChannelEvent,
}

/// Connection state plus the socket generation it belongs to.
///
/// The generation starts at 0 and is incremented every time the channel
/// enters the open state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelStatus {
    pub state: ConnectionState,
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_core::SessionId;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_key_includes_fallback() {
        let primary_only = ChannelSpec::new(url("ws://host/ws/tasks"));
        let with_fallback =
            ChannelSpec::new(url("ws://host/ws/tasks")).with_fallback(url("ws://host/ws/stream/S1"));

        assert_ne!(primary_only.key(), with_fallback.key());
        assert_eq!(primary_only.key().as_str(), "ws://host/ws/tasks");
    }

    #[test]
    fn test_implicit_topic_does_not_change_identity() {
        let plain = ChannelSpec::new(url("ws://host/ws/agents"));
        let scoped = plain
            .clone()
            .with_implicit_topic(Topic::session(&SessionId::new("S1")));
        assert_eq!(plain.key(), scoped.key());
    }
}
