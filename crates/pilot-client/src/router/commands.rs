//! Router actor commands and the events it delivers.

use std::fmt;

use pilot_core::{ConnectionState, Topic};
use pilot_protocol::ServerMessage;
use tokio::sync::{mpsc, oneshot};

use crate::channel::{ChannelKey, ChannelSpec};

/// Identifier of one subscription, unique for the router's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// What a subscription receives.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedEvent {
    /// A message addressed to the subscription's topic.
    Message(ServerMessage),

    /// The connection state of the subscription's channel changed.
    Connection(ConnectionState),
}

/// A handler registered for one or more topics of a channel.
///
/// Events arrive on `events` in socket receive order, whichever of the
/// topics they match. A message matching several topics is delivered once. Dropping the receiver
/// detaches the subscription the next time the router tries to deliver to
/// it; [`RouterHandle::unsubscribe`] detaches it immediately.
///
/// [`RouterHandle::unsubscribe`]: super::RouterHandle::unsubscribe
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub topics: Vec<Topic>,
    pub channel: ChannelKey,
    pub events: mpsc::UnboundedReceiver<RoutedEvent>,
}

/// Commands sent to the router actor.
#[derive(Debug)]
pub enum RouterCommand {
    /// Attach a handler for `topics` on the channel described by `spec`.
    ///
    /// Opens the channel if this is its first subscription, and restarts it
    /// if it has errored.
    Subscribe {
        /// Channel to attach to
        spec: ChannelSpec,
        /// Topic filter, without duplicates
        topics: Vec<Topic>,
        /// Channel to send the new subscription
        respond_to: oneshot::Sender<Subscription>,
    },

    /// Detach a subscription. Answers `false` if it was already gone.
    Unsubscribe {
        /// Subscription to remove
        id: SubscriptionId,
        /// Channel to send whether anything was removed
        respond_to: oneshot::Sender<bool>,
    },

    /// List the distinct topics active on a channel.
    Topics {
        /// Channel to inspect
        channel: ChannelKey,
        /// Channel to send the result
        respond_to: oneshot::Sender<Vec<Topic>>,
    },
}
