//! Cloneable handle for the router actor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RouterError::ChannelClosed`

use pilot_core::Topic;
use tokio::sync::{mpsc, oneshot};

use super::commands::{RouterCommand, Subscription, SubscriptionId};
use crate::channel::{ChannelKey, ChannelSpec};
use crate::error::RouterError;

/// Handle for interacting with the subscription router.
///
/// Cheap to clone. The router stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct RouterHandle {
    sender: mpsc::UnboundedSender<RouterCommand>,
}

impl RouterHandle {
    pub(crate) fn new(sender: mpsc::UnboundedSender<RouterCommand>) -> Self {
        Self { sender }
    }

    /// Attaches a subscription for `topic` on the channel `spec` describes.
    ///
    /// The first event delivered is always the channel's current connection
    /// state. If the channel is open and nobody else listens to `topic`, a
    /// `subscribe` message goes out right away; otherwise it goes out when
    /// the channel next opens. A channel that has errored is restarted.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::ChannelClosed` if the router has stopped.
    pub async fn subscribe(&self, spec: ChannelSpec, topic: Topic) -> Result<Subscription, RouterError> {
        self.subscribe_all(spec, [topic]).await
    }

    /// Attaches one subscription for several topics of the same channel.
    ///
    /// Messages matching any of the topics arrive on a single receiver in
    /// socket order; a message addressed to more than one of them is
    /// delivered once. Duplicate topics are ignored.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::ChannelClosed` if the router has stopped.
    pub async fn subscribe_all(
        &self,
        spec: ChannelSpec,
        topics: impl IntoIterator<Item = Topic>,
    ) -> Result<Subscription, RouterError> {
        let mut unique: Vec<Topic> = Vec::new();
        for topic in topics {
            if !unique.contains(&topic) {
                unique.push(topic);
            }
        }

        let (respond_to, rx) = oneshot::channel();
        self.sender
            .send(RouterCommand::Subscribe {
                spec,
                topics: unique,
                respond_to,
            })
            .map_err(|_| RouterError::ChannelClosed)?;
        rx.await.map_err(|_| RouterError::ChannelClosed)
    }

    /// Detaches a subscription.
    ///
    /// Returns `false` if it was already detached. Removing the last
    /// subscription on a channel releases the channel.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::ChannelClosed` if the router has stopped.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<bool, RouterError> {
        let (respond_to, rx) = oneshot::channel();
        self.sender
            .send(RouterCommand::Unsubscribe { id, respond_to })
            .map_err(|_| RouterError::ChannelClosed)?;
        rx.await.map_err(|_| RouterError::ChannelClosed)
    }

    /// Distinct topics currently active on a channel, in sorted order.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::ChannelClosed` if the router has stopped.
    pub async fn topics(&self, channel: ChannelKey) -> Result<Vec<Topic>, RouterError> {
        let (respond_to, rx) = oneshot::channel();
        self.sender
            .send(RouterCommand::Topics {
                channel,
                respond_to,
            })
            .map_err(|_| RouterError::ChannelClosed)?;
        rx.await.map_err(|_| RouterError::ChannelClosed)
    }

    /// Returns true if the router has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
