//! Router actor - owns every subscription and the channel leases behind them.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Delivery failures detach the subscription instead of failing

use std::collections::{BTreeMap, BTreeSet, HashMap};

use pilot_core::{ConnectionState, Topic};
use pilot_protocol::{parse_frame, ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::commands::{RoutedEvent, RouterCommand, Subscription, SubscriptionId};
use crate::channel::{ChannelEvent, ChannelHandle, ChannelKey, ChannelNotice, ChannelSpec, ConnectionManager};

/// A notice tagged with the routed-channel instance it was forwarded for.
type TaggedNotice = (u64, ChannelNotice);

struct Route {
    topics: Vec<Topic>,
    events: mpsc::UnboundedSender<RoutedEvent>,
}

impl Route {
    fn matches(&self, topics: &[Topic]) -> bool {
        self.topics.iter().any(|topic| topics.contains(topic))
    }
}

/// Router-side state of one channel.
struct RoutedChannel {
    /// Distinguishes this lease from an earlier one on the same key
    instance: u64,
    handle: ChannelHandle,
    implicit_topic: Option<Topic>,
    /// Last state seen through notices
    state: ConnectionState,
    /// Socket generation the subscriptions were last replayed on
    open_generation: Option<u64>,
    subscriptions: BTreeMap<SubscriptionId, Route>,
}

impl RoutedChannel {
    fn active_topics(&self) -> BTreeSet<Topic> {
        self.subscriptions
            .values()
            .flat_map(|route| route.topics.iter().cloned())
            .collect()
    }

    fn send_subscribe(&self, generation: u64, topic: &Topic) {
        match self.handle.send_on(generation, &ClientMessage::subscribe(topic)) {
            Ok(()) => debug!(channel = %self.handle.key(), topic = %topic, generation, "Sent subscribe"),
            Err(e) => warn!(
                channel = %self.handle.key(),
                topic = %topic,
                error = %e,
                "Failed to send subscribe"
            ),
        }
    }
}

/// The router actor.
///
/// Implements the actor pattern: receives commands and channel notices,
/// processes them sequentially, and delivers routed events to subscribers.
///
/// # Ownership
///
/// The actor owns:
/// - `channels`: one lease per channel that has at least one subscription
/// - `index`: subscription id → channel lookups
pub struct RouterActor {
    manager: ConnectionManager,

    /// Command receiver
    receiver: mpsc::UnboundedReceiver<RouterCommand>,

    /// Notices from all routed channels
    notices: mpsc::UnboundedReceiver<TaggedNotice>,
    notice_tx: mpsc::UnboundedSender<TaggedNotice>,

    channels: HashMap<ChannelKey, RoutedChannel>,
    index: HashMap<SubscriptionId, ChannelKey>,

    next_subscription: u64,
    next_instance: u64,
}

impl RouterActor {
    pub fn new(manager: ConnectionManager, receiver: mpsc::UnboundedReceiver<RouterCommand>) -> Self {
        let (notice_tx, notices) = mpsc::unbounded_channel();
        Self {
            manager,
            receiver,
            notices,
            notice_tx,
            channels: HashMap::new(),
            index: HashMap::new(),
            next_subscription: 0,
            next_instance: 0,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until every handle is dropped, then releases all
    /// channel leases.
    pub async fn run(mut self) {
        info!("Subscription router starting");

        loop {
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some((instance, notice)) = self.notices.recv() => {
                    self.handle_notice(instance, notice);
                }
            }
        }

        for (_, channel) in self.channels.drain() {
            self.manager.close(&channel.handle);
        }
        info!(subscriptions = self.index.len(), "Subscription router stopped");
    }

    fn handle_command(&mut self, command: RouterCommand) {
        match command {
            RouterCommand::Subscribe {
                spec,
                topics,
                respond_to,
            } => {
                let subscription = self.handle_subscribe(spec, topics);
                // Ignore send error - the caller gave up; the receiver drop
                // detaches the subscription on first delivery
                let _ = respond_to.send(subscription);
            }
            RouterCommand::Unsubscribe { id, respond_to } => {
                let removed = self.remove_subscription(id);
                let _ = respond_to.send(removed);
            }
            RouterCommand::Topics {
                channel,
                respond_to,
            } => {
                let topics = self
                    .channels
                    .get(&channel)
                    .map(|c| c.active_topics().into_iter().collect())
                    .unwrap_or_default();
                let _ = respond_to.send(topics);
            }
        }
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    fn handle_subscribe(&mut self, spec: ChannelSpec, topics: Vec<Topic>) -> Subscription {
        self.next_subscription = self.next_subscription.wrapping_add(1);
        let id = SubscriptionId(self.next_subscription);
        let key = spec.key();

        match self.channels.get_mut(&key) {
            Some(channel) => {
                if channel.handle.state().is_errored() {
                    // A new lease restarts the channel. Listeners survive
                    // the restart.
                    let lease = self.manager.open(spec);
                    let stale = std::mem::replace(&mut channel.handle, lease);
                    self.manager.close(&stale);
                    info!(channel = %key, "Errored channel restarted for new subscription");
                }
            }
            None => {
                let channel = self.open_channel(spec);
                self.channels.insert(key.clone(), channel);
            }
        }

        let (events_tx, events) = mpsc::unbounded_channel();
        if let Some(channel) = self.channels.get_mut(&key) {
            let active = channel.active_topics();
            let _ = events_tx.send(RoutedEvent::Connection(channel.state.clone()));
            channel.subscriptions.insert(
                id,
                Route {
                    topics: topics.clone(),
                    events: events_tx,
                },
            );

            for topic in topics.iter().filter(|topic| !active.contains(*topic)) {
                if let Some(generation) = channel.open_generation {
                    channel.send_subscribe(generation, topic);
                }
            }
            debug!(
                channel = %key,
                subscription = %id,
                topics = topics.len(),
                "Subscription added"
            );
        }
        self.index.insert(id, key.clone());

        Subscription {
            id,
            topics,
            channel: key,
            events,
        }
    }

    fn open_channel(&mut self, spec: ChannelSpec) -> RoutedChannel {
        self.next_instance = self.next_instance.wrapping_add(1);
        let instance = self.next_instance;
        let implicit_topic = spec.implicit_topic.clone();
        let handle = self.manager.open(spec);

        let (listener, mut forwarded) = mpsc::unbounded_channel::<ChannelNotice>();
        let router = self.notice_tx.clone();
        tokio::spawn(async move {
            while let Some(notice) = forwarded.recv().await {
                if router.send((instance, notice)).is_err() {
                    break;
                }
            }
        });
        if let Err(e) = handle.listen(listener) {
            warn!(channel = %handle.key(), error = %e, "Failed to listen on channel");
        }

        info!(channel = %handle.key(), instance, "Routing channel opened");
        RoutedChannel {
            instance,
            handle,
            implicit_topic,
            state: ConnectionState::default(),
            open_generation: None,
            subscriptions: BTreeMap::new(),
        }
    }

    /// Removes a subscription, closing its channel lease if it was the last.
    fn remove_subscription(&mut self, id: SubscriptionId) -> bool {
        let Some(key) = self.index.remove(&id) else {
            return false;
        };
        let Some(channel) = self.channels.get_mut(&key) else {
            return false;
        };
        let removed = channel.subscriptions.remove(&id).is_some();
        debug!(channel = %key, subscription = %id, "Subscription removed");

        if channel.subscriptions.is_empty() {
            if let Some(channel) = self.channels.remove(&key) {
                self.manager.close(&channel.handle);
                info!(channel = %key, "Last subscription removed, channel released");
            }
        }
        removed
    }

    // ========================================================================
    // Notices
    // ========================================================================

    fn handle_notice(&mut self, instance: u64, notice: ChannelNotice) {
        let Some(channel) = self.channels.get_mut(&notice.key) else {
            return;
        };
        if channel.instance != instance {
            debug!(channel = %notice.key, "Ignoring notice from a released channel");
            return;
        }

        match notice.event {
            ChannelEvent::State(state) => self.handle_state(notice.key, notice.generation, state),
            ChannelEvent::Frame(text) => self.route_frame(notice.key, &text),
        }
    }

    fn handle_state(&mut self, key: ChannelKey, generation: u64, state: ConnectionState) {
        let Some(channel) = self.channels.get_mut(&key) else {
            return;
        };
        channel.state = state.clone();

        if state.is_open() {
            if channel.open_generation != Some(generation) {
                channel.open_generation = Some(generation);
                let topics = channel.active_topics();
                for topic in &topics {
                    channel.send_subscribe(generation, topic);
                }
                info!(
                    channel = %key,
                    generation,
                    topics = topics.len(),
                    "Channel open, subscriptions replayed"
                );
            }
        } else {
            channel.open_generation = None;
        }

        let dead: Vec<SubscriptionId> = channel
            .subscriptions
            .iter()
            .filter(|(_, route)| {
                route
                    .events
                    .send(RoutedEvent::Connection(state.clone()))
                    .is_err()
            })
            .map(|(id, _)| *id)
            .collect();
        self.detach(dead);
    }

    fn route_frame(&mut self, key: ChannelKey, text: &str) {
        let message = match parse_frame(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(channel = %key, error = %e, "Dropping unparseable frame");
                return;
            }
        };
        let Some(channel) = self.channels.get_mut(&key) else {
            return;
        };

        let mut dead = Vec::new();
        for piece in message.fan_out() {
            let topics = topics_for(&piece, channel.implicit_topic.as_ref());
            if topics.is_empty() {
                debug!(channel = %key, kind = piece.event.kind(), "Dropping message without routing id");
                continue;
            }

            let mut delivered = 0usize;
            for (id, route) in &channel.subscriptions {
                if !route.matches(&topics) {
                    continue;
                }
                if route.events.send(RoutedEvent::Message(piece.clone())).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*id);
                }
            }
            if delivered == 0 {
                debug!(channel = %key, kind = piece.event.kind(), "No subscriber for message");
            }
        }
        self.detach(dead);
    }

    fn detach(&mut self, dead: Vec<SubscriptionId>) {
        for id in dead {
            debug!(subscription = %id, "Subscriber dropped, detaching");
            self.remove_subscription(id);
        }
    }
}

/// Topics a message is addressed to.
///
/// Messages with no routing id belong to the channel's implicit topic, if it
/// has one.
fn topics_for(message: &ServerMessage, implicit_topic: Option<&Topic>) -> Vec<Topic> {
    if message.routing.is_empty() {
        implicit_topic.cloned().into_iter().collect()
    } else {
        message.routing.topics()
    }
}
