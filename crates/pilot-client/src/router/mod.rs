//! Subscription router using the Actor pattern.
//!
//! The router multiplexes many logical subscriptions onto the channels of a
//! [`ConnectionManager`]. Each subscription names a channel and a topic; the
//! router keeps one channel lease per channel with subscribers, sends one
//! `subscribe` message per distinct topic each time a channel opens, and
//! delivers inbound messages to every subscription whose topic matches the
//! message's routing ids.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ RouterCommand ┌─────────────┐ lease ┌───────────────────┐
//! │ RouterHandle │──────────────▶│ RouterActor │──────▶│ ConnectionManager │
//! └──────────────┘               └─────────────┘       └───────────────────┘
//!        ▲                         │        ▲
//!        │ RoutedEvent             │        │ ChannelNotice
//!        └─────────────────────────┘        └──── channel actors
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - Unparseable frames are logged and dropped
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

use crate::channel::ConnectionManager;

mod actor;
mod commands;
mod handle;

pub use actor::RouterActor;
pub use commands::{RoutedEvent, RouterCommand, Subscription, SubscriptionId};
pub use handle::RouterHandle;

/// Spawn the router actor and return a handle for interaction.
///
/// # Example
///
/// ```no_run
/// use pilot_client::channel::{ChannelTiming, ConnectionManager};
/// use pilot_client::config::ClientConfig;
/// use pilot_client::router::spawn_router;
/// use pilot_core::{SessionId, Topic};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ClientConfig::load(None)?;
///     let router = spawn_router(ConnectionManager::websocket(ChannelTiming::default()));
///
///     let session = SessionId::new("S1");
///     let mut subscription = router
///         .subscribe(config.stream_channel(&session)?, Topic::session(&session))
///         .await?;
///     while let Some(event) = subscription.events.recv().await {
///         println!("{event:?}");
///     }
///     Ok(())
/// }
/// ```
pub fn spawn_router(manager: ConnectionManager) -> RouterHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let actor = RouterActor::new(manager, cmd_rx);
    tokio::spawn(actor.run());
    RouterHandle::new(cmd_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use pilot_core::{AgentId, ConnectionPhase, ConnectionState, SessionId, TaskId, Topic};
    use pilot_protocol::{RoutingIds, ServerEvent, ServerMessage};
    use serde_json::{json, Value};
    use url::Url;

    use crate::backoff::Backoff;
    use crate::channel::{ChannelSpec, ChannelTiming};
    use crate::testing::{Behavior, MockConnector, MockServer};

    const WAIT: Duration = Duration::from_secs(120);

    fn timing() -> ChannelTiming {
        ChannelTiming {
            probe_timeout: Duration::from_millis(1500),
            backoff: Backoff {
                base: Duration::from_secs(1),
                cap: Duration::from_secs(10),
                max_attempts: 5,
            },
        }
    }

    fn tasks_spec() -> ChannelSpec {
        ChannelSpec::new(Url::parse("ws://backend/ws/tasks").unwrap())
    }

    fn session(id: &str) -> Topic {
        Topic::session(&SessionId::new(id))
    }

    fn task(id: &str) -> Topic {
        Topic::task(&TaskId::new(id))
    }

    fn screenshot(url: &str) -> ServerEvent {
        ServerEvent::Screenshot { url: url.into() }
    }

    async fn next_event(subscription: &mut Subscription) -> RoutedEvent {
        tokio::time::timeout(WAIT, subscription.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("subscription closed")
    }

    async fn next_message(subscription: &mut Subscription) -> ServerMessage {
        loop {
            if let RoutedEvent::Message(message) = next_event(subscription).await {
                return message;
            }
        }
    }

    async fn wait_phase(subscription: &mut Subscription, phase: ConnectionPhase) -> ConnectionState {
        loop {
            if let RoutedEvent::Connection(state) = next_event(subscription).await {
                if state.phase == phase {
                    return state;
                }
            }
        }
    }

    async fn wait_open(subscription: &mut Subscription) -> ConnectionState {
        wait_phase(subscription, ConnectionPhase::Open).await
    }

    async fn sent_frame(server: &mut MockServer) -> Value {
        let frame = tokio::time::timeout(WAIT, server.next_sent())
            .await
            .expect("timed out waiting for frame")
            .expect("client hung up");
        serde_json::from_str(&frame).unwrap()
    }

    fn subscribe_frame(id: &str) -> Value {
        json!({"type": "subscribe", "id": id, "scope": "session"})
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_is_sent_when_channel_opens() {
        let (connector, mut servers) = MockConnector::accepting();
        let router = spawn_router(ConnectionManager::new(connector, timing()));

        let mut sub = router.subscribe(tasks_spec(), session("S1")).await.unwrap();
        let mut server = servers.recv().await.unwrap();

        assert_eq!(sent_frame(&mut server).await, subscribe_frame("S1"));
        wait_open(&mut sub).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_event_is_connection_state() {
        let (connector, _servers) = MockConnector::accepting();
        let router = spawn_router(ConnectionManager::new(connector, timing()));

        let mut sub = router.subscribe(tasks_spec(), session("S1")).await.unwrap();
        assert!(matches!(
            next_event(&mut sub).await,
            RoutedEvent::Connection(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replays_each_topic_once_after_reconnect() {
        let (connector, mut servers) = MockConnector::accepting();
        let router = spawn_router(ConnectionManager::new(connector, timing()));

        let _a = router.subscribe(tasks_spec(), session("S1")).await.unwrap();
        let _b = router.subscribe(tasks_spec(), session("S1")).await.unwrap();
        let _c = router.subscribe(tasks_spec(), session("S2")).await.unwrap();

        let mut first = servers.recv().await.unwrap();
        let mut frames = vec![sent_frame(&mut first).await, sent_frame(&mut first).await];
        frames.sort_by_key(|f| f["id"].as_str().unwrap_or_default().to_string());
        assert_eq!(frames, vec![subscribe_frame("S1"), subscribe_frame("S2")]);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(first.drain_sent().is_empty());

        first.disconnect();

        let mut second = servers.recv().await.unwrap();
        let mut frames = vec![sent_frame(&mut second).await, sent_frame(&mut second).await];
        frames.sort_by_key(|f| f["id"].as_str().unwrap_or_default().to_string());
        assert_eq!(frames, vec![subscribe_frame("S1"), subscribe_frame("S2")]);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(second.drain_sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_routed_by_session_id() {
        let (connector, mut servers) = MockConnector::accepting();
        let router = spawn_router(ConnectionManager::new(connector, timing()));

        let mut s1 = router.subscribe(tasks_spec(), session("S1")).await.unwrap();
        let mut s2 = router.subscribe(tasks_spec(), session("S2")).await.unwrap();
        let server = servers.recv().await.unwrap();
        wait_open(&mut s1).await;

        server.push_message(&ServerMessage::for_session("S1", screenshot("one")));
        server.push_message(&ServerMessage::for_session("S2", screenshot("two")));

        assert_eq!(next_message(&mut s1).await.event, screenshot("one"));
        assert_eq!(next_message(&mut s2).await.event, screenshot("two"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_subscriber_of_a_topic_receives_in_order() {
        let (connector, mut servers) = MockConnector::accepting();
        let router = spawn_router(ConnectionManager::new(connector, timing()));

        let mut a = router.subscribe(tasks_spec(), session("S1")).await.unwrap();
        let mut b = router.subscribe(tasks_spec(), session("S1")).await.unwrap();
        let server = servers.recv().await.unwrap();
        wait_open(&mut a).await;

        for url in ["1", "2", "3"] {
            server.push_message(&ServerMessage::for_session("S1", screenshot(url)));
        }
        for sub in [&mut a, &mut b] {
            for url in ["1", "2", "3"] {
                assert_eq!(next_message(sub).await.event, screenshot(url));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_implicit_topic_receives_unaddressed_messages() {
        let (connector, mut servers) = MockConnector::accepting();
        let router = spawn_router(ConnectionManager::new(connector, timing()));

        let spec = tasks_spec().with_implicit_topic(session("S1"));
        let mut sub = router.subscribe(spec, session("S1")).await.unwrap();
        let server = servers.recv().await.unwrap();
        wait_open(&mut sub).await;

        server.push_json(json!({"type": "recording", "url": "https://rec/1.webm"}));
        let message = next_message(&mut sub).await;
        assert!(message.routing.is_empty());
        assert_eq!(
            message.event,
            ServerEvent::Recording {
                url: "https://rec/1.webm".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_frames_are_dropped() {
        let (connector, mut servers) = MockConnector::accepting();
        let router = spawn_router(ConnectionManager::new(connector, timing()));

        let mut sub = router.subscribe(tasks_spec(), session("S1")).await.unwrap();
        let server = servers.recv().await.unwrap();
        wait_open(&mut sub).await;

        server.push("not json");
        server.push_json(json!({"type": "no-such-event", "sessionId": "S1"}));
        server.push_message(&ServerMessage::for_session("S1", screenshot("ok")));

        assert_eq!(next_message(&mut sub).await.event, screenshot("ok"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_status_fans_out_to_agent_topics() {
        let (connector, mut servers) = MockConnector::accepting();
        let router = spawn_router(ConnectionManager::new(connector, timing()));

        let spec = ChannelSpec::new(Url::parse("ws://backend/ws/agents").unwrap());
        let mut sub = router
            .subscribe(spec, Topic::agent(&AgentId::new("a1")))
            .await
            .unwrap();
        let server = servers.recv().await.unwrap();
        wait_open(&mut sub).await;

        server.push_json(json!({
            "type": "initial:status",
            "agents": [
                {"agentId": "a1", "status": "idle"},
                {"agentId": "a2", "status": "busy"}
            ]
        }));

        let message = next_message(&mut sub).await;
        match message.event {
            ServerEvent::InitialStatus { agents } => {
                assert_eq!(agents.len(), 1);
                assert_eq!(agents[0].agent_id.as_str(), "a1");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_unsubscribe_releases_channel() {
        let (connector, mut servers) = MockConnector::accepting();
        let manager = ConnectionManager::new(connector, timing());
        let router = spawn_router(manager.clone());

        let a = router.subscribe(tasks_spec(), session("S1")).await.unwrap();
        let b = router.subscribe(tasks_spec(), session("S2")).await.unwrap();
        let mut server = servers.recv().await.unwrap();

        assert!(router.unsubscribe(a.id).await.unwrap());
        assert!(!router.unsubscribe(a.id).await.unwrap());
        assert_eq!(manager.channel_count(), 1);
        assert_eq!(
            router.topics(tasks_spec().key()).await.unwrap(),
            vec![session("S2")]
        );

        assert!(router.unsubscribe(b.id).await.unwrap());
        assert_eq!(manager.channel_count(), 0);
        assert!(router.topics(tasks_spec().key()).await.unwrap().is_empty());

        // Drain whatever subscribes made it out, then the socket closes
        while tokio::time::timeout(WAIT, server.next_sent())
            .await
            .expect("socket left open")
            .is_some()
        {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_subscriber_is_detached() {
        let (connector, mut servers) = MockConnector::accepting();
        let router = spawn_router(ConnectionManager::new(connector, timing()));

        let dropped = router.subscribe(tasks_spec(), session("S1")).await.unwrap();
        let mut kept = router.subscribe(tasks_spec(), session("S2")).await.unwrap();
        let server = servers.recv().await.unwrap();
        wait_open(&mut kept).await;
        drop(dropped);

        server.push_message(&ServerMessage::for_session("S1", screenshot("lost")));
        server.push_message(&ServerMessage::for_session("S2", screenshot("seen")));
        assert_eq!(next_message(&mut kept).await.event, screenshot("seen"));

        assert_eq!(
            router.topics(tasks_spec().key()).await.unwrap(),
            vec![session("S2")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribe_after_release_opens_fresh_channel() {
        let (connector, mut servers) = MockConnector::accepting();
        let router = spawn_router(ConnectionManager::new(connector, timing()));

        let first = router.subscribe(tasks_spec(), session("S1")).await.unwrap();
        router.unsubscribe(first.id).await.unwrap();

        let mut again = router.subscribe(tasks_spec(), session("S1")).await.unwrap();
        wait_open(&mut again).await;

        // The newest socket must have received the subscribe
        let mut latest = servers.recv().await.unwrap();
        while let Ok(server) = servers.try_recv() {
            latest = server;
        }
        assert_eq!(sent_frame(&mut latest).await, subscribe_frame("S1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_multi_topic_subscription_keeps_socket_order() {
        let (connector, mut servers) = MockConnector::accepting();
        let router = spawn_router(ConnectionManager::new(connector, timing()));

        let mut sub = router
            .subscribe_all(tasks_spec(), [session("S1"), task("T1"), session("S1")])
            .await
            .unwrap();
        assert_eq!(sub.topics, vec![session("S1"), task("T1")]);

        let mut server = servers.recv().await.unwrap();
        assert_eq!(sent_frame(&mut server).await, subscribe_frame("S1"));
        assert_eq!(
            sent_frame(&mut server).await,
            json!({"type": "subscribe", "id": "T1", "scope": "task"})
        );
        wait_open(&mut sub).await;

        let both = RoutingIds {
            session_id: Some(SessionId::new("S1")),
            task_id: Some(TaskId::new("T1")),
            agent_id: None,
        };
        server.push_message(&ServerMessage::for_session("S1", screenshot("1")));
        server.push_message(&ServerMessage::new(RoutingIds::task("T1"), screenshot("2")));
        server.push_message(&ServerMessage::new(both, screenshot("3")));
        server.push_message(&ServerMessage::for_session("S1", screenshot("4")));

        for url in ["1", "2", "3", "4"] {
            assert_eq!(next_message(&mut sub).await.event, screenshot(url));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_restarts_errored_channel() {
        let (connector, mut servers) = MockConnector::new([], Behavior::Refuse);
        let mut timing = timing();
        timing.backoff.max_attempts = 1;
        let manager = ConnectionManager::new(connector.clone(), timing);
        let router = spawn_router(manager.clone());

        let mut first = router.subscribe(tasks_spec(), session("S1")).await.unwrap();
        wait_phase(&mut first, ConnectionPhase::Errored).await;
        let attempts = connector.attempt_urls().len();

        connector.then([Behavior::Accept]);
        let mut second = router.subscribe(tasks_spec(), session("S2")).await.unwrap();
        wait_open(&mut second).await;
        wait_open(&mut first).await;

        assert_eq!(connector.attempt_urls().len(), attempts + 1);
        assert_eq!(manager.lease_count(&tasks_spec().key()), 1);

        let mut server = servers.recv().await.unwrap();
        let mut frames = vec![sent_frame(&mut server).await, sent_frame(&mut server).await];
        frames.sort_by_key(|f| f["id"].as_str().unwrap_or_default().to_string());
        assert_eq!(frames, vec![subscribe_frame("S1"), subscribe_frame("S2")]);
    }
}
