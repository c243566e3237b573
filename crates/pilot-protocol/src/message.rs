//! Protocol message types for stream channels.
//!
//! Inbound frames are flat JSON objects discriminated by `type`. Routing ids
//! (`sessionId`, `taskId`, `agentId`) sit at the top level next to the
//! payload fields:
//!
//! ```json
//! {"type": "screenshot", "sessionId": "S1", "url": "https://..."}
//! ```

use pilot_core::{
    AgentId, AgentReport, BrowserAction, RecordingSession, SessionId, TaskId, TaskSnapshot,
    TaskStatus, Topic, TopicScope,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Outbound
// ============================================================================

/// Messages sent from the client over a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask the server to deliver messages for a topic.
    ///
    /// Sent once per topic after every (re)connect. The server is expected to
    /// treat repeats as no-ops.
    Subscribe {
        /// Entity id of the topic
        id: String,
        /// Kind of entity the id refers to
        scope: TopicScope,
    },
}

impl ClientMessage {
    /// Creates a subscribe message for a topic.
    pub fn subscribe(topic: &Topic) -> Self {
        Self::Subscribe {
            id: topic.id.clone(),
            scope: topic.scope,
        }
    }

    /// Serializes the message to a text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Payload of an inbound message, keyed by its `type` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Acknowledgement of a `subscribe`
    #[serde(rename = "subscribed")]
    Subscribed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Full task state, replacing the previous snapshot
    #[serde(rename = "task-update")]
    TaskUpdate { task: TaskSnapshot },

    /// A new screenshot is available
    #[serde(rename = "screenshot")]
    Screenshot { url: String },

    /// A recording URL is available for the session
    #[serde(rename = "recording")]
    Recording { url: String },

    /// A live preview stream is available
    #[serde(rename = "live-preview")]
    LivePreview { url: String },

    /// The automation performed a browser action
    #[serde(rename = "action")]
    Action { action: BrowserAction },

    /// The task finished; the live stream is gone
    #[serde(rename = "task-complete")]
    TaskComplete {
        #[serde(default)]
        status: TaskStatus,
    },

    /// A server-side error for the task or session
    #[serde(rename = "error")]
    Error { message: String },

    /// A recording changed state (processing finished, failed...)
    #[serde(rename = "recording-status")]
    RecordingStatus { recording: RecordingSession },

    /// Snapshot of all agents, sent when the agents channel opens
    #[serde(rename = "initial:status")]
    InitialStatus {
        #[serde(default)]
        agents: Vec<AgentReport>,
    },

    #[serde(rename = "agent:status")]
    AgentStatus(AgentReport),

    #[serde(rename = "agent:metrics")]
    AgentMetrics(AgentReport),

    #[serde(rename = "agent:health")]
    AgentHealth(AgentReport),
}

impl ServerEvent {
    /// Returns the wire discriminator of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Subscribed { .. } => "subscribed",
            Self::TaskUpdate { .. } => "task-update",
            Self::Screenshot { .. } => "screenshot",
            Self::Recording { .. } => "recording",
            Self::LivePreview { .. } => "live-preview",
            Self::Action { .. } => "action",
            Self::TaskComplete { .. } => "task-complete",
            Self::Error { .. } => "error",
            Self::RecordingStatus { .. } => "recording-status",
            Self::InitialStatus { .. } => "initial:status",
            Self::AgentStatus(_) => "agent:status",
            Self::AgentMetrics(_) => "agent:metrics",
            Self::AgentHealth(_) => "agent:health",
        }
    }

    /// The agent report carried by `agent:*` events.
    pub fn agent_report(&self) -> Option<&AgentReport> {
        match self {
            Self::AgentStatus(report) | Self::AgentMetrics(report) | Self::AgentHealth(report) => {
                Some(report)
            }
            _ => None,
        }
    }

    /// Returns true for events that can change a view's visual source.
    #[must_use]
    pub fn affects_source(&self) -> bool {
        matches!(
            self,
            Self::TaskUpdate { .. }
                | Self::Screenshot { .. }
                | Self::Recording { .. }
                | Self::LivePreview { .. }
                | Self::Action { .. }
                | Self::Error { .. }
                | Self::TaskComplete { .. }
        )
    }
}

/// Routing ids embedded at the top level of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
}

impl RoutingIds {
    pub fn session(id: impl Into<SessionId>) -> Self {
        Self {
            session_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn task(id: impl Into<TaskId>) -> Self {
        Self {
            task_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn agent(id: impl Into<AgentId>) -> Self {
        Self {
            agent_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Topics addressed by these ids.
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics = Vec::with_capacity(3);
        if let Some(id) = &self.session_id {
            topics.push(Topic::session(id));
        }
        if let Some(id) = &self.task_id {
            topics.push(Topic::task(id));
        }
        if let Some(id) = &self.agent_id {
            topics.push(Topic::agent(id));
        }
        topics
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.session_id.is_none() && self.task_id.is_none() && self.agent_id.is_none()
    }
}

/// A complete inbound message: routing ids plus the typed event.
///
/// Both halves are read from the same flat object (see
/// [`parse_frame`](crate::parse_frame)), so an `agentId` serves as a routing
/// id and as part of an agent report at once.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerMessage {
    pub routing: RoutingIds,
    pub event: ServerEvent,
}

impl ServerMessage {
    pub fn new(routing: RoutingIds, event: ServerEvent) -> Self {
        Self { routing, event }
    }

    /// Creates a message scoped to a session.
    pub fn for_session(id: impl Into<SessionId>, event: ServerEvent) -> Self {
        Self::new(RoutingIds::session(id), event)
    }

    /// Creates a message scoped to an agent.
    pub fn for_agent(id: impl Into<AgentId>, event: ServerEvent) -> Self {
        Self::new(RoutingIds::agent(id), event)
    }

    /// Builds the flat JSON object for this message.
    ///
    /// Ids already present in the event payload take precedence over the
    /// routing ids.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(&self.event)?;
        let ids = serde_json::to_value(&self.routing)?;
        if let (Some(object), Value::Object(ids)) = (value.as_object_mut(), ids) {
            for (key, id) in ids {
                object.entry(key).or_insert(id);
            }
        }
        Ok(value)
    }

    /// Serializes the message to a text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        self.to_value().map(|value| value.to_string())
    }

    /// Splits multi-agent snapshots into one message per agent.
    ///
    /// Agent reports carry their own id, so each piece is routed by it.
    /// Every other message is returned unchanged.
    pub fn fan_out(self) -> Vec<ServerMessage> {
        match self.event {
            ServerEvent::InitialStatus { agents } => agents
                .into_iter()
                .map(|report| {
                    let routing = RoutingIds::agent(report.agent_id.clone());
                    ServerMessage::new(
                        routing,
                        ServerEvent::InitialStatus {
                            agents: vec![report],
                        },
                    )
                })
                .collect(),
            event => {
                let routing = match event.agent_report() {
                    Some(report) if self.routing.agent_id.is_none() => {
                        RoutingIds::agent(report.agent_id.clone())
                    }
                    _ => self.routing,
                };
                vec![ServerMessage::new(routing, event)]
            }
        }
    }
}
