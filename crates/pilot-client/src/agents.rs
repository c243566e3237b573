//! Per-agent snapshots folded from the agents channel.
//!
//! The agents channel pushes an `initial:status` snapshot when it opens and
//! `agent:status`, `agent:metrics` and `agent:health` reports afterwards.
//! [`AgentMonitor`] keeps the latest report of each kind per agent; a newer
//! report of a kind replaces the older one wholesale.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use pilot_core::{AgentId, AgentReport};
use pilot_protocol::{ServerEvent, ServerMessage};
use tracing::debug;

/// Latest reports known for one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSnapshot {
    pub agent_id: AgentId,
    pub status: Option<AgentReport>,
    pub metrics: Option<AgentReport>,
    pub health: Option<AgentReport>,
    pub updated_at: DateTime<Utc>,
}

impl AgentSnapshot {
    fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            status: None,
            metrics: None,
            health: None,
            updated_at: Utc::now(),
        }
    }

    /// The agent's status label, if a status report carried one.
    pub fn status_label(&self) -> Option<&str> {
        self.status.as_ref().and_then(AgentReport::status)
    }

    /// All known fields in one report; health overrides metrics, which
    /// override status.
    pub fn combined(&self) -> AgentReport {
        let mut combined = AgentReport::new(self.agent_id.clone());
        for report in [&self.status, &self.metrics, &self.health].into_iter().flatten() {
            combined.merge(report);
        }
        combined
    }
}

/// Folds agent events into per-agent snapshots.
#[derive(Debug, Clone, Default)]
pub struct AgentMonitor {
    agents: BTreeMap<AgentId, AgentSnapshot>,
}

impl AgentMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a routed message. Returns the updated agent, or `None` for
    /// messages that carry no agent report.
    pub fn apply(&mut self, message: &ServerMessage) -> Option<&AgentSnapshot> {
        match &message.event {
            ServerEvent::InitialStatus { agents } => {
                let mut last = None;
                for report in agents {
                    self.replace(report, |s| &mut s.status);
                    last = Some(report.agent_id.clone());
                }
                last.and_then(|id| self.agents.get(&id))
            }
            ServerEvent::AgentStatus(report) => Some(self.replace(report, |s| &mut s.status)),
            ServerEvent::AgentMetrics(report) => Some(self.replace(report, |s| &mut s.metrics)),
            ServerEvent::AgentHealth(report) => Some(self.replace(report, |s| &mut s.health)),
            _ => None,
        }
    }

    fn replace(
        &mut self,
        report: &AgentReport,
        slot: impl FnOnce(&mut AgentSnapshot) -> &mut Option<AgentReport>,
    ) -> &AgentSnapshot {
        let snapshot = self
            .agents
            .entry(report.agent_id.clone())
            .or_insert_with(|| AgentSnapshot::new(report.agent_id.clone()));
        *slot(snapshot) = Some(report.clone());
        snapshot.updated_at = Utc::now();
        debug!(agent = %report.agent_id, status = ?report.status(), "Agent report applied");
        snapshot
    }

    pub fn get(&self, id: &AgentId) -> Option<&AgentSnapshot> {
        self.agents.get(id)
    }

    /// Snapshots ordered by agent id.
    pub fn agents(&self) -> impl Iterator<Item = &AgentSnapshot> {
        self.agents.values()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_protocol::parse_frame;
    use serde_json::json;

    fn message(value: serde_json::Value) -> ServerMessage {
        parse_frame(&value.to_string()).unwrap()
    }

    #[test]
    fn test_initial_status_seeds_agents() {
        let mut monitor = AgentMonitor::new();
        monitor.apply(&message(json!({
            "type": "initial:status",
            "agents": [
                {"agentId": "a1", "status": "idle"},
                {"agentId": "a2", "status": "busy"}
            ]
        })));

        assert_eq!(monitor.len(), 2);
        assert_eq!(
            monitor.get(&AgentId::new("a2")).and_then(AgentSnapshot::status_label),
            Some("busy")
        );
    }

    #[test]
    fn test_newer_report_replaces_older_of_same_kind() {
        let mut monitor = AgentMonitor::new();
        monitor.apply(&message(json!({"type": "agent:status", "agentId": "a1", "status": "idle", "task": "T1"})));
        let snapshot = monitor
            .apply(&message(json!({"type": "agent:status", "agentId": "a1", "status": "busy"})))
            .unwrap();

        assert_eq!(snapshot.status_label(), Some("busy"));
        assert!(snapshot.status.as_ref().unwrap().get("task").is_none());
    }

    #[test]
    fn test_kinds_are_kept_apart() {
        let mut monitor = AgentMonitor::new();
        monitor.apply(&message(json!({"type": "agent:status", "agentId": "a1", "status": "busy"})));
        monitor.apply(&message(json!({"type": "agent:metrics", "agentId": "a1", "cpu": 42.0})));
        monitor.apply(&message(json!({"type": "agent:health", "agentId": "a1", "healthy": true})));

        let snapshot = monitor.get(&AgentId::new("a1")).unwrap();
        assert_eq!(snapshot.status_label(), Some("busy"));

        let combined = snapshot.combined();
        assert_eq!(combined.get("cpu"), Some(&json!(42.0)));
        assert_eq!(combined.get("healthy"), Some(&json!(true)));
        assert_eq!(combined.status(), Some("busy"));
    }

    #[test]
    fn test_stream_events_are_ignored() {
        let mut monitor = AgentMonitor::new();
        let applied = monitor.apply(&message(
            json!({"type": "screenshot", "sessionId": "S1", "url": "u"}),
        ));
        assert!(applied.is_none());
        assert!(monitor.is_empty());
    }
}
