//! Agent reports pushed on the agents channel.

use crate::AgentId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A status, metrics or health report for one agent.
///
/// The backend's report payloads vary by agent kind, so everything except the
/// agent id is kept as an open JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReport {
    pub agent_id: AgentId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl AgentReport {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            fields: Map::new(),
        }
    }

    /// The `status` field as a string, if present.
    pub fn status(&self) -> Option<&str> {
        self.fields.get("status").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Overlays `other`'s fields onto this report.
    pub fn merge(&mut self, other: &AgentReport) {
        for (key, value) in &other.fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }
}
