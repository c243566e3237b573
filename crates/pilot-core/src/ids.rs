//! Type-safe identifiers and subscription topics.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserialize_id(deserializer).map(Self)
            }
        }

        impl $name {
            /// Creates a new identifier from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the underlying string reference.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns a shortened display form (first 8 characters).
            #[must_use]
            pub fn short(&self) -> &str {
                self.0.get(..8).unwrap_or(&self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Ids arrive as strings, but some backends send integer keys.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Unsigned(u64),
    Signed(i64),
}

fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(id) => id,
        RawId::Unsigned(id) => id.to_string(),
        RawId::Signed(id) => id.to_string(),
    })
}

string_id! {
    /// Identifier of a browser automation session.
    ///
    /// A session owns at most one active recording and is the default
    /// subscription topic for stream views.
    SessionId
}

string_id! {
    /// Identifier of a task running inside a session.
    TaskId
}

string_id! {
    /// Identifier of an automation agent reporting status and metrics.
    AgentId
}

string_id! {
    /// Identifier of a recording, assigned by the backend on start.
    RecordingId
}

string_id! {
    /// Identifier of a server-side playback session.
    PlaybackId
}

// ============================================================================
// Topics
// ============================================================================

/// The kind of entity a topic refers to.
///
/// Sent verbatim as the `scope` field of outbound `subscribe` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicScope {
    Session,
    Task,
    Agent,
}

impl TopicScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Task => "task",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for TopicScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A routing key: an entity id qualified by its scope.
///
/// Inbound messages embed `sessionId`, `taskId` or `agentId`; a message is
/// delivered to a subscription only when the embedded id and its scope match
/// the subscription's topic exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic {
    pub scope: TopicScope,
    pub id: String,
}

impl Topic {
    pub fn new(scope: TopicScope, id: impl Into<String>) -> Self {
        Self {
            scope,
            id: id.into(),
        }
    }

    pub fn session(id: &SessionId) -> Self {
        Self::new(TopicScope::Session, id.as_str())
    }

    pub fn task(id: &TaskId) -> Self {
        Self::new(TopicScope::Task, id.as_str())
    }

    pub fn agent(id: &AgentId) -> Self {
        Self::new(TopicScope::Agent, id.as_str())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.id)
    }
}
