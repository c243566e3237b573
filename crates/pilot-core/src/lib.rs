//! Pilot Core - Shared types for browser session streaming and recording
//!
//! This crate provides the core domain types shared between the wire
//! protocol (pilot-protocol) and the client (pilot-client).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod agent;
pub mod connection;
pub mod error;
pub mod ids;
pub mod playback;
pub mod recording;
pub mod source;
pub mod task;

// Re-exports for convenience
pub use agent::AgentReport;
pub use connection::{ConnectionPhase, ConnectionState};
pub use error::{DomainResult, InvariantViolation};
pub use ids::{AgentId, PlaybackId, RecordingId, SessionId, TaskId, Topic, TopicScope};
pub use playback::{seek_fraction, PlaybackAction, PlaybackSession, PlaybackStatus};
pub use recording::{RecordingFormat, RecordingOptions, RecordingSession, RecordingStatus};
pub use source::{SourceFields, StreamSource};
pub use task::{BrowserAction, TaskSnapshot, TaskStatus};
