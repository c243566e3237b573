//! Domain-specific error types following panic-free policy.

use crate::{RecordingId, RecordingStatus, SessionId};
use thiserror::Error;

/// A command rejected locally because it would break a domain rule.
///
/// These are raised before any network call is made, and their messages are
/// suitable for showing to the user as-is.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvariantViolation {
    /// The session already has a recording in progress
    #[error("Session {session_id} is already being recorded")]
    RecordingAlreadyActive { session_id: SessionId },

    /// A start request for this session has not been answered yet
    #[error("A recording is already starting for session {session_id}")]
    RecordingStartPending { session_id: SessionId },

    /// The recording is not known to this view
    #[error("Recording not found: {recording_id}")]
    RecordingNotFound { recording_id: RecordingId },

    /// Stop was requested for a recording that is not recording
    #[error("Recording {recording_id} is not recording (status: {status})")]
    NotRecording {
        recording_id: RecordingId,
        status: RecordingStatus,
    },

    /// Playback requires a completed recording
    #[error("Recording {recording_id} cannot be played yet (status: {status})")]
    RecordingNotPlayable {
        recording_id: RecordingId,
        status: RecordingStatus,
    },

    /// A playback control was issued with no playback selected
    #[error("No active playback")]
    NoActivePlayback,

    /// A deletion was confirmed that was never requested (or already used)
    #[error("No pending deletion for confirmation token {token}")]
    UnknownDeletion { token: u64 },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, InvariantViolation>;
