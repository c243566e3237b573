//! Request and response bodies of the recordings REST API.
//!
//! | Operation         | Method & path                                   |
//! |-------------------|-------------------------------------------------|
//! | start recording   | `POST /api/recordings/start`                    |
//! | stop recording    | `POST /api/recordings/{id}/stop`                |
//! | delete recording  | `DELETE /api/recordings/{id}`                   |
//! | start playback    | `POST /api/recordings/{id}/playback`            |
//! | control playback  | `POST /api/recordings/playback/{id}/control`    |
//! | list recordings   | `GET /api/recordings[/session/{sessionId}]`     |
//!
//! Responses are accepted both wrapped (`{"recording": {...}}`) and bare.

use pilot_core::{
    PlaybackAction, PlaybackSession, RecordingOptions, RecordingSession, SessionId,
};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/recordings/start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRecordingRequest {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub options: RecordingOptions,
}

/// Body of `POST /api/recordings/playback/{id}/control`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackControlRequest {
    pub action: PlaybackAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl PlaybackControlRequest {
    pub fn new(action: PlaybackAction) -> Self {
        Self {
            action,
            value: None,
        }
    }

    pub fn seek(position: f64) -> Self {
        Self {
            action: PlaybackAction::Seek,
            value: Some(position),
        }
    }
}

/// A single recording in a response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecordingEnvelope {
    Wrapped { recording: RecordingSession },
    Bare(RecordingSession),
}

impl RecordingEnvelope {
    pub fn into_inner(self) -> RecordingSession {
        match self {
            Self::Wrapped { recording } | Self::Bare(recording) => recording,
        }
    }
}

/// A playback session in a response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PlaybackEnvelope {
    Wrapped { playback: PlaybackSession },
    Session { session: PlaybackSession },
    Bare(PlaybackSession),
}

impl PlaybackEnvelope {
    pub fn into_inner(self) -> PlaybackSession {
        match self {
            Self::Wrapped { playback } => playback,
            Self::Session { session } | Self::Bare(session) => session,
        }
    }
}

/// A recording list in a response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecordingListEnvelope {
    Wrapped { recordings: Vec<RecordingSession> },
    Bare(Vec<RecordingSession>),
}

impl RecordingListEnvelope {
    pub fn into_inner(self) -> Vec<RecordingSession> {
        match self {
            Self::Wrapped { recordings } | Self::Bare(recordings) => recordings,
        }
    }
}
