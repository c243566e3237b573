//! Controller actor commands and REST completions.

use pilot_core::{
    PlaybackAction, PlaybackSession, RecordingId, RecordingOptions, RecordingSession,
};
use tokio::sync::oneshot;

use super::view::DeleteToken;
use crate::error::{ApiError, Result};

/// Commands sent to a controller actor.
#[derive(Debug)]
pub enum ControllerCommand {
    StartRecording {
        options: RecordingOptions,
        respond_to: oneshot::Sender<Result<RecordingSession>>,
    },

    StopRecording {
        id: RecordingId,
        respond_to: oneshot::Sender<Result<RecordingSession>>,
    },

    /// First step of a deletion; nothing is sent to the server.
    RequestDelete {
        id: RecordingId,
        respond_to: oneshot::Sender<Result<DeleteToken>>,
    },

    ConfirmDelete {
        token: DeleteToken,
        respond_to: oneshot::Sender<Result<()>>,
    },

    StartPlayback {
        id: RecordingId,
        respond_to: oneshot::Sender<Result<PlaybackSession>>,
    },

    /// Answers `None` when the command was a no-op.
    ControlPlayback {
        action: PlaybackAction,
        value: Option<f64>,
        respond_to: oneshot::Sender<Result<Option<PlaybackSession>>>,
    },

    /// Seek to a fraction of the active playback's duration.
    SeekToFraction {
        fraction: f64,
        respond_to: oneshot::Sender<Result<Option<PlaybackSession>>>,
    },

    RefreshRecordings {
        respond_to: oneshot::Sender<Result<Vec<RecordingSession>>>,
    },

    /// Tear the view down.
    Unmount { respond_to: oneshot::Sender<()> },
}

/// Outcome of a REST call, reported back to the actor that issued it.
///
/// Each completion carries the caller's reply channel; if the actor is gone
/// by the time the call finishes, the completion is dropped and the caller
/// sees the view as closed.
#[derive(Debug)]
pub enum Completion {
    Started {
        result: std::result::Result<RecordingSession, ApiError>,
        respond_to: oneshot::Sender<Result<RecordingSession>>,
    },
    Stopped {
        result: std::result::Result<RecordingSession, ApiError>,
        respond_to: oneshot::Sender<Result<RecordingSession>>,
    },
    Deleted {
        id: RecordingId,
        result: std::result::Result<(), ApiError>,
        respond_to: oneshot::Sender<Result<()>>,
    },
    PlaybackStarted {
        result: std::result::Result<PlaybackSession, ApiError>,
        respond_to: oneshot::Sender<Result<PlaybackSession>>,
    },
    PlaybackControlled {
        result: std::result::Result<PlaybackSession, ApiError>,
        respond_to: oneshot::Sender<Result<Option<PlaybackSession>>>,
    },
    Listed {
        result: std::result::Result<Vec<RecordingSession>, ApiError>,
        respond_to: oneshot::Sender<Result<Vec<RecordingSession>>>,
    },
}
