//! Cloneable handle for a mounted stream view.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `ControllerError::Closed`

use pilot_core::{
    seek_fraction, PlaybackAction, PlaybackSession, RecordingId, RecordingOptions,
    RecordingSession,
};
use tokio::sync::{mpsc, oneshot, watch};

use super::commands::ControllerCommand;
use super::view::{DeleteToken, StreamView};
use crate::error::{ControllerError, Result};

/// Handle for one mounted view.
///
/// Every command answers once the controller has applied its outcome, so the
/// snapshot from [`view`](Self::view) already reflects a successful reply.
#[derive(Debug, Clone)]
pub struct StreamController {
    sender: mpsc::UnboundedSender<ControllerCommand>,
    view: watch::Receiver<StreamView>,
}

impl StreamController {
    pub(crate) fn new(
        sender: mpsc::UnboundedSender<ControllerCommand>,
        view: watch::Receiver<StreamView>,
    ) -> Self {
        Self { sender, view }
    }

    /// Current snapshot of the view.
    pub fn view(&self) -> StreamView {
        self.view.borrow().clone()
    }

    /// A receiver that observes every published snapshot.
    pub fn watch(&self) -> watch::Receiver<StreamView> {
        self.view.clone()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> ControllerCommand,
    ) -> Result<T> {
        let (respond_to, rx) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .map_err(|_| ControllerError::Closed)?;
        rx.await.map_err(|_| ControllerError::Closed)?
    }

    /// Starts recording the view's session.
    ///
    /// # Errors
    ///
    /// - `Invariant` if the session is already recording or a start is
    ///   still in flight (no request is sent)
    /// - `Command` if the server rejects it
    pub async fn start_recording(&self, options: RecordingOptions) -> Result<RecordingSession> {
        self.request(|respond_to| ControllerCommand::StartRecording {
            options,
            respond_to,
        })
        .await
    }

    /// Stops a recording. The mirror takes whatever status the server
    /// reports, normally `processing`.
    pub async fn stop_recording(&self, id: &RecordingId) -> Result<RecordingSession> {
        let id = id.clone();
        self.request(|respond_to| ControllerCommand::StopRecording { id, respond_to })
            .await
    }

    /// Asks to delete a recording. Nothing is sent until the returned token
    /// is passed to [`confirm_delete`](Self::confirm_delete).
    pub async fn request_delete(&self, id: &RecordingId) -> Result<DeleteToken> {
        let id = id.clone();
        self.request(|respond_to| ControllerCommand::RequestDelete { id, respond_to })
            .await
    }

    /// Deletes the recording a token was issued for.
    ///
    /// The recording leaves the mirror only after the server acknowledged
    /// the deletion; a playback of it is cleared.
    pub async fn confirm_delete(&self, token: DeleteToken) -> Result<()> {
        self.request(|respond_to| ControllerCommand::ConfirmDelete { token, respond_to })
            .await
    }

    /// Opens a playback of a completed recording.
    pub async fn start_playback(&self, id: &RecordingId) -> Result<PlaybackSession> {
        let id = id.clone();
        self.request(|respond_to| ControllerCommand::StartPlayback { id, respond_to })
            .await
    }

    /// Sends a control action to the active playback.
    ///
    /// Returns `Ok(None)` without a request for a seek with no usable
    /// position.
    pub async fn control_playback(
        &self,
        action: PlaybackAction,
        value: Option<f64>,
    ) -> Result<Option<PlaybackSession>> {
        self.request(|respond_to| ControllerCommand::ControlPlayback {
            action,
            value,
            respond_to,
        })
        .await
    }

    /// Seeks to a fraction of the playback's duration.
    ///
    /// Returns `Ok(None)` without a request while the duration is unknown.
    pub async fn seek_to_fraction(&self, fraction: f64) -> Result<Option<PlaybackSession>> {
        self.request(|respond_to| ControllerCommand::SeekToFraction {
            fraction,
            respond_to,
        })
        .await
    }

    /// Seeks from a pointer position on a progress bar.
    pub async fn seek_from_pointer(
        &self,
        pointer_x: f64,
        bar_left: f64,
        bar_width: f64,
    ) -> Result<Option<PlaybackSession>> {
        match seek_fraction(pointer_x, bar_left, bar_width) {
            Some(fraction) => self.seek_to_fraction(fraction).await,
            None => Ok(None),
        }
    }

    /// Reloads the session's recordings from the server.
    pub async fn refresh_recordings(&self) -> Result<Vec<RecordingSession>> {
        self.request(|respond_to| ControllerCommand::RefreshRecordings { respond_to })
            .await
    }

    /// Unmounts the view.
    ///
    /// Subscriptions are released and results of commands still in flight
    /// are discarded. Calling this on an unmounted view does nothing.
    pub async fn unmount(&self) {
        let (respond_to, rx) = oneshot::channel();
        if self
            .sender
            .send(ControllerCommand::Unmount { respond_to })
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Returns true once the view has been unmounted.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
