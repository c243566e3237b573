//! Client-side mirror of one stream view.
//!
//! [`ViewState`] holds everything the controller knows about a session: the
//! latest URL fields, the tracked recordings and the active playback. All
//! methods are synchronous; the actor decides when network calls happen and
//! feeds results back in here.

use std::collections::HashMap;
use std::fmt;

use pilot_core::{
    BrowserAction, ConnectionPhase, ConnectionState, DomainResult, InvariantViolation,
    PlaybackSession, RecordingId, RecordingSession, RecordingStatus, SessionId, SourceFields,
    StreamSource, TaskId, TaskSnapshot, TaskStatus, Topic,
};
use pilot_protocol::ServerEvent;
use serde::{Deserialize, Serialize};

/// The session (and optionally the task) a view shows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamTarget {
    pub session_id: SessionId,
    pub task_id: Option<TaskId>,
}

impl StreamTarget {
    pub fn session(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            task_id: None,
        }
    }

    pub fn with_task(mut self, task_id: impl Into<TaskId>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Topics the view subscribes to: the session, then the task if any.
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics = vec![Topic::session(&self.session_id)];
        if let Some(task_id) = &self.task_id {
            topics.push(Topic::task(task_id));
        }
        topics
    }
}

impl fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.task_id {
            Some(task_id) => write!(f, "{}/{}", self.session_id, task_id),
            None => write!(f, "{}", self.session_id),
        }
    }
}

/// Where a view is in its lifecycle.
///
/// ```text
/// Idle → Connecting → Live | RecordingAvailable | ScreenshotAvailable | NoSource
///                         ↕ (recomputed on every event)
///                       Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewPhase {
    /// Mounted, nothing heard from the channel yet
    Idle,
    /// No source yet and the channel is not open
    Connecting,
    Live,
    RecordingAvailable,
    ScreenshotAvailable,
    /// Channel open (or given up) but nothing to show
    NoSource,
    /// Unmounted
    Closed,
}

impl ViewPhase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Live => "live",
            Self::RecordingAvailable => "recording-available",
            Self::ScreenshotAvailable => "screenshot-available",
            Self::NoSource => "no-source",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ViewPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Token returned by a delete request, redeemed by the confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeleteToken(u64);

impl DeleteToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeleteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable snapshot of a view, published after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamView {
    pub target: StreamTarget,
    pub phase: ViewPhase,
    pub source: StreamSource,
    pub connection: Option<ConnectionState>,
    pub task: Option<TaskSnapshot>,
    pub last_action: Option<BrowserAction>,
    pub last_error: Option<String>,
    pub recordings: Vec<RecordingSession>,
    pub playback: Option<PlaybackSession>,
    pub start_pending: bool,
}

/// Mutable mirror owned by the controller actor.
#[derive(Debug, Clone)]
pub struct ViewState {
    target: StreamTarget,
    connection: Option<ConnectionState>,
    fields: SourceFields,
    task: Option<TaskSnapshot>,
    last_action: Option<BrowserAction>,
    last_error: Option<String>,
    /// Recordings in the order they were first seen
    recordings: Vec<RecordingSession>,
    playback: Option<PlaybackSession>,
    start_pending: bool,
    pending_deletes: HashMap<DeleteToken, RecordingId>,
    next_token: u64,
    closed: bool,
}

impl ViewState {
    pub fn new(target: StreamTarget) -> Self {
        Self {
            target,
            connection: None,
            fields: SourceFields::default(),
            task: None,
            last_action: None,
            last_error: None,
            recordings: Vec::new(),
            playback: None,
            start_pending: false,
            pending_deletes: HashMap::new(),
            next_token: 0,
            closed: false,
        }
    }

    pub fn target(&self) -> &StreamTarget {
        &self.target
    }

    // ========================================================================
    // Derived state
    // ========================================================================

    /// The selected source. An active playback takes the recording slot.
    pub fn source(&self) -> StreamSource {
        let playback_url = self
            .playback
            .as_ref()
            .filter(|p| !p.is_stopped())
            .and_then(|p| p.stream_url.as_deref());
        self.fields.source_with_recording(playback_url)
    }

    pub fn phase(&self) -> ViewPhase {
        if self.closed {
            return ViewPhase::Closed;
        }
        match self.source() {
            StreamSource::Live(_) => ViewPhase::Live,
            StreamSource::Recording(_) => ViewPhase::RecordingAvailable,
            StreamSource::Screenshot(_) => ViewPhase::ScreenshotAvailable,
            StreamSource::None => match &self.connection {
                None => ViewPhase::Idle,
                Some(state) => match state.phase {
                    ConnectionPhase::Connecting | ConnectionPhase::Closed => ViewPhase::Connecting,
                    ConnectionPhase::Open | ConnectionPhase::Errored => ViewPhase::NoSource,
                },
            },
        }
    }

    pub fn snapshot(&self) -> StreamView {
        StreamView {
            target: self.target.clone(),
            phase: self.phase(),
            source: self.source(),
            connection: self.connection.clone(),
            task: self.task.clone(),
            last_action: self.last_action.clone(),
            last_error: self.last_error.clone(),
            recordings: self.recordings.clone(),
            playback: self.playback.clone(),
            start_pending: self.start_pending,
        }
    }

    pub fn recording(&self, id: &RecordingId) -> Option<&RecordingSession> {
        self.recordings.iter().find(|r| &r.id == id)
    }

    pub fn playback(&self) -> Option<&PlaybackSession> {
        self.playback.as_ref()
    }

    // ========================================================================
    // Inbound events
    // ========================================================================

    pub fn set_connection(&mut self, state: ConnectionState) {
        self.connection = Some(state);
    }

    /// Folds a pushed event into the mirror. Returns false if the event is
    /// not for views.
    pub fn apply_event(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::TaskUpdate { task } => {
                if let Some(url) = &task.live_url {
                    self.fields.live_url = Some(url.clone());
                }
                if let Some(url) = &task.recording_url {
                    self.fields.recording_url = Some(url.clone());
                }
                if let Some(url) = &task.screenshot_url {
                    self.fields.screenshot_url = Some(url.clone());
                }
                if let Some(error) = &task.error {
                    self.last_error = Some(error.clone());
                }
                self.task = Some(task.clone());
            }
            ServerEvent::Screenshot { url } => self.fields.screenshot_url = Some(url.clone()),
            ServerEvent::Recording { url } => self.fields.recording_url = Some(url.clone()),
            ServerEvent::LivePreview { url } => self.fields.live_url = Some(url.clone()),
            ServerEvent::Action { action } => self.last_action = Some(action.clone()),
            ServerEvent::Error { message } => self.last_error = Some(message.clone()),
            ServerEvent::TaskComplete { status } => {
                self.fields.live_url = None;
                let task = self.task.get_or_insert_with(TaskSnapshot::default);
                task.status = match status {
                    TaskStatus::Pending | TaskStatus::Running | TaskStatus::Unknown => {
                        TaskStatus::Completed
                    }
                    finished => *finished,
                };
                task.live_url = None;
            }
            ServerEvent::RecordingStatus { recording } => {
                if recording.session_id != self.target.session_id {
                    return false;
                }
                self.upsert_recording(recording.clone());
            }
            ServerEvent::Subscribed { .. }
            | ServerEvent::InitialStatus { .. }
            | ServerEvent::AgentStatus(_)
            | ServerEvent::AgentMetrics(_)
            | ServerEvent::AgentHealth(_) => return false,
        }
        true
    }

    // ========================================================================
    // Command guards
    // ========================================================================

    /// Checks a start request and marks it pending.
    pub fn begin_start(&mut self) -> DomainResult<()> {
        let session_id = self.target.session_id.clone();
        if self.start_pending {
            return Err(InvariantViolation::RecordingStartPending { session_id });
        }
        if self
            .recordings
            .iter()
            .any(|r| r.session_id == session_id && r.is_recording())
        {
            return Err(InvariantViolation::RecordingAlreadyActive { session_id });
        }
        self.start_pending = true;
        Ok(())
    }

    pub fn check_stop(&self, id: &RecordingId) -> DomainResult<()> {
        let recording = self.find(id)?;
        if !recording.is_recording() {
            return Err(InvariantViolation::NotRecording {
                recording_id: id.clone(),
                status: recording.status,
            });
        }
        Ok(())
    }

    pub fn check_playable(&self, id: &RecordingId) -> DomainResult<()> {
        let recording = self.find(id)?;
        if !recording.is_playable() {
            return Err(InvariantViolation::RecordingNotPlayable {
                recording_id: id.clone(),
                status: recording.status,
            });
        }
        Ok(())
    }

    /// The playback commands apply to.
    pub fn active_playback(&self) -> DomainResult<&PlaybackSession> {
        self.playback
            .as_ref()
            .ok_or(InvariantViolation::NoActivePlayback)
    }

    /// First step of a deletion: returns the token that confirms it.
    pub fn request_delete(&mut self, id: &RecordingId) -> DomainResult<DeleteToken> {
        self.find(id)?;
        self.next_token = self.next_token.wrapping_add(1);
        let token = DeleteToken(self.next_token);
        self.pending_deletes.insert(token, id.clone());
        Ok(token)
    }

    /// Redeems a delete token. Each token works once.
    pub fn confirm_delete(&mut self, token: DeleteToken) -> DomainResult<RecordingId> {
        self.pending_deletes
            .remove(&token)
            .ok_or(InvariantViolation::UnknownDeletion { token: token.0 })
    }

    fn find(&self, id: &RecordingId) -> DomainResult<&RecordingSession> {
        self.recording(id)
            .ok_or_else(|| InvariantViolation::RecordingNotFound {
                recording_id: id.clone(),
            })
    }

    // ========================================================================
    // Command results
    // ========================================================================

    /// Applies a start reply (or clears the pending flag on failure).
    pub fn finish_start(&mut self, started: Option<RecordingSession>) {
        self.start_pending = false;
        if let Some(mut recording) = started {
            recording.status = RecordingStatus::Recording;
            self.upsert_recording(recording);
        }
    }

    /// Applies a server object for a recording this view still tracks.
    pub fn apply_recording(&mut self, recording: RecordingSession) -> bool {
        if self.recording(&recording.id).is_none() {
            return false;
        }
        self.upsert_recording(recording);
        true
    }

    /// Removes a recording the server deleted.
    ///
    /// A playback of it is cleared, and so is a recording URL that pointed at
    /// its media.
    pub fn remove_recording(&mut self, id: &RecordingId) {
        let removed = self
            .recordings
            .iter()
            .position(|r| &r.id == id)
            .map(|index| self.recordings.remove(index));

        if self.playback.as_ref().is_some_and(|p| &p.recording_id == id) {
            self.playback = None;
        }
        if let Some(media) = removed.and_then(|r| r.url) {
            if self.fields.recording_url.as_deref() == Some(media.as_str()) {
                self.fields.recording_url = None;
            }
        }
        self.pending_deletes.retain(|_, pending| *pending != *id);
    }

    pub fn set_playback(&mut self, playback: PlaybackSession) {
        self.playback = Some(playback);
    }

    /// Replaces the playback only if it is still the selected one.
    pub fn apply_playback(&mut self, playback: PlaybackSession) -> bool {
        match &self.playback {
            Some(current) if current.id == playback.id => {
                self.playback = Some(playback);
                true
            }
            _ => false,
        }
    }

    /// Replaces the tracked recordings with a fresh listing.
    pub fn replace_recordings(&mut self, recordings: Vec<RecordingSession>) {
        self.recordings = recordings
            .into_iter()
            .filter(|r| r.session_id == self.target.session_id)
            .collect();
        if let Some(playback) = &self.playback {
            if self.recording(&playback.recording_id).is_none() {
                self.playback = None;
            }
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    fn upsert_recording(&mut self, recording: RecordingSession) {
        match self.recordings.iter_mut().find(|r| r.id == recording.id) {
            Some(existing) => *existing = recording,
            None => self.recordings.push(recording),
        }
    }
}
