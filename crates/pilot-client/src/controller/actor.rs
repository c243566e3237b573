//! Controller actor - owns one view's mirrors and issues its REST commands.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Reply channel failures are ignored (the caller gave up)

use std::future::Future;
use std::sync::Arc;

use pilot_core::{
    PlaybackAction, PlaybackId, PlaybackSession, RecordingId, RecordingOptions, RecordingSession,
};
use pilot_protocol::PlaybackControlRequest;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::commands::{Completion, ControllerCommand};
use super::view::{DeleteToken, StreamView, ViewState};
use crate::api::RecordingApi;
use crate::error::{ApiError, ControllerError, Result};
use crate::router::{RoutedEvent, RouterHandle, Subscription, SubscriptionId};

type Reply<T> = oneshot::Sender<Result<T>>;

/// The controller actor for one mounted view.
///
/// Inputs are processed one at a time:
/// - commands from [`StreamController`](super::StreamController) handles
/// - routed events from the view's subscription
/// - completions of REST calls it spawned
///
/// REST calls never block the loop; each runs on its own task and reports
/// back through `completions`. After unmount nothing is applied any more.
pub struct ControllerActor {
    state: ViewState,
    api: Arc<dyn RecordingApi>,
    router: RouterHandle,

    /// Released on unmount
    subscription: SubscriptionId,
    /// Session and task topics in socket order
    events: mpsc::UnboundedReceiver<RoutedEvent>,

    receiver: mpsc::UnboundedReceiver<ControllerCommand>,
    completions: mpsc::UnboundedReceiver<Completion>,
    completion_tx: mpsc::UnboundedSender<Completion>,

    view: watch::Sender<StreamView>,
}

impl ControllerActor {
    pub fn new(
        state: ViewState,
        api: Arc<dyn RecordingApi>,
        router: RouterHandle,
        subscription: Subscription,
        receiver: mpsc::UnboundedReceiver<ControllerCommand>,
        view: watch::Sender<StreamView>,
    ) -> Self {
        let (completion_tx, completions) = mpsc::unbounded_channel();

        Self {
            state,
            api,
            router,
            subscription: subscription.id,
            events: subscription.events,
            receiver,
            completions,
            completion_tx,
            view,
        }
    }

    /// Runs the actor event loop until unmount or until every handle is
    /// dropped.
    pub async fn run(mut self) {
        info!(view = %self.state.target(), "Stream view mounted");
        self.publish();

        let mut unmounted_by = None;
        loop {
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(ControllerCommand::Unmount { respond_to }) => {
                        unmounted_by = Some(respond_to);
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = self.events.recv() => self.handle_routed(event),
                Some(completion) = self.completions.recv() => {
                    self.handle_completion(completion);
                }
            }
            self.publish();
        }

        self.teardown().await;
        if let Some(respond_to) = unmounted_by {
            let _ = respond_to.send(());
        }
    }

    async fn teardown(&mut self) {
        self.state.close();
        self.publish();

        let id = self.subscription;
        if let Err(e) = self.router.unsubscribe(id).await {
            debug!(subscription = %id, error = %e, "Unsubscribe after router stop");
        }
        // Pending completions are dropped with the receiver; their callers
        // observe `ControllerError::Closed`.
        info!(view = %self.state.target(), "Stream view unmounted");
    }

    fn publish(&self) {
        let snapshot = self.state.snapshot();
        self.view.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    // ========================================================================
    // Routed events
    // ========================================================================

    fn handle_routed(&mut self, event: RoutedEvent) {
        match event {
            RoutedEvent::Connection(state) => {
                debug!(phase = %state.phase, attempt = state.reconnect_attempt, "Connection state");
                self.state.set_connection(state);
            }
            RoutedEvent::Message(message) => {
                if self.state.apply_event(&message.event) {
                    debug!(kind = message.event.kind(), "Applied stream event");
                }
            }
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn handle_command(&mut self, command: ControllerCommand) {
        match command {
            ControllerCommand::StartRecording {
                options,
                respond_to,
            } => self.start_recording(options, respond_to),
            ControllerCommand::StopRecording { id, respond_to } => {
                self.stop_recording(id, respond_to)
            }
            ControllerCommand::RequestDelete { id, respond_to } => {
                let result = self.state.request_delete(&id).map_err(ControllerError::from);
                if let Ok(token) = &result {
                    debug!(recording = %id, token = %token, "Delete awaiting confirmation");
                }
                let _ = respond_to.send(result);
            }
            ControllerCommand::ConfirmDelete { token, respond_to } => {
                self.confirm_delete(token, respond_to)
            }
            ControllerCommand::StartPlayback { id, respond_to } => {
                self.start_playback(id, respond_to)
            }
            ControllerCommand::ControlPlayback {
                action,
                value,
                respond_to,
            } => self.control_playback(action, value, respond_to),
            ControllerCommand::SeekToFraction {
                fraction,
                respond_to,
            } => self.seek_to_fraction(fraction, respond_to),
            ControllerCommand::RefreshRecordings { respond_to } => {
                self.refresh_recordings(respond_to)
            }
            ControllerCommand::Unmount { respond_to } => {
                // Handled by the run loop
                let _ = respond_to.send(());
            }
        }
    }

    fn start_recording(&mut self, options: RecordingOptions, respond_to: Reply<RecordingSession>) {
        if let Err(violation) = self.state.begin_start() {
            debug!(error = %violation, "Start recording rejected");
            let _ = respond_to.send(Err(violation.into()));
            return;
        }

        let api = Arc::clone(&self.api);
        let session_id = self.state.target().session_id.clone();
        info!(session_id = %session_id, "Starting recording");
        self.spawn_call(async move {
            let result = api.start_recording(&session_id, &options).await;
            Completion::Started { result, respond_to }
        });
    }

    fn stop_recording(&mut self, id: RecordingId, respond_to: Reply<RecordingSession>) {
        if let Err(violation) = self.state.check_stop(&id) {
            let _ = respond_to.send(Err(violation.into()));
            return;
        }

        let api = Arc::clone(&self.api);
        info!(recording = %id, "Stopping recording");
        self.spawn_call(async move {
            let result = api.stop_recording(&id).await;
            Completion::Stopped { result, respond_to }
        });
    }

    fn confirm_delete(&mut self, token: DeleteToken, respond_to: Reply<()>) {
        let id = match self.state.confirm_delete(token) {
            Ok(id) => id,
            Err(violation) => {
                let _ = respond_to.send(Err(violation.into()));
                return;
            }
        };

        let api = Arc::clone(&self.api);
        info!(recording = %id, "Deleting recording");
        self.spawn_call(async move {
            let result = api.delete_recording(&id).await;
            Completion::Deleted {
                id,
                result,
                respond_to,
            }
        });
    }

    fn start_playback(&mut self, id: RecordingId, respond_to: Reply<PlaybackSession>) {
        if let Err(violation) = self.state.check_playable(&id) {
            let _ = respond_to.send(Err(violation.into()));
            return;
        }

        let api = Arc::clone(&self.api);
        info!(recording = %id, "Starting playback");
        self.spawn_call(async move {
            let result = api.start_playback(&id).await;
            Completion::PlaybackStarted { result, respond_to }
        });
    }

    fn control_playback(
        &mut self,
        action: PlaybackAction,
        value: Option<f64>,
        respond_to: Reply<Option<PlaybackSession>>,
    ) {
        let playback_id = match self.state.active_playback() {
            Ok(playback) => playback.id.clone(),
            Err(violation) => {
                let _ = respond_to.send(Err(violation.into()));
                return;
            }
        };

        let request = match action {
            PlaybackAction::Seek => match value.filter(|v| v.is_finite()) {
                Some(position) => PlaybackControlRequest::seek(position),
                None => {
                    debug!("Seek without a position ignored");
                    let _ = respond_to.send(Ok(None));
                    return;
                }
            },
            action => PlaybackControlRequest::new(action),
        };
        self.send_control(playback_id, request, respond_to);
    }

    fn seek_to_fraction(&mut self, fraction: f64, respond_to: Reply<Option<PlaybackSession>>) {
        let (playback_id, target) = match self.state.active_playback() {
            Ok(playback) => (playback.id.clone(), playback.seek_target(fraction)),
            Err(violation) => {
                let _ = respond_to.send(Err(violation.into()));
                return;
            }
        };

        match target {
            Some(position) => {
                self.send_control(playback_id, PlaybackControlRequest::seek(position), respond_to)
            }
            None => {
                debug!(fraction, "Seek skipped, playback duration unknown");
                let _ = respond_to.send(Ok(None));
            }
        }
    }

    fn send_control(
        &mut self,
        playback_id: PlaybackId,
        request: PlaybackControlRequest,
        respond_to: Reply<Option<PlaybackSession>>,
    ) {
        let api = Arc::clone(&self.api);
        info!(playback = %playback_id, action = %request.action, value = ?request.value, "Playback control");
        self.spawn_call(async move {
            let result = api.control_playback(&playback_id, &request).await;
            Completion::PlaybackControlled { result, respond_to }
        });
    }

    fn refresh_recordings(&mut self, respond_to: Reply<Vec<RecordingSession>>) {
        let api = Arc::clone(&self.api);
        let session_id = self.state.target().session_id.clone();
        self.spawn_call(async move {
            let result = api.list_recordings(Some(&session_id)).await;
            Completion::Listed { result, respond_to }
        });
    }

    /// Runs a REST call on its own task and routes the outcome back here.
    fn spawn_call<F>(&self, call: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let completions = self.completion_tx.clone();
        tokio::spawn(async move {
            let completion = call.await;
            // Fails only after unmount; dropping the completion is the point
            let _ = completions.send(completion);
        });
    }

    // ========================================================================
    // Completions
    // ========================================================================

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Started { result, respond_to } => {
                let reply = match result {
                    Ok(recording) => {
                        info!(recording = %recording.id, "Recording started");
                        let id = recording.id.clone();
                        self.state.finish_start(Some(recording.clone()));
                        Ok(self.state.recording(&id).cloned().unwrap_or(recording))
                    }
                    Err(e) => {
                        warn!(error = %e, "Start recording failed");
                        self.state.finish_start(None);
                        Err(ControllerError::Command(e))
                    }
                };
                let _ = respond_to.send(reply);
            }
            Completion::Stopped { result, respond_to } => {
                let reply = result
                    .map(|recording| {
                        if !self.state.apply_recording(recording.clone()) {
                            debug!(recording = %recording.id, "Stop reply for untracked recording");
                        }
                        recording
                    })
                    .map_err(|e| self.command_failed("stop recording", e));
                let _ = respond_to.send(reply);
            }
            Completion::Deleted {
                id,
                result,
                respond_to,
            } => {
                let reply = result
                    .map(|()| {
                        info!(recording = %id, "Recording deleted");
                        self.state.remove_recording(&id);
                    })
                    .map_err(|e| self.command_failed("delete recording", e));
                let _ = respond_to.send(reply);
            }
            Completion::PlaybackStarted { result, respond_to } => {
                let reply = result
                    .map(|playback| {
                        info!(playback = %playback.id, "Playback started");
                        self.state.set_playback(playback.clone());
                        playback
                    })
                    .map_err(|e| self.command_failed("start playback", e));
                let _ = respond_to.send(reply);
            }
            Completion::PlaybackControlled { result, respond_to } => {
                let reply = result
                    .map(|playback| {
                        if !self.state.apply_playback(playback.clone()) {
                            debug!(playback = %playback.id, "Control reply for a replaced playback");
                        }
                        Some(playback)
                    })
                    .map_err(|e| self.command_failed("control playback", e));
                let _ = respond_to.send(reply);
            }
            Completion::Listed { result, respond_to } => {
                let reply = result
                    .map(|recordings| {
                        debug!(count = recordings.len(), "Recordings refreshed");
                        self.state.replace_recordings(recordings.clone());
                        recordings
                    })
                    .map_err(|e| self.command_failed("list recordings", e));
                let _ = respond_to.send(reply);
            }
        }
    }

    fn command_failed(&self, command: &'static str, error: ApiError) -> ControllerError {
        warn!(command, error = %error, "Command failed");
        ControllerError::Command(error)
    }
}

