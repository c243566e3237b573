//! Scripted transport and REST doubles for unit tests.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, Stream, StreamExt};
use pilot_core::{
    PlaybackId, PlaybackSession, RecordingId, RecordingOptions, RecordingSession, SessionId,
};
use pilot_protocol::{PlaybackControlRequest, ServerMessage};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use url::Url;

use crate::api::RecordingApi;
use crate::error::{ApiError, TransportError};
use crate::transport::{Connection, Connector};

// ============================================================================
// Connector
// ============================================================================

/// What the next connect attempt does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Open a socket and hand the server side to the test.
    Accept,
    /// Fail immediately.
    Refuse,
    /// Never complete.
    Hang,
}

/// Server side of an accepted mock socket.
pub struct MockServer {
    pub url: Url,
    to_client: fmpsc::UnboundedSender<Result<String, TransportError>>,
    from_client: fmpsc::UnboundedReceiver<String>,
}

impl MockServer {
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.to_client.unbounded_send(Ok(frame.into()));
    }

    pub fn push_json(&self, value: serde_json::Value) {
        self.push(value.to_string());
    }

    pub fn push_message(&self, message: &ServerMessage) {
        self.push(message.to_frame().unwrap());
    }

    /// Next frame written by the client, `None` once the client hung up.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.from_client.next().await
    }

    /// Frames written by the client so far, without waiting.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = self.from_client.try_next() {
            frames.push(frame);
        }
        frames
    }

    /// Drops the socket from the server side.
    pub fn disconnect(self) {}
}

/// Client stream that keeps the live-socket count accurate.
struct TrackedStream {
    inner: fmpsc::UnboundedReceiver<Result<String, TransportError>>,
    live: Arc<AtomicUsize>,
}

impl Stream for TrackedStream {
    type Item = Result<String, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Connector that follows a script of behaviors.
pub struct MockConnector {
    script: Mutex<VecDeque<Behavior>>,
    otherwise: Behavior,
    attempts: Mutex<Vec<(Url, Instant)>>,
    live: Arc<AtomicUsize>,
    max_live: AtomicUsize,
    servers: mpsc::UnboundedSender<MockServer>,
}

impl MockConnector {
    /// Creates a connector that plays `script` in order, then `otherwise`.
    pub fn new(
        script: impl IntoIterator<Item = Behavior>,
        otherwise: Behavior,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<MockServer>) {
        let (servers, accepted) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            otherwise,
            attempts: Mutex::new(Vec::new()),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: AtomicUsize::new(0),
            servers,
        });
        (connector, accepted)
    }

    /// Always accepts.
    pub fn accepting() -> (Arc<Self>, mpsc::UnboundedReceiver<MockServer>) {
        Self::new([], Behavior::Accept)
    }

    /// Appends behaviors to the script.
    pub fn then(&self, behaviors: impl IntoIterator<Item = Behavior>) {
        self.script.lock().unwrap().extend(behaviors);
    }

    pub fn attempt_urls(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.to_string())
            .collect()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn live_sockets(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live_sockets(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &Url) -> Result<Connection, TransportError> {
        self.attempts
            .lock()
            .unwrap()
            .push((url.clone(), Instant::now()));
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.otherwise);

        match behavior {
            Behavior::Refuse => Err(TransportError::Connect {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }),
            Behavior::Hang => futures::future::pending().await,
            Behavior::Accept => {
                let (to_client, client_rx) = fmpsc::unbounded();
                let (client_tx, from_client) = fmpsc::unbounded();

                let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_live.fetch_max(live, Ordering::SeqCst);

                let _ = self.servers.send(MockServer {
                    url: url.clone(),
                    to_client,
                    from_client,
                });

                let sink = client_tx.sink_map_err(|_| TransportError::Closed);
                let stream = TrackedStream {
                    inner: client_rx,
                    live: Arc::clone(&self.live),
                };
                Ok(Connection::new(Box::pin(sink), Box::pin(stream)))
            }
        }
    }
}

// ============================================================================
// Recording API
// ============================================================================

/// A scripted REST reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Recording(RecordingSession),
    Playback(PlaybackSession),
    Deleted,
    List(Vec<RecordingSession>),
    Fail(u16, &'static str),
}

/// Recording API double that records calls and plays scripted replies.
#[derive(Default)]
pub struct MockApi {
    calls: Mutex<Vec<String>>,
    replies: Mutex<VecDeque<Reply>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Holds the next call until the returned sender fires (or is dropped).
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(gate);
        release
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn answer(&self, call: String) -> Result<Reply, ApiError> {
        self.calls.lock().unwrap().push(call);
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        match self.replies.lock().unwrap().pop_front() {
            Some(Reply::Fail(status, body)) => Err(ApiError::UnexpectedStatus {
                status: reqwest::StatusCode::from_u16(status).unwrap(),
                body: body.to_string(),
            }),
            Some(reply) => Ok(reply),
            None => Err(ApiError::InvalidUrl("no scripted reply".to_string())),
        }
    }
}

fn mismatch(reply: Reply) -> ApiError {
    ApiError::InvalidUrl(format!("unexpected scripted reply {reply:?}"))
}

#[async_trait]
impl RecordingApi for MockApi {
    async fn start_recording(
        &self,
        session_id: &SessionId,
        _options: &RecordingOptions,
    ) -> Result<RecordingSession, ApiError> {
        match self.answer(format!("start {session_id}")).await? {
            Reply::Recording(recording) => Ok(recording),
            other => Err(mismatch(other)),
        }
    }

    async fn stop_recording(&self, id: &RecordingId) -> Result<RecordingSession, ApiError> {
        match self.answer(format!("stop {id}")).await? {
            Reply::Recording(recording) => Ok(recording),
            other => Err(mismatch(other)),
        }
    }

    async fn delete_recording(&self, id: &RecordingId) -> Result<(), ApiError> {
        match self.answer(format!("delete {id}")).await? {
            Reply::Deleted => Ok(()),
            other => Err(mismatch(other)),
        }
    }

    async fn start_playback(&self, id: &RecordingId) -> Result<PlaybackSession, ApiError> {
        match self.answer(format!("playback {id}")).await? {
            Reply::Playback(playback) => Ok(playback),
            other => Err(mismatch(other)),
        }
    }

    async fn control_playback(
        &self,
        id: &PlaybackId,
        request: &PlaybackControlRequest,
    ) -> Result<PlaybackSession, ApiError> {
        let call = match request.value {
            Some(value) => format!("control {id} {} {value}", request.action),
            None => format!("control {id} {}", request.action),
        };
        match self.answer(call).await? {
            Reply::Playback(playback) => Ok(playback),
            other => Err(mismatch(other)),
        }
    }

    async fn list_recordings(
        &self,
        session_id: Option<&SessionId>,
    ) -> Result<Vec<RecordingSession>, ApiError> {
        let call = match session_id {
            Some(id) => format!("list {id}"),
            None => "list".to_string(),
        };
        match self.answer(call).await? {
            Reply::List(recordings) => Ok(recordings),
            other => Err(mismatch(other)),
        }
    }
}
