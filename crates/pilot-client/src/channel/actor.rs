//! Channel actor - owns one physical socket at a time.
//!
//! The actor runs the connect sequence for its channel, pumps frames while
//! the socket is open, and reconnects with exponential backoff when the
//! socket drops. Only the actor ever holds a `Connection`; a new one is
//! requested only after the previous one has been dropped.
//!
//! # Connect sequence
//!
//! ```text
//! open ──▶ primary (probe timer) ──fail──▶ fallback (probe timer, once)
//!              │                                │
//!              ▼                                ▼
//!            OPEN ◀──────────── retry n ◀── wait min(base·2^(n-1), cap)
//!              │                    │
//!          dropped ─────────────────┘   n > max_attempts ──▶ ERRORED
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Listener send failures prune the listener instead of failing

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pilot_core::ConnectionState;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use url::Url;

use super::commands::{ChannelCommand, ChannelEvent, ChannelKey, ChannelNotice, ChannelSpec, ChannelStatus};
use super::ChannelTiming;
use crate::error::TransportError;
use crate::transport::{Connection, Connector};

/// How an open socket stopped being used.
enum SocketEnd {
    /// The socket failed or the peer closed it.
    Dropped(String),
    /// The channel was told to shut down.
    Shutdown,
}

/// The channel actor.
///
/// Processes commands sequentially. While connecting or waiting between
/// retries it keeps serving commands so listeners can attach and shutdown
/// is never delayed by a pending connect.
pub struct ChannelActor {
    key: ChannelKey,
    spec: ChannelSpec,
    connector: Arc<dyn Connector>,
    timing: ChannelTiming,

    /// Command receiver
    receiver: mpsc::UnboundedReceiver<ChannelCommand>,

    /// Notice subscribers (the router, mostly)
    listeners: Vec<mpsc::UnboundedSender<ChannelNotice>>,

    /// Latest status, readable from handles without a round trip
    status: watch::Sender<ChannelStatus>,

    /// Endpoint that last opened successfully. Retries go here.
    active: Url,

    /// Generation of the current (or last) open socket
    generation: u64,
}

impl ChannelActor {
    pub fn new(
        spec: ChannelSpec,
        connector: Arc<dyn Connector>,
        timing: ChannelTiming,
        receiver: mpsc::UnboundedReceiver<ChannelCommand>,
        status: watch::Sender<ChannelStatus>,
    ) -> Self {
        Self {
            key: spec.key(),
            active: spec.primary.clone(),
            spec,
            connector,
            timing,
            receiver,
            listeners: Vec::new(),
            status,
            generation: 0,
        }
    }

    /// Runs the actor until it is shut down or every sender is dropped.
    pub async fn run(mut self) {
        info!(
            channel = %self.key,
            primary = %self.spec.primary,
            fallback = ?self.spec.fallback.as_ref().map(Url::as_str),
            "Channel actor starting"
        );

        while self.connect_sequence().await {
            info!(channel = %self.key, "Channel restarting after errored state");
        }

        self.publish(ConnectionState::closed(0, None));
        info!(channel = %self.key, "Channel actor stopped");
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Runs one open: initial connect with fallback, then the retry loop.
    ///
    /// Returns `true` if the channel errored and was asked to restart,
    /// `false` if it should stop.
    async fn connect_sequence(&mut self) -> bool {
        let mut attempt: u32 = 0;
        let mut first = true;

        loop {
            self.publish(ConnectionState::connecting(attempt));

            let (target, fallback) = if first {
                (self.spec.primary.clone(), self.spec.fallback.clone())
            } else {
                (self.active.clone(), None)
            };
            first = false;

            let connect = connect_with_fallback(
                Arc::clone(&self.connector),
                target,
                fallback,
                self.timing.probe_timeout,
            );
            let outcome = match self.serve_until(connect).await {
                Some(outcome) => outcome,
                None => return false,
            };

            let reason = match outcome {
                Ok((endpoint, connection)) => {
                    attempt = 0;
                    self.generation = self.generation.wrapping_add(1);
                    info!(
                        channel = %self.key,
                        endpoint = %endpoint,
                        generation = self.generation,
                        "Channel open"
                    );
                    self.publish(ConnectionState::open(endpoint.as_str()));
                    self.active = endpoint;

                    match self.pump(connection).await {
                        SocketEnd::Shutdown => return false,
                        SocketEnd::Dropped(reason) => reason,
                    }
                }
                Err(e) => e.to_string(),
            };

            attempt = attempt.saturating_add(1);
            if self.timing.backoff.is_exhausted(attempt) {
                let failed = attempt.saturating_sub(1);
                warn!(
                    channel = %self.key,
                    attempts = failed,
                    error = %reason,
                    "Reconnect attempts exhausted, channel errored"
                );
                self.publish(ConnectionState::errored(failed, reason));
                return self.park().await;
            }

            let delay = self.timing.backoff.delay_for(attempt);
            debug!(
                channel = %self.key,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %reason,
                "Channel down, scheduling reconnect"
            );
            self.publish(ConnectionState::closed(attempt, Some(reason)));

            if self.serve_until(tokio::time::sleep(delay)).await.is_none() {
                return false;
            }
        }
    }

    /// Pumps frames until the socket drops or the channel shuts down.
    async fn pump(&mut self, connection: Connection) -> SocketEnd {
        let Connection {
            mut sink,
            mut stream,
        } = connection;

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(text)) => self.broadcast(ChannelEvent::Frame(text)),
                    Some(Err(e)) => {
                        warn!(channel = %self.key, error = %e, "Socket error");
                        return SocketEnd::Dropped(e.to_string());
                    }
                    None => {
                        info!(channel = %self.key, "Socket closed by peer");
                        return SocketEnd::Dropped(TransportError::Closed.to_string());
                    }
                },
                command = self.receiver.recv() => match command {
                    Some(ChannelCommand::Send { frame, generation }) => {
                        if generation != self.generation {
                            debug!(
                                channel = %self.key,
                                generation,
                                current = self.generation,
                                "Dropping frame written for an earlier socket"
                            );
                            continue;
                        }
                        if let Err(e) = sink.send(frame).await {
                            warn!(channel = %self.key, error = %e, "Socket write failed");
                            return SocketEnd::Dropped(e.to_string());
                        }
                    }
                    Some(ChannelCommand::Listen { listener }) => self.add_listener(listener),
                    Some(ChannelCommand::Restart) => {}
                    Some(ChannelCommand::Shutdown) | None => {
                        // Best effort close frame; the socket is dropped either way
                        let _ = sink.close().await;
                        return SocketEnd::Shutdown;
                    }
                },
            }
        }
    }

    /// Waits in the errored state until restarted or shut down.
    async fn park(&mut self) -> bool {
        while let Some(command) = self.receiver.recv().await {
            match command {
                ChannelCommand::Restart => return true,
                ChannelCommand::Listen { listener } => self.add_listener(listener),
                ChannelCommand::Send { .. } => {
                    debug!(channel = %self.key, "Dropping frame, channel errored");
                }
                ChannelCommand::Shutdown => return false,
            }
        }
        false
    }

    /// Drives `future` to completion while serving commands.
    ///
    /// Returns `None` if the channel was shut down first; the future is
    /// dropped, abandoning any pending connect.
    async fn serve_until<F: Future>(&mut self, future: F) -> Option<F::Output> {
        tokio::pin!(future);

        loop {
            tokio::select! {
                output = &mut future => return Some(output),
                command = self.receiver.recv() => match command {
                    Some(ChannelCommand::Send { .. }) => {
                        debug!(channel = %self.key, "Dropping frame, channel not open");
                    }
                    Some(ChannelCommand::Listen { listener }) => self.add_listener(listener),
                    Some(ChannelCommand::Restart) => {}
                    Some(ChannelCommand::Shutdown) | None => return None,
                },
            }
        }
    }

    // ========================================================================
    // Publishing
    // ========================================================================

    fn publish(&mut self, state: ConnectionState) {
        debug!(
            channel = %self.key,
            phase = %state.phase,
            attempt = state.reconnect_attempt,
            "Channel state"
        );
        self.status.send_replace(ChannelStatus {
            state: state.clone(),
            generation: self.generation,
        });
        self.broadcast(ChannelEvent::State(state));
    }

    fn broadcast(&mut self, event: ChannelEvent) {
        let notice = ChannelNotice {
            key: self.key.clone(),
            generation: self.generation,
            event,
        };
        self.listeners
            .retain(|listener| listener.send(notice.clone()).is_ok());
    }

    fn add_listener(&mut self, listener: mpsc::UnboundedSender<ChannelNotice>) {
        let current = self.status.borrow().clone();
        let notice = ChannelNotice {
            key: self.key.clone(),
            generation: current.generation,
            event: ChannelEvent::State(current.state),
        };
        if listener.send(notice).is_ok() {
            self.listeners.push(listener);
        }
    }
}

// ============================================================================
// Connecting
// ============================================================================

/// One connect attempt bounded by the probe timer.
async fn probe(
    connector: &dyn Connector,
    url: &Url,
    timeout: Duration,
) -> Result<Connection, TransportError> {
    match tokio::time::timeout(timeout, connector.connect(url)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::ProbeTimeout(timeout)),
    }
}

/// Connects to `primary`, falling back to `fallback` once if it fails.
///
/// The primary attempt is fully abandoned before the fallback starts.
async fn connect_with_fallback(
    connector: Arc<dyn Connector>,
    primary: Url,
    fallback: Option<Url>,
    timeout: Duration,
) -> Result<(Url, Connection), TransportError> {
    let primary_error = match probe(connector.as_ref(), &primary, timeout).await {
        Ok(connection) => return Ok((primary, connection)),
        Err(e) => e,
    };

    let Some(fallback) = fallback else {
        return Err(primary_error);
    };

    warn!(
        primary = %primary,
        fallback = %fallback,
        error = %primary_error,
        "Primary endpoint unavailable, trying fallback"
    );
    let connection = probe(connector.as_ref(), &fallback, timeout).await?;
    Ok((fallback, connection))
}
