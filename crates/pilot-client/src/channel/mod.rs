//! Connection manager using the Actor pattern.
//!
//! Each open channel is a `ChannelActor` task that owns the channel's single
//! physical socket. The `ConnectionManager` hands out leases on channels and
//! tears a channel down when its last lease is released.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐ open/close ┌───────────────────┐
//! │ SubscriptionRouter│──────────▶│ ConnectionManager │
//! └──────────────────┘            └───────────────────┘
//!         ▲                               │ spawn (first lease)
//!         │ ChannelNotice                 ▼
//!         │ (state, frames)       ┌───────────────────┐      ┌────────┐
//!         └───────────────────────│   ChannelActor    │◀────▶│ socket │
//!                                 └───────────────────┘      └────────┘
//! ```
//!
//! Socket errors never escape `open`; they show up as connection state.
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - A poisoned lock is recovered, not propagated
//! - Channel operations handle closure gracefully

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::backoff::Backoff;
use crate::transport::{Connector, WsConnector};

mod actor;
mod commands;
mod handle;

pub use actor::ChannelActor;
pub use commands::{
    ChannelCommand, ChannelEvent, ChannelKey, ChannelNotice, ChannelSpec, ChannelStatus,
};
pub use handle::ChannelHandle;

/// Default connection probe window.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Timers governing a channel's connect and reconnect behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTiming {
    /// How long a connect may take before it is abandoned.
    pub probe_timeout: Duration,

    /// Reconnect schedule.
    pub backoff: Backoff,
}

impl Default for ChannelTiming {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            backoff: Backoff::default(),
        }
    }
}

struct ChannelEntry {
    sender: mpsc::UnboundedSender<ChannelCommand>,
    status: watch::Receiver<ChannelStatus>,
    leases: HashSet<u64>,
}

#[derive(Default)]
struct Channels {
    entries: HashMap<ChannelKey, ChannelEntry>,
    next_lease: u64,
}

/// Hands out reference-counted leases on channels.
///
/// Cheap to clone; clones share the same set of channels. One channel (and
/// one socket) exists per distinct [`ChannelSpec::key`].
#[derive(Clone)]
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    timing: ChannelTiming,
    channels: Arc<Mutex<Channels>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("timing", &self.timing)
            .field("channels", &self.channel_count())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, timing: ChannelTiming) -> Self {
        Self {
            connector,
            timing,
            channels: Arc::new(Mutex::new(Channels::default())),
        }
    }

    /// Creates a manager that opens real WebSocket connections.
    pub fn websocket(timing: ChannelTiming) -> Self {
        Self::new(Arc::new(WsConnector), timing)
    }

    pub fn timing(&self) -> ChannelTiming {
        self.timing
    }

    /// Takes a lease on the channel described by `spec`.
    ///
    /// The first lease spawns the channel actor, which starts connecting in
    /// the background. Later leases share the running channel; if it has
    /// errored, it is restarted. Must be called within a tokio runtime.
    pub fn open(&self, spec: ChannelSpec) -> ChannelHandle {
        let key = spec.key();
        let mut channels = self.lock();
        channels.next_lease = channels.next_lease.wrapping_add(1);
        let lease = channels.next_lease;

        if let Some(entry) = channels.entries.get_mut(&key) {
            if !entry.sender.is_closed() {
                if entry.status.borrow().state.is_errored() {
                    info!(channel = %key, "Reopening errored channel");
                    let _ = entry.sender.send(ChannelCommand::Restart);
                }
                entry.leases.insert(lease);
                debug!(channel = %key, lease, leases = entry.leases.len(), "Channel lease added");
                return ChannelHandle::new(spec, lease, entry.sender.clone(), entry.status.clone());
            }
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ChannelStatus::default());
        let actor = ChannelActor::new(
            spec.clone(),
            Arc::clone(&self.connector),
            self.timing,
            receiver,
            status_tx,
        );
        tokio::spawn(actor.run());

        let mut leases = HashSet::new();
        leases.insert(lease);
        channels.entries.insert(
            key.clone(),
            ChannelEntry {
                sender: sender.clone(),
                status: status_rx.clone(),
                leases,
            },
        );
        debug!(channel = %key, lease, "Channel opened");

        ChannelHandle::new(spec, lease, sender, status_rx)
    }

    /// Releases a lease.
    ///
    /// Releasing the last lease closes the socket and stops the channel; no
    /// reconnect follows. Returns `false` if the lease was already released.
    pub fn close(&self, handle: &ChannelHandle) -> bool {
        let mut channels = self.lock();
        let Some(entry) = channels.entries.get_mut(handle.key()) else {
            return false;
        };
        if !entry.leases.remove(&handle.lease()) {
            return false;
        }

        if entry.leases.is_empty() {
            // Ignore send error - actor may already be gone
            let _ = entry.sender.send(ChannelCommand::Shutdown);
            channels.entries.remove(handle.key());
            info!(channel = %handle.key(), "Last lease released, channel closed");
        } else {
            debug!(
                channel = %handle.key(),
                lease = handle.lease(),
                leases = entry.leases.len(),
                "Channel lease released"
            );
        }
        true
    }

    /// Number of channels currently held open.
    pub fn channel_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Number of outstanding leases on a channel.
    pub fn lease_count(&self, key: &ChannelKey) -> usize {
        self.lock()
            .entries
            .get(key)
            .map(|entry| entry.leases.len())
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, Channels> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
