//! Pilot Client - real-time streaming and recording control client
//!
//! This crate connects to the browser-automation backend:
//!
//! - [`channel`]: one reconnecting socket per channel, with probe/fallback
//!   connect and exponential backoff
//! - [`router`]: topic subscriptions multiplexed over channels, replayed on
//!   every reconnect
//! - [`controller`]: per-view source selection and recording/playback
//!   commands against the REST API
//! - [`agents`]: per-agent snapshots from the agents channel
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()` outside of tests.

pub mod agents;
pub mod api;
pub mod backoff;
pub mod channel;
pub mod config;
pub mod controller;
pub mod error;
pub mod router;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use agents::{AgentMonitor, AgentSnapshot};
pub use api::{HttpRecordingApi, RecordingApi};
pub use backoff::Backoff;
pub use channel::{ChannelHandle, ChannelSpec, ChannelTiming, ConnectionManager};
pub use config::ClientConfig;
pub use controller::{mount, StreamController, StreamTarget, StreamView, ViewPhase};
pub use error::{ApiError, ChannelError, ConfigError, ControllerError, RouterError, TransportError};
pub use router::{spawn_router, RoutedEvent, RouterHandle, Subscription, SubscriptionId};
pub use transport::{Connection, Connector, WsConnector};
