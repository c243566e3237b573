//! Lease handle for an open channel.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `ChannelError::Closed`

use pilot_core::ConnectionState;
use pilot_protocol::ClientMessage;
use tokio::sync::{mpsc, watch};

use super::commands::{ChannelCommand, ChannelKey, ChannelNotice, ChannelSpec, ChannelStatus};
use crate::error::ChannelError;

/// One lease on a channel, returned by [`ConnectionManager::open`].
///
/// The socket stays up while at least one lease is held. Release a lease
/// with [`ConnectionManager::close`]; releasing the last one shuts the
/// channel down.
///
/// [`ConnectionManager::open`]: super::ConnectionManager::open
/// [`ConnectionManager::close`]: super::ConnectionManager::close
#[derive(Debug)]
pub struct ChannelHandle {
    key: ChannelKey,
    lease: u64,
    spec: ChannelSpec,
    sender: mpsc::UnboundedSender<ChannelCommand>,
    status: watch::Receiver<ChannelStatus>,
}

impl ChannelHandle {
    pub(crate) fn new(
        spec: ChannelSpec,
        lease: u64,
        sender: mpsc::UnboundedSender<ChannelCommand>,
        status: watch::Receiver<ChannelStatus>,
    ) -> Self {
        Self {
            key: spec.key(),
            lease,
            spec,
            sender,
            status,
        }
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    pub fn lease(&self) -> u64 {
        self.lease
    }

    /// The spec this lease was opened with.
    pub fn spec(&self) -> &ChannelSpec {
        &self.spec
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state.clone()
    }

    /// A receiver that observes every status change.
    pub fn watch(&self) -> watch::Receiver<ChannelStatus> {
        self.status.clone()
    }

    /// Sends a message on the currently open socket.
    ///
    /// # Errors
    ///
    /// - `ChannelError::NotOpen` if the socket is not open (nothing is queued)
    /// - `ChannelError::Closed` if the channel has shut down
    /// - `ChannelError::Encode` if the message cannot be serialized
    pub fn send(&self, message: &ClientMessage) -> Result<(), ChannelError> {
        let generation = {
            let status = self.status.borrow();
            if !status.state.is_open() {
                return Err(ChannelError::NotOpen);
            }
            status.generation
        };
        self.send_on(generation, message)
    }

    /// Sends a message only on the socket of `generation`.
    ///
    /// If that socket has already been replaced when the actor gets to the
    /// frame, the frame is dropped.
    ///
    /// # Errors
    ///
    /// - `ChannelError::Closed` if the channel has shut down
    /// - `ChannelError::Encode` if the message cannot be serialized
    pub fn send_on(&self, generation: u64, message: &ClientMessage) -> Result<(), ChannelError> {
        let frame = message.to_frame()?;
        self.sender
            .send(ChannelCommand::Send { frame, generation })
            .map_err(|_| ChannelError::Closed)
    }

    /// Registers a listener for this channel's notices.
    ///
    /// # Errors
    ///
    /// - `ChannelError::Closed` if the channel has shut down
    pub fn listen(&self, listener: mpsc::UnboundedSender<ChannelNotice>) -> Result<(), ChannelError> {
        self.sender
            .send(ChannelCommand::Listen { listener })
            .map_err(|_| ChannelError::Closed)
    }

    /// Returns true once the channel actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_core::{SessionId, Topic};
    use url::Url;

    fn test_handle() -> (
        ChannelHandle,
        mpsc::UnboundedReceiver<ChannelCommand>,
        watch::Sender<ChannelStatus>,
    ) {
        let spec = ChannelSpec::new(Url::parse("ws://localhost:3001/ws/tasks").unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ChannelStatus::default());
        (ChannelHandle::new(spec, 1, tx, status_rx), rx, status_tx)
    }

    fn subscribe_s1() -> ClientMessage {
        ClientMessage::subscribe(&Topic::session(&SessionId::new("S1")))
    }

    #[test]
    fn test_send_rejected_while_connecting() {
        let (handle, mut rx, _status) = test_handle();
        assert!(matches!(
            handle.send(&subscribe_s1()),
            Err(ChannelError::NotOpen)
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_tags_current_generation() {
        let (handle, mut rx, status) = test_handle();
        status.send_replace(ChannelStatus {
            state: ConnectionState::open("ws://localhost:3001/ws/tasks"),
            generation: 3,
        });

        handle.send(&subscribe_s1()).unwrap();
        match rx.try_recv() {
            Ok(ChannelCommand::Send { frame, generation }) => {
                assert_eq!(generation, 3);
                assert!(frame.contains("\"subscribe\""));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_send_after_shutdown_reports_closed() {
        let (handle, rx, _status) = test_handle();
        drop(rx);
        assert!(matches!(
            handle.send_on(1, &subscribe_s1()),
            Err(ChannelError::Closed)
        ));
        assert!(handle.is_closed());
    }
}
