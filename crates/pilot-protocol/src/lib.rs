//! Pilot Protocol - Wire protocol for stream channels and the recordings API
//!
//! This crate provides the message types exchanged over stream channels
//! (WebSocket text frames) and the request/response bodies of the backend's
//! recordings REST API.

pub mod error;
pub mod message;
pub mod parse;
pub mod rest;

pub use error::ProtocolError;
pub use message::{ClientMessage, RoutingIds, ServerEvent, ServerMessage};
pub use parse::parse_frame;
pub use rest::{
    PlaybackControlRequest, PlaybackEnvelope, RecordingEnvelope, RecordingListEnvelope,
    StartRecordingRequest,
};
