//! Frame decoding errors.

use thiserror::Error;

/// Why an inbound frame could not be turned into a [`ServerMessage`].
///
/// Frames that fail to parse are dropped by the receiver and never reach
/// subscription handlers.
///
/// [`ServerMessage`]: crate::ServerMessage
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame is not valid JSON
    #[error("Malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Frame is JSON but not an object
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// Frame has no string `type` discriminator
    #[error("Frame has no message type")]
    MissingType,

    /// Unknown type, or a payload that does not fit the type
    #[error("Unrecognized {kind} frame: {source}")]
    Unrecognized {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}
