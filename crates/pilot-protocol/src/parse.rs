//! Parsing inbound text frames.

use crate::error::ProtocolError;
use crate::message::{RoutingIds, ServerEvent, ServerMessage};
use serde::Deserialize;
use serde_json::Value;

/// Parses one text frame into a typed message.
///
/// Routing ids and the event payload are both read from the same object.
///
/// # Errors
///
/// - `ProtocolError::Malformed` if the frame is not a JSON object
/// - `ProtocolError::MissingType` if there is no string `type` field
/// - `ProtocolError::Unrecognized` if the type is unknown or its payload
///   does not match
pub fn parse_frame(text: &str) -> Result<ServerMessage, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
    if !value.is_object() {
        return Err(ProtocolError::NotAnObject);
    }

    let kind = match value.get("type").and_then(Value::as_str) {
        Some(kind) => kind.to_string(),
        None => return Err(ProtocolError::MissingType),
    };

    let routing = RoutingIds::deserialize(&value).map_err(|source| ProtocolError::Unrecognized {
        kind: kind.clone(),
        source,
    })?;
    let event = ServerEvent::deserialize(value)
        .map_err(|source| ProtocolError::Unrecognized { kind, source })?;

    Ok(ServerMessage::new(routing, event))
}
