// Licensed under the MIT License.

//! Frames typed events and request/response envelopes on a text channel with a
//! discriminating prefix.
//!
//! Every frame is one of:
//! - `EVENT:<json>` — a [`SharedEvent`] sent fire-and-forget.
//! - `REQUEST-RESPONSE:<json>` — a [`RequestResponseEnvelope`] carrying a `messageId`.

use serde::{Deserialize, Serialize};

use crate::error::{GatewaySyncError, Result};
use crate::model::SharedEvent;

const EVENT_PREFIX: &str = "EVENT:";
const REQUEST_RESPONSE_PREFIX: &str = "REQUEST-RESPONSE:";

/// Message id reserved for the initial, whole-index read request.
pub const MSG_ID_GATEWAY_ASSET_READ: &str = "GATEWAY-ASSET-READ";

/// Builds the reserved message id for the batch starting at `first_index`.
#[must_use]
pub fn batch_message_id(first_index: usize) -> String {
    format!("GATEWAY-ASSET-READ-{first_index}")
}

/// `true` if `message_id` is one of the ids reserved for the sync protocol and must
/// not be issued by the correlator's normal `send`.
#[must_use]
pub fn is_reserved_message_id(message_id: &str) -> bool {
    message_id == MSG_ID_GATEWAY_ASSET_READ
        || message_id
            .strip_prefix("GATEWAY-ASSET-READ-")
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

/// The envelope carried by a `REQUEST-RESPONSE:` frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestResponseEnvelope {
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub event: SharedEvent,
}

/// A single decoded channel frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Event(SharedEvent),
    RequestResponse(RequestResponseEnvelope),
}

/// Encodes a fire-and-forget [`SharedEvent`] as an `EVENT:` frame.
///
/// # Errors
/// Returns [`GatewaySyncError::ProtocolViolation`] if `event` cannot be serialized to
/// JSON (this should not happen for well-formed [`SharedEvent`] values).
pub fn encode_event(event: &SharedEvent) -> Result<String> {
    let json = serde_json::to_string(event).map_err(|err| GatewaySyncError::ProtocolViolation {
        reason: format!("failed to encode event: {err}"),
    })?;
    Ok(format!("{EVENT_PREFIX}{json}"))
}

/// Encodes a request or response as a `REQUEST-RESPONSE:` frame.
///
/// # Errors
/// Returns [`GatewaySyncError::ProtocolViolation`] if the envelope cannot be
/// serialized to JSON.
pub fn encode_request_response(envelope: &RequestResponseEnvelope) -> Result<String> {
    let json =
        serde_json::to_string(envelope).map_err(|err| GatewaySyncError::ProtocolViolation {
            reason: format!("failed to encode request/response: {err}"),
        })?;
    Ok(format!("{REQUEST_RESPONSE_PREFIX}{json}"))
}

/// Decodes one channel frame.
///
/// An `eventType` this build doesn't recognize still decodes successfully, as
/// [`SharedEvent::Unknown`] — it's the caller's concern to log and drop. Only a frame
/// with no recognized prefix, or JSON that fails to parse at all, is malformed.
///
/// # Errors
/// Returns [`GatewaySyncError::ProtocolViolation`] if the frame has neither a known
/// prefix nor valid JSON for that prefix's payload type.
pub fn decode(frame: &str) -> Result<Frame> {
    if let Some(json) = frame.strip_prefix(EVENT_PREFIX) {
        let event = serde_json::from_str(json).map_err(|err| GatewaySyncError::ProtocolViolation {
            reason: format!("malformed EVENT frame: {err}"),
        })?;
        return Ok(Frame::Event(event));
    }
    if let Some(json) = frame.strip_prefix(REQUEST_RESPONSE_PREFIX) {
        let envelope =
            serde_json::from_str(json).map_err(|err| GatewaySyncError::ProtocolViolation {
                reason: format!("malformed REQUEST-RESPONSE frame: {err}"),
            })?;
        return Ok(Frame::RequestResponse(envelope));
    }
    Err(GatewaySyncError::ProtocolViolation {
        reason: format!("unrecognized frame prefix in {frame:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttributeEvent, AttributeRef, EventSource};

    fn sample_attribute_event() -> SharedEvent {
        SharedEvent::Attribute(AttributeEvent {
            attribute_ref: AttributeRef::new("asset1", "temperature"),
            value: Some(serde_json::json!(21.5)),
            timestamp: 1_700_000_000_000,
            source: EventSource::Sensor,
            realm: "master".to_string(),
            parent_id: None,
        })
    }

    #[test]
    fn event_round_trips() {
        let event = sample_attribute_event();
        let frame = encode_event(&event).unwrap();
        assert!(frame.starts_with("EVENT:"));
        match decode(&frame).unwrap() {
            Frame::Event(decoded) => assert_eq!(decoded, event),
            Frame::RequestResponse(_) => panic!("expected an EVENT frame"),
        }
    }

    #[test]
    fn request_response_round_trips() {
        let envelope = RequestResponseEnvelope {
            message_id: MSG_ID_GATEWAY_ASSET_READ.to_string(),
            event: sample_attribute_event(),
        };
        let frame = encode_request_response(&envelope).unwrap();
        assert!(frame.starts_with("REQUEST-RESPONSE:"));
        match decode(&frame).unwrap() {
            Frame::RequestResponse(decoded) => assert_eq!(decoded, envelope),
            Frame::Event(_) => panic!("expected a REQUEST-RESPONSE frame"),
        }
    }

    #[test]
    fn unknown_prefix_is_protocol_violation() {
        let err = decode("SOMETHING-ELSE:{}").unwrap_err();
        assert!(matches!(err, GatewaySyncError::ProtocolViolation { .. }));
    }

    #[test]
    fn malformed_json_is_protocol_violation() {
        let err = decode("EVENT:{not json").unwrap_err();
        assert!(matches!(err, GatewaySyncError::ProtocolViolation { .. }));
    }

    #[test]
    fn unknown_discriminator_decodes_to_unknown_variant() {
        let frame = decode(r#"EVENT:{"eventType":"unknown-thing"}"#).unwrap();
        assert_eq!(frame, Frame::Event(SharedEvent::Unknown));
    }

    #[test]
    fn reserved_ids_are_recognized() {
        assert!(is_reserved_message_id(MSG_ID_GATEWAY_ASSET_READ));
        assert!(is_reserved_message_id(&batch_message_id(20)));
        assert!(!is_reserved_message_id("GATEWAY-ASSET-READ-"));
        assert!(!is_reserved_message_id("some-other-id"));
    }
}
