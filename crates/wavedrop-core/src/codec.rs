//! Wire framing for the peer data channel.
//!
//! A transfer runs over a single ordered, reliable channel that carries two
//! frame kinds:
//!
//! - **text frames**: small JSON control messages (`metadata`, `complete`,
//!   `cancel`);
//! - **binary frames**: one opaque payload chunk each, appended in order to
//!   the receiver's assembly buffer.
//!
//! ```text
//! text   {"type":"metadata","data":{"name":...,"size":...,...}}
//! binary <chunk bytes>
//! binary <chunk bytes>
//! ...
//! text   {"type":"complete"}
//! ```
//!
//! A text frame that is not valid JSON, or a `metadata` message missing
//! required fields, fails the transfer with a decode error. A well-formed
//! control message with an unknown `type` is ignored so newer peers can add
//! message kinds without breaking older ones.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One frame as it crosses the data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame carrying a JSON control message.
    Text(String),
    /// A binary frame carrying one payload chunk.
    Binary(Vec<u8>),
}

impl Frame {
    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Binary(b) => b.len(),
        }
    }
}

/// Descriptor sent as the first message of every transfer.
///
/// Immutable once sent; the receiver captures it before accepting any
/// binary chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMetadata {
    /// File name (no path components)
    pub name: String,
    /// Total size in bytes
    pub size: u64,
    /// Media type, e.g. `application/pdf`
    #[serde(rename = "type")]
    pub media_type: String,
    /// Number of chunks the sender will emit
    pub chunk_count: u64,
}

/// A control message exchanged over text frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Transfer descriptor, sent before the first chunk.
    Metadata {
        /// The descriptor itself
        data: TransferMetadata,
    },
    /// All chunks have been sent.
    Complete,
    /// The sending or receiving side aborted the transfer.
    Cancel,
}

/// One decoded inbound unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A recognized control message.
    Control(ControlMessage),
    /// One payload chunk.
    Chunk(Vec<u8>),
    /// A well-formed control message of an unknown kind; skip it.
    Ignored,
}

/// Encode a control message into a text frame.
pub fn encode_control(message: &ControlMessage) -> Result<Frame> {
    let json =
        serde_json::to_string(message).map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(Frame::Text(json))
}

/// Decode one inbound frame.
///
/// # Errors
///
/// Returns [`Error::DecodeFailure`] if a text frame is not valid JSON or a
/// known control message is missing required fields.
pub fn decode(frame: Frame) -> Result<Decoded> {
    match frame {
        Frame::Binary(chunk) => Ok(Decoded::Chunk(chunk)),
        Frame::Text(json) => {
            let value: serde_json::Value = serde_json::from_str(&json)
                .map_err(|e| Error::DecodeFailure(format!("control frame is not JSON: {e}")))?;

            let Some(kind) = value
                .get("type")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
            else {
                return Err(Error::DecodeFailure(
                    "control frame has no 'type' field".to_string(),
                ));
            };

            match kind.as_str() {
                "metadata" | "complete" | "cancel" => {
                    let message: ControlMessage = serde_json::from_value(value)
                        .map_err(|e| Error::DecodeFailure(format!("bad {kind} message: {e}")))?;
                    Ok(Decoded::Control(message))
                }
                other => {
                    tracing::debug!(kind = other, "ignoring unknown control message");
                    Ok(Decoded::Ignored)
                }
            }
        }
    }
}

/// Number of chunks needed to cover `size` bytes at `chunk_size`.
#[must_use]
pub const fn chunk_count(size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        0
    } else {
        size.div_ceil(chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_round_trip() {
        let metadata = ControlMessage::Metadata {
            data: TransferMetadata {
                name: "report.pdf".to_string(),
                size: 1_048_576,
                media_type: "application/pdf".to_string(),
                chunk_count: 32,
            },
        };

        let frame = encode_control(&metadata).expect("encode");
        let Frame::Text(json) = &frame else {
            panic!("control messages encode to text frames");
        };
        assert!(json.contains("\"type\":\"metadata\""));

        match decode(frame).expect("decode") {
            Decoded::Control(message) => assert_eq!(message, metadata),
            other => panic!("expected control, got {other:?}"),
        }
    }

    #[test]
    fn complete_and_cancel_round_trip() {
        for message in [ControlMessage::Complete, ControlMessage::Cancel] {
            let frame = encode_control(&message).expect("encode");
            assert_eq!(decode(frame).expect("decode"), Decoded::Control(message));
        }
    }

    #[test]
    fn binary_frames_are_chunks() {
        let bytes = vec![0xAB; 512];
        assert_eq!(
            decode(Frame::Binary(bytes.clone())).expect("decode"),
            Decoded::Chunk(bytes)
        );
    }

    #[test]
    fn unknown_control_kind_is_ignored() {
        let frame = Frame::Text(r#"{"type":"heartbeat","seq":7}"#.to_string());
        assert_eq!(decode(frame).expect("decode"), Decoded::Ignored);
    }

    #[test]
    fn broken_json_is_a_decode_failure() {
        let result = decode(Frame::Text("{not json".to_string()));
        assert!(matches!(result, Err(Error::DecodeFailure(_))));
    }

    #[test]
    fn metadata_missing_fields_is_a_decode_failure() {
        let frame = Frame::Text(r#"{"type":"metadata","data":{"name":"x"}}"#.to_string());
        assert!(matches!(decode(frame), Err(Error::DecodeFailure(_))));
    }

    #[test]
    fn chunk_count_covers_all_sizes() {
        assert_eq!(chunk_count(0, 32_768), 0);
        assert_eq!(chunk_count(1, 32_768), 1);
        assert_eq!(chunk_count(32_768, 32_768), 1);
        assert_eq!(chunk_count(32_769, 32_768), 2);
        assert_eq!(chunk_count(100 * 1024 * 1024, 32_768), 3200);
    }
}
