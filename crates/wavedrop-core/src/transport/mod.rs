//! The peer-connection capability boundary.
//!
//! NAT traversal, encryption, and congestion control live inside an
//! underlying peer-connection implementation; this crate only consumes it
//! through the [`PeerTransport`] and [`DataChannel`] traits and a single
//! inbound [`TransportEvent`] queue. Two implementations are provided:
//!
//! - [`memory`] - an in-process loopback pair used by tests;
//! - [`webrtc`] - a real backend over the `webrtc` crate (behind the
//!   `webrtc-transport` feature).

pub mod memory;

#[cfg(feature = "webrtc-transport")]
pub mod webrtc;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::codec::Frame;
use crate::error::Result;

/// Which half of a description exchange a description belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// The initiating half, produced by the sender.
    Offer,
    /// The responding half, produced by the receiver.
    Answer,
}

/// A connection description (offer or answer) as exchanged via the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    #[serde(rename = "type")]
    pub kind: SdpKind,
    /// The opaque description payload (SDP)
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer description.
    #[must_use]
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer description.
    #[must_use]
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// One discovered network path option, exchanged during connection setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// The candidate line
    pub candidate: String,
    /// Media stream identification tag
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Media description index
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidate {
    /// Canonical serialization used as the de-duplication key.
    ///
    /// Structural equality on this string is the dedup boundary: a
    /// semantically-equal but textually-different candidate gets a new key
    /// and is applied again, which the transport tolerates.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.candidate.clone())
    }
}

/// Transport-level signaling state, queried to decide whether a remote
/// answer may be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSignalingState {
    /// No exchange in progress, or the exchange has completed.
    Stable,
    /// A local offer has been applied; a remote answer is expected.
    HaveLocalOffer,
    /// A remote offer has been applied; a local answer is pending.
    HaveRemoteOffer,
    /// The connection is closed.
    Closed,
}

impl std::fmt::Display for TransportSignalingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stable => "stable",
            Self::HaveLocalOffer => "have-local-offer",
            Self::HaveRemoteOffer => "have-remote-offer",
            Self::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// Everything the transport reports back, delivered on one inbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A locally generated candidate, to be published via the relay.
    LocalCandidate(IceCandidate),
    /// The data channel is open; the transfer engine may take over.
    ChannelOpen,
    /// The data channel closed.
    ChannelClosed,
    /// The data channel reported a transport-level error.
    ChannelError(String),
    /// One inbound frame from the data channel.
    Frame(Frame),
}

/// Receiving half of a transport's event queue.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Sending half of a transport's event queue.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// An ordered, reliable byte channel to the remote peer.
#[allow(async_fn_in_trait)]
pub trait DataChannel: Send + Sync {
    /// Queue one frame for delivery.
    async fn send(&self, frame: Frame) -> Result<()>;

    /// Bytes queued on the local send buffer but not yet flushed to the
    /// network. The backpressure gate polls this.
    async fn buffered_amount(&self) -> u64;

    /// Close the channel.
    async fn close(&self);
}

/// The peer-connection capability consumed by the signaling session.
#[allow(async_fn_in_trait)]
pub trait PeerTransport: Send {
    /// The channel type this transport produces.
    type Channel: DataChannel + 'static;

    /// Create a local offer and apply it as the local description.
    async fn create_offer(&mut self) -> Result<SessionDescription>;

    /// Apply a remote offer and produce a local answer.
    async fn accept_offer(&mut self, offer: &SessionDescription) -> Result<SessionDescription>;

    /// Apply the remote answer.
    async fn apply_answer(&mut self, answer: &SessionDescription) -> Result<()>;

    /// Apply one remote candidate.
    ///
    /// Fails if the remote description has not been applied yet, or the
    /// candidate is malformed or stale.
    async fn add_candidate(&mut self, candidate: &IceCandidate) -> Result<()>;

    /// Current transport-level signaling state.
    fn signaling_state(&self) -> TransportSignalingState;

    /// The data channel, once it exists.
    fn channel(&self) -> Option<Arc<Self::Channel>>;

    /// Tear the connection down.
    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_key_is_structural() {
        let a = IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 192.0.2.1 54400 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        };
        let b = a.clone();
        assert_eq!(a.canonical_key(), b.canonical_key());

        let c = IceCandidate {
            sdp_mline_index: Some(1),
            ..a.clone()
        };
        assert_ne!(a.canonical_key(), c.canonical_key());
    }

    #[test]
    fn description_json_shape() {
        let offer = SessionDescription::offer("v=0\r\n");
        let json = serde_json::to_string(&offer).expect("serialize");
        assert!(json.contains("\"type\":\"offer\""));

        let parsed: SessionDescription = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, offer);
    }

    #[test]
    fn candidate_json_uses_wire_field_names() {
        let candidate = IceCandidate {
            candidate: "candidate:1".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        };
        let json = serde_json::to_string(&candidate).expect("serialize");
        assert!(json.contains("sdpMid"));
        assert!(json.contains("sdpMLineIndex"));
    }
}
