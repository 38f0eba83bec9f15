//! Wire types shared by the relay server and its client.
//!
//! Everything here is plain JSON over HTTP; descriptions and candidates
//! pass through as opaque payloads.

use serde::{Deserialize, Serialize};

use crate::session::{FileInfo, Role, SessionStatus};
use crate::transport::{IceCandidate, SessionDescription};

/// `POST /api/create` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    /// The sender's offer
    pub offer: SessionDescription,
    /// The offered file
    pub file: FileInfo,
}

/// `POST /api/create` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResponse {
    /// Always true on 2xx
    pub success: bool,
    /// The minted share token
    pub token: String,
    /// Expiry, milliseconds since the epoch
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,
}

/// `POST /api/validate` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    /// The token to check
    pub token: String,
}

/// What a receiver learns about a session before joining it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// The offered file
    pub file: FileInfo,
    /// The sender's offer
    pub offer: SessionDescription,
    /// Current status
    pub status: SessionStatus,
}

/// `POST /api/validate` response. Always 200; failures ride in `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateResponse {
    /// Whether the token is live
    pub valid: bool,
    /// Session details when valid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionSummary>,
    /// Human-readable reason when not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload of a `POST /api/signal` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SignalPayload {
    /// The receiver's answer.
    Answer {
        /// The answer description
        answer: SessionDescription,
    },
    /// One candidate from either side.
    Candidate {
        /// The candidate
        candidate: IceCandidate,
    },
}

/// `POST /api/signal` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRequest {
    /// The session token
    pub token: String,
    /// Who is submitting
    pub role: Role,
    /// What is being submitted
    #[serde(flatten)]
    pub payload: SignalPayload,
}

/// `POST /api/close` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseRequest {
    /// The session to delete
    pub token: String,
}

/// Generic success response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    /// Always true on 2xx
    pub success: bool,
}

/// `GET /api/listen` query string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenQuery {
    /// The session token
    pub token: String,
    /// The subscribing side
    pub role: Role,
}

/// `GET /api/cleanup` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResponse {
    /// Always true on 2xx
    pub success: bool,
    /// How many expired sessions were deleted
    pub deleted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_request_flattens_the_payload() {
        let request = SignalRequest {
            token: "mapleforest".to_string(),
            role: Role::Receiver,
            payload: SignalPayload::Answer {
                answer: SessionDescription::answer("v=0"),
            },
        };
        let json = serde_json::to_string(&request).expect("serialize");
        assert!(json.contains("\"kind\":\"answer\""));
        assert!(json.contains("\"role\":\"receiver\""));

        let parsed: SignalRequest = serde_json::from_str(&json).expect("parse");
        assert!(matches!(parsed.payload, SignalPayload::Answer { .. }));
    }

    #[test]
    fn candidate_signal_round_trips() {
        let json = r#"{
            "token": "mapleforest",
            "role": "sender",
            "kind": "candidate",
            "candidate": {"candidate": "candidate:1", "sdpMid": "0", "sdpMLineIndex": 0}
        }"#;
        let parsed: SignalRequest = serde_json::from_str(json).expect("parse");
        assert_eq!(parsed.role, Role::Sender);
        match parsed.payload {
            SignalPayload::Candidate { candidate } => {
                assert_eq!(candidate.sdp_mline_index, Some(0));
            }
            SignalPayload::Answer { .. } => panic!("wrong payload kind"),
        }
    }
}
