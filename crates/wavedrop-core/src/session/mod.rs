//! Relay-side session records.
//!
//! A session is the rendezvous record both peers read and write through the
//! relay: the sender's offer and candidates, the receiver's answer and
//! candidates, the offered file's descriptor, and a coarse status. Records
//! are short-lived and disposable; the durable artifact is the transferred
//! file, never the session.

pub mod coordinator;
pub mod store;

pub use coordinator::{CoordinatorConfig, CreatedSession, SessionCoordinator, SessionEvent};
pub use store::{MemoryStore, SessionStore};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::transport::{IceCandidate, SessionDescription};

/// Which peer is talking to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The side offering a file.
    Sender,
    /// The side fetching it.
    Receiver,
}

impl Role {
    /// The other side.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Sender => Self::Receiver,
            Self::Receiver => Self::Sender,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sender => write!(f, "sender"),
            Self::Receiver => write!(f, "receiver"),
        }
    }
}

/// Coarse session status, advanced forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created; no answer yet.
    Waiting,
    /// The receiver has answered.
    Connected,
    /// The transfer finished.
    Complete,
}

impl SessionStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::Connected => 1,
            Self::Complete => 2,
        }
    }

    /// Whether moving to `next` goes forward. Backward transitions are
    /// dropped by the coordinator.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        next.rank() > self.rank()
    }
}

/// Descriptor of the offered file, shown to the receiver before transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// File name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Media type
    #[serde(rename = "type")]
    pub media_type: String,
}

/// The sender's half of the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderHalf {
    /// The sender's offer, set at creation and immutable after.
    pub offer: SessionDescription,
    /// Sender-side candidates, append-only.
    #[serde(default)]
    pub candidates: Vec<IceCandidate>,
}

/// The receiver's half of the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverHalf {
    /// The receiver's answer, write-once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<SessionDescription>,
    /// Receiver-side candidates, append-only.
    #[serde(default)]
    pub candidates: Vec<IceCandidate>,
}

/// One rendezvous record, keyed by its share token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The share token
    pub token: String,
    /// Creation time, milliseconds since the epoch
    pub created_at: i64,
    /// Expiry time, milliseconds since the epoch
    pub expires_at: i64,
    /// Coarse status
    pub status: SessionStatus,
    /// The offered file
    pub file: FileInfo,
    /// Sender half
    pub sender: SenderHalf,
    /// Receiver half
    #[serde(default)]
    pub receiver: ReceiverHalf,
}

impl Session {
    /// Build a fresh record in `Waiting` status.
    #[must_use]
    pub fn new(
        token: String,
        offer: SessionDescription,
        file: FileInfo,
        ttl: chrono::Duration,
    ) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            token,
            created_at: now,
            expires_at: now + ttl.num_milliseconds(),
            status: SessionStatus::Waiting,
            file,
            sender: SenderHalf {
                offer,
                candidates: Vec::new(),
            },
            receiver: ReceiverHalf::default(),
        }
    }

    /// Whether the record has passed its expiry time.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp_millis() >= self.expires_at
    }
}
