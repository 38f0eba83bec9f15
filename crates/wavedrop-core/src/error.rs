//! Error types for Wavedrop.
//!
//! This module provides a unified error type for all Wavedrop operations,
//! with specific error variants for different failure modes.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for Wavedrop operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Wavedrop.
#[derive(Error, Debug)]
pub enum Error {
    /// A description was applied in a signaling state that forbids it
    #[error("cannot apply {operation} in signaling state {state}")]
    InvalidSignalingState {
        /// The operation that was attempted
        operation: &'static str,
        /// The signaling state at the time
        state: String,
    },

    /// The transport refused a session description
    #[error("failed to apply session description: {0}")]
    DescriptionFailed(String),

    /// A network-reachability candidate could not be applied.
    ///
    /// Always recovered at the signaling layer; surfaced only by the
    /// transport so the caller can decide to swallow it.
    #[error("candidate rejected: {0}")]
    CandidateRejected(String),

    /// Transfer cancelled by the local user
    #[error("transfer cancelled")]
    Cancelled,

    /// Transfer cancelled by the remote peer
    #[error("transfer cancelled by peer")]
    CancelledByPeer,

    /// No completion signal arrived within the watchdog window
    #[error("transfer timed out after {0} seconds")]
    TransferTimeout(u64),

    /// The data channel closed before the transfer completed
    #[error("connection closed unexpectedly after {received} bytes")]
    ChannelClosed {
        /// Bytes received before the channel closed
        received: u64,
    },

    /// An inbound control frame could not be decoded
    #[error("failed to decode control message: {0}")]
    DecodeFailure(String),

    /// The data channel reported a transport-level error
    #[error("data channel error: {0}")]
    ChannelError(String),

    /// The data channel is not open
    #[error("data channel not open")]
    ChannelNotOpen,

    /// Token not found on the relay
    #[error("token '{0}' not found")]
    TokenNotFound(String),

    /// Token has expired
    #[error("token has expired")]
    TokenExpired,

    /// Token fails the syntactic check
    #[error("invalid token format: {0}")]
    InvalidTokenFormat(String),

    /// Unique token generation gave up after too many collisions
    #[error("unable to generate a unique token after {0} attempts")]
    TokenGenerationExhausted(u32),

    /// The answer field was already written with a different value
    #[error("answer already submitted for this session")]
    AnswerAlreadySet,

    /// A session field was written by the wrong role
    #[error("{role} may not write {field}")]
    FieldNotOwned {
        /// The role that attempted the write
        role: &'static str,
        /// The field it tried to write
        field: &'static str,
    },

    /// File exceeds the configured transfer ceiling
    #[error("file is too large: {size} bytes (maximum {max})")]
    FileTooLarge {
        /// Size of the offered file
        size: u64,
        /// Configured ceiling
        max: u64,
    },

    /// Relay request failed
    #[error("relay error: {0}")]
    Relay(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns whether this error is a cancellation (local or peer).
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::CancelledByPeer)
    }

    /// Returns whether this error ends the current transfer but not the
    /// process.
    #[must_use]
    pub const fn is_transfer_terminal(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::CancelledByPeer
                | Self::TransferTimeout(_)
                | Self::ChannelClosed { .. }
                | Self::DecodeFailure(_)
                | Self::ChannelError(_)
        )
    }

    /// Returns a short human-readable message for terminal failures.
    ///
    /// Distinguishes cancellation by the local user from cancellation by
    /// the peer, expiry, connection failures, and transfer failures.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Cancelled => "Transfer cancelled.".to_string(),
            Self::CancelledByPeer => "Transfer cancelled by the other side.".to_string(),
            Self::TokenExpired => {
                "Token has expired. Please generate a new one.".to_string()
            }
            Self::TokenNotFound(_) | Self::InvalidTokenFormat(_) => {
                "Invalid or expired token.".to_string()
            }
            Self::ChannelClosed { .. }
            | Self::ChannelError(_)
            | Self::ChannelNotOpen
            | Self::Relay(_)
            | Self::DescriptionFailed(_)
            | Self::InvalidSignalingState { .. } => {
                "Failed to establish connection. Please try again.".to_string()
            }
            Self::FileTooLarge { max, .. } => {
                format!("File is too large. Maximum size is {max} bytes.")
            }
            _ => "File transfer failed. Please try again.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_flavours() {
        assert!(Error::Cancelled.is_cancellation());
        assert!(Error::CancelledByPeer.is_cancellation());
        assert!(!Error::TransferTimeout(600).is_cancellation());
    }

    #[test]
    fn user_messages_are_distinct() {
        let local = Error::Cancelled.user_message();
        let peer = Error::CancelledByPeer.user_message();
        let expired = Error::TokenExpired.user_message();
        let network = Error::ChannelError("dtls".into()).user_message();
        let failed = Error::DecodeFailure("bad json".into()).user_message();

        let set: std::collections::HashSet<_> =
            [&local, &peer, &expired, &network, &failed].into_iter().collect();
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn transfer_terminal_classification() {
        assert!(Error::DecodeFailure("x".into()).is_transfer_terminal());
        assert!(Error::ChannelClosed { received: 42 }.is_transfer_terminal());
        assert!(!Error::TokenExpired.is_transfer_terminal());
    }
}
