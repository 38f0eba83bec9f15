//! Connection-establishment state machine.
//!
//! Wraps a [`PeerTransport`] and enforces the ordering rules the transport
//! itself only reports after the fact: remote candidates are buffered until
//! the remote description has been applied, duplicate candidates are applied
//! exactly once, and a re-delivered answer is a harmless no-op.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::transport::{
    IceCandidate, PeerTransport, SessionDescription, TransportSignalingState,
};

/// Where a signaling session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingPhase {
    /// Fresh session, no descriptions yet.
    New,
    /// Local offer created and applied; waiting for the remote answer.
    OfferCreated,
    /// Remote offer received; producing the local answer.
    AnswerPending,
    /// Both descriptions are in place; candidates flow freely.
    DescriptionExchanged,
    /// The data channel reported open.
    ChannelOpen,
    /// Torn down.
    Closed,
}

/// One side's signaling session.
pub struct SignalingSession<T: PeerTransport> {
    transport: T,
    phase: SignalingPhase,
    remote_description_applied: bool,
    pending: VecDeque<IceCandidate>,
    seen_keys: HashSet<String>,
    applied: u64,
}

impl<T: PeerTransport> SignalingSession<T> {
    /// Wrap a fresh transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            phase: SignalingPhase::New,
            remote_description_applied: false,
            pending: VecDeque::new(),
            seen_keys: HashSet::new(),
            applied: 0,
        }
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> SignalingPhase {
        self.phase
    }

    /// Number of remote candidates applied to the transport so far.
    #[must_use]
    pub fn applied_candidates(&self) -> u64 {
        self.applied
    }

    /// Number of remote candidates held back for the remote description.
    #[must_use]
    pub fn buffered_candidates(&self) -> usize {
        self.pending.len()
    }

    /// The data channel handle, once the transport has one.
    #[must_use]
    pub fn channel(&self) -> Option<Arc<T::Channel>> {
        self.transport.channel()
    }

    /// Sender side: create and apply the local offer.
    pub async fn create_offer(&mut self) -> Result<SessionDescription> {
        if self.phase != SignalingPhase::New {
            return Err(Error::InvalidSignalingState {
                operation: "create offer",
                state: self.transport.signaling_state().to_string(),
            });
        }
        let offer = self.transport.create_offer().await?;
        self.phase = SignalingPhase::OfferCreated;
        Ok(offer)
    }

    /// Receiver side: apply the remote offer and produce the local answer.
    ///
    /// Failure here is fatal to the session.
    pub async fn accept_offer(&mut self, offer: &SessionDescription) -> Result<SessionDescription> {
        if self.phase != SignalingPhase::New {
            return Err(Error::InvalidSignalingState {
                operation: "accept offer",
                state: self.transport.signaling_state().to_string(),
            });
        }
        self.phase = SignalingPhase::AnswerPending;
        let answer = match self.transport.accept_offer(offer).await {
            Ok(answer) => answer,
            Err(e) => {
                self.phase = SignalingPhase::Closed;
                return Err(e);
            }
        };
        self.remote_description_applied = true;
        self.phase = SignalingPhase::DescriptionExchanged;
        self.flush_pending().await;
        Ok(answer)
    }

    /// Sender side: apply the remote answer.
    ///
    /// Seeing the same answer again after it was applied is a no-op, since
    /// at-least-once relay delivery makes re-delivery routine. Applying an
    /// answer in any other unexpected transport state is an error, and a
    /// transport failure while applying is fatal.
    pub async fn apply_answer(&mut self, answer: &SessionDescription) -> Result<()> {
        match self.transport.signaling_state() {
            TransportSignalingState::HaveLocalOffer => {}
            TransportSignalingState::Stable if self.remote_description_applied => {
                debug!("answer re-delivered after exchange, ignoring");
                return Ok(());
            }
            state => {
                return Err(Error::InvalidSignalingState {
                    operation: "apply answer",
                    state: state.to_string(),
                });
            }
        }
        if let Err(e) = self.transport.apply_answer(answer).await {
            self.phase = SignalingPhase::Closed;
            return Err(e);
        }
        self.remote_description_applied = true;
        self.phase = SignalingPhase::DescriptionExchanged;
        self.flush_pending().await;
        Ok(())
    }

    /// Feed one remote candidate in.
    ///
    /// Duplicates (by canonical serialization) are skipped. Candidates that
    /// arrive before the remote description are buffered and applied later
    /// in arrival order. Individual application failures are swallowed: a
    /// session can complete on the candidates that did apply.
    pub async fn handle_remote_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        if self.phase == SignalingPhase::Closed {
            return Ok(());
        }
        let key = candidate.canonical_key();
        if !self.seen_keys.insert(key) {
            debug!("duplicate candidate skipped");
            return Ok(());
        }
        if self.remote_description_applied {
            self.apply_candidate(&candidate).await;
        } else {
            self.pending.push_back(candidate);
        }
        Ok(())
    }

    /// Record that the transport's data channel opened.
    pub fn note_channel_open(&mut self) {
        if self.phase != SignalingPhase::Closed {
            self.phase = SignalingPhase::ChannelOpen;
        }
    }

    /// Tear the session down.
    pub async fn close(&mut self) {
        if self.phase == SignalingPhase::Closed {
            return;
        }
        self.transport.close().await;
        self.phase = SignalingPhase::Closed;
    }

    async fn flush_pending(&mut self) {
        while let Some(candidate) = self.pending.pop_front() {
            self.apply_candidate(&candidate).await;
        }
    }

    async fn apply_candidate(&mut self, candidate: &IceCandidate) {
        match self.transport.add_candidate(candidate).await {
            Ok(()) => self.applied += 1,
            Err(e) => warn!(%e, "failed to apply remote candidate"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory;

    fn candidate(n: u32) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n} 1 udp 2122260223 198.51.100.{n} 50000 typ host"),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        }
    }

    #[tokio::test]
    async fn candidates_before_offer_are_buffered_then_flushed_in_order() {
        let ((mut offerer, _rx), (receiver, _receiver_rx)) = memory::pair();
        let offer = offerer.create_offer().await.unwrap();

        let mut session = SignalingSession::new(receiver);
        for n in 1..=3 {
            session.handle_remote_candidate(candidate(n)).await.unwrap();
        }
        assert_eq!(session.buffered_candidates(), 3);
        assert_eq!(session.applied_candidates(), 0);

        session.accept_offer(&offer).await.unwrap();
        assert_eq!(session.buffered_candidates(), 0);
        assert_eq!(session.applied_candidates(), 3);
        assert_eq!(session.phase(), SignalingPhase::DescriptionExchanged);
    }

    #[tokio::test]
    async fn duplicate_candidates_apply_once() {
        let ((mut offerer, _rx), (receiver, _peer_rx)) = memory::pair();
        let offer = offerer.create_offer().await.unwrap();

        let mut session = SignalingSession::new(receiver);
        session.accept_offer(&offer).await.unwrap();

        for _pass in 0..2 {
            for n in 1..=3 {
                session.handle_remote_candidate(candidate(n)).await.unwrap();
            }
        }
        assert_eq!(session.applied_candidates(), 3);
    }

    #[tokio::test]
    async fn redelivered_answer_is_a_no_op() {
        let ((sender, _sender_rx), (mut answerer, _rx)) = memory::pair();
        let mut session = SignalingSession::new(sender);
        let offer = session.create_offer().await.unwrap();
        assert_eq!(session.phase(), SignalingPhase::OfferCreated);

        let answer = answerer.accept_offer(&offer).await.unwrap();
        session.apply_answer(&answer).await.unwrap();
        assert_eq!(session.phase(), SignalingPhase::DescriptionExchanged);

        // The relay may deliver the same answer again.
        session.apply_answer(&answer).await.unwrap();
        assert_eq!(session.phase(), SignalingPhase::DescriptionExchanged);
    }

    #[tokio::test]
    async fn answer_without_offer_is_rejected() {
        let ((sender, _sender_rx), _peer) = memory::pair();
        let mut session = SignalingSession::new(sender);
        let answer = SessionDescription::answer("v=0 bogus");
        let err = session.apply_answer(&answer).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSignalingState { .. }));
    }

    #[tokio::test]
    async fn malformed_candidate_is_swallowed() {
        let ((mut offerer, _rx), (receiver, _peer_rx)) = memory::pair();
        let offer = offerer.create_offer().await.unwrap();

        let mut session = SignalingSession::new(receiver);
        session.accept_offer(&offer).await.unwrap();

        let bad = IceCandidate {
            candidate: "candidate:malformed".to_string(),
            sdp_mid: None,
            sdp_mline_index: None,
        };
        session.handle_remote_candidate(bad).await.unwrap();
        session.handle_remote_candidate(candidate(1)).await.unwrap();
        assert_eq!(session.applied_candidates(), 1);
    }
}
