//! In-process loopback transport.
//!
//! Connects two endpoints through unbounded queues, while keeping the real
//! backend's signaling discipline: candidates are rejected until the remote
//! description has been applied, and the channel only opens once both
//! descriptions and at least one remote candidate are in place. Tests drive
//! the full signaling and transfer paths against this.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::codec::Frame;
use crate::error::{Error, Result};

use super::{
    DataChannel, EventReceiver, EventSender, IceCandidate, PeerTransport, SdpKind,
    SessionDescription, TransportEvent, TransportSignalingState,
};

/// One endpoint of a loopback pair.
pub struct MemoryTransport {
    label: &'static str,
    local_events: EventSender,
    local_desc: Option<SessionDescription>,
    remote_desc: Option<SessionDescription>,
    remote_candidates: usize,
    closed: bool,
    announced_open: bool,
    channel: Arc<MemoryChannel>,
}

/// Loopback data channel. Delivery is immediate; the buffered amount is a
/// synthetic counter that tests can pin to simulate a congested send queue.
pub struct MemoryChannel {
    peer_events: EventSender,
    open: AtomicBool,
    closed: AtomicBool,
    buffered: Arc<AtomicU64>,
}

/// Create a connected pair of endpoints with their event queues.
#[must_use]
pub fn pair() -> ((MemoryTransport, EventReceiver), (MemoryTransport, EventReceiver)) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();

    let a = MemoryTransport::new("a", a_tx.clone(), b_tx.clone());
    let b = MemoryTransport::new("b", b_tx, a_tx);
    ((a, a_rx), (b, b_rx))
}

impl MemoryTransport {
    fn new(label: &'static str, local_events: EventSender, peer_events: EventSender) -> Self {
        Self {
            label,
            local_events,
            local_desc: None,
            remote_desc: None,
            remote_candidates: 0,
            closed: false,
            announced_open: false,
            channel: Arc::new(MemoryChannel {
                peer_events,
                open: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                buffered: Arc::new(AtomicU64::new(0)),
            }),
        }
    }

    /// Handle on the synthetic send-buffer counter, for backpressure tests.
    #[must_use]
    pub fn buffered_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.channel.buffered)
    }

    fn emit_local_candidate(&self, seq: u32) {
        let candidate = IceCandidate {
            candidate: format!(
                "candidate:{seq} 1 udp 2122260223 192.0.2.{seq} 54400 typ host generation 0 endpoint {}",
                self.label
            ),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        };
        let _ = self
            .local_events
            .send(TransportEvent::LocalCandidate(candidate));
    }

    fn maybe_open(&mut self) {
        if self.announced_open
            || self.closed
            || self.local_desc.is_none()
            || self.remote_desc.is_none()
            || self.remote_candidates == 0
        {
            return;
        }
        self.announced_open = true;
        self.channel.open.store(true, Ordering::SeqCst);
        let _ = self.local_events.send(TransportEvent::ChannelOpen);
    }
}

impl PeerTransport for MemoryTransport {
    type Channel = MemoryChannel;

    async fn create_offer(&mut self) -> Result<SessionDescription> {
        if self.closed {
            return Err(Error::InvalidSignalingState {
                operation: "create offer",
                state: TransportSignalingState::Closed.to_string(),
            });
        }
        let offer = SessionDescription::offer(format!("v=0 loopback offer from {}", self.label));
        self.local_desc = Some(offer.clone());
        self.emit_local_candidate(1);
        self.emit_local_candidate(2);
        Ok(offer)
    }

    async fn accept_offer(&mut self, offer: &SessionDescription) -> Result<SessionDescription> {
        if offer.kind != SdpKind::Offer {
            return Err(Error::DescriptionFailed(
                "remote description is not an offer".to_string(),
            ));
        }
        self.remote_desc = Some(offer.clone());
        let answer = SessionDescription::answer(format!("v=0 loopback answer from {}", self.label));
        self.local_desc = Some(answer.clone());
        self.emit_local_candidate(1);
        self.emit_local_candidate(2);
        self.maybe_open();
        Ok(answer)
    }

    async fn apply_answer(&mut self, answer: &SessionDescription) -> Result<()> {
        if answer.kind != SdpKind::Answer {
            return Err(Error::DescriptionFailed(
                "remote description is not an answer".to_string(),
            ));
        }
        if self.local_desc.is_none() {
            return Err(Error::DescriptionFailed(
                "no local offer to answer".to_string(),
            ));
        }
        self.remote_desc = Some(answer.clone());
        self.maybe_open();
        Ok(())
    }

    async fn add_candidate(&mut self, candidate: &IceCandidate) -> Result<()> {
        if self.remote_desc.is_none() {
            return Err(Error::CandidateRejected(
                "remote description not set".to_string(),
            ));
        }
        if candidate.candidate.contains("malformed") {
            return Err(Error::CandidateRejected(format!(
                "unparseable candidate: {}",
                candidate.candidate
            )));
        }
        self.remote_candidates += 1;
        self.maybe_open();
        Ok(())
    }

    fn signaling_state(&self) -> TransportSignalingState {
        if self.closed {
            TransportSignalingState::Closed
        } else {
            match (&self.local_desc, &self.remote_desc) {
                (Some(local), None) if local.kind == SdpKind::Offer => {
                    TransportSignalingState::HaveLocalOffer
                }
                (None, Some(_)) => TransportSignalingState::HaveRemoteOffer,
                _ => TransportSignalingState::Stable,
            }
        }
    }

    fn channel(&self) -> Option<Arc<Self::Channel>> {
        if self.announced_open {
            Some(Arc::clone(&self.channel))
        } else {
            None
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.channel.close().await;
    }
}

impl DataChannel for MemoryChannel {
    async fn send(&self, frame: Frame) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst) {
            return Err(Error::ChannelNotOpen);
        }
        self.peer_events
            .send(TransportEvent::Frame(frame))
            .map_err(|_| Error::ChannelError("peer endpoint went away".to_string()))
    }

    async fn buffered_amount(&self) -> u64 {
        self.buffered.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.open.store(false, Ordering::SeqCst);
        let _ = self.peer_events.send(TransportEvent::ChannelClosed);
    }
}
