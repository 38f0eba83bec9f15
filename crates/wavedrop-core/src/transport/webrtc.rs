//! WebRTC-backed transport, behind the `webrtc-transport` feature.
//!
//! Trickle signaling: descriptions are returned immediately and candidates
//! surface asynchronously as [`TransportEvent::LocalCandidate`], to be
//! published through the relay while the handshake is still in flight.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;

use crate::codec::Frame;
use crate::error::{Error, Result};

use super::{
    DataChannel, EventReceiver, EventSender, IceCandidate, PeerTransport, SessionDescription,
    TransportEvent, TransportSignalingState,
};

/// Label of the single data channel both sides use.
const CHANNEL_LABEL: &str = "fileTransfer";

/// One STUN or TURN server.
#[derive(Debug, Clone)]
pub struct IceServer {
    /// Server URLs (`stun:` or `turn:` schemes)
    pub urls: Vec<String>,
    /// TURN username, empty for STUN
    pub username: String,
    /// TURN credential, empty for STUN
    pub credential: String,
}

impl IceServer {
    /// A plain STUN server.
    #[must_use]
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: String::new(),
            credential: String::new(),
        }
    }
}

/// Public STUN fallback when no servers are configured.
#[must_use]
pub fn default_ice_servers() -> Vec<IceServer> {
    vec![IceServer::stun("stun:stun.l.google.com:19302")]
}

/// Peer transport over a real WebRTC peer connection.
pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    channel: Arc<std::sync::Mutex<Option<Arc<WebRtcChannel>>>>,
    events: EventSender,
}

/// Data channel backed by an `RTCDataChannel`.
pub struct WebRtcChannel {
    dc: Arc<RTCDataChannel>,
}

impl WebRtcTransport {
    /// Build a peer connection and its event queue.
    ///
    /// Works for both roles: the sender creates the data channel in
    /// [`PeerTransport::create_offer`], the receiver picks it up from the
    /// remote offer via `on_data_channel`.
    pub async fn new(ice_servers: Vec<IceServer>) -> Result<(Self, EventReceiver)> {
        let mut media = MediaEngine::default();
        let registry = register_default_interceptors(Registry::new(), &mut media)
            .map_err(|e| Error::Internal(format!("interceptor registry: {e}")))?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(
            api.new_peer_connection(RTCConfiguration {
                ice_servers: ice_servers
                    .into_iter()
                    .map(|s| RTCIceServer {
                        urls: s.urls,
                        username: s.username,
                        credential: s.credential,
                    })
                    .collect(),
                ..Default::default()
            })
            .await
            .map_err(|e| Error::Internal(format!("peer connection: {e}")))?,
        );

        let (events, events_rx) = mpsc::unbounded_channel();
        let channel: Arc<std::sync::Mutex<Option<Arc<WebRtcChannel>>>> =
            Arc::new(std::sync::Mutex::new(None));

        {
            let events = events.clone();
            pc.on_ice_candidate(Box::new(move |candidate| {
                let events = events.clone();
                Box::pin(async move {
                    let Some(candidate) = candidate else { return };
                    match candidate.to_json() {
                        Ok(init) => {
                            let _ = events.send(TransportEvent::LocalCandidate(IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                            }));
                        }
                        Err(e) => warn!(%e, "failed to serialize local candidate"),
                    }
                })
            }));
        }

        {
            let events = events.clone();
            pc.on_peer_connection_state_change(Box::new(move |state| {
                let events = events.clone();
                Box::pin(async move {
                    debug!(%state, "peer connection state changed");
                    if state == RTCPeerConnectionState::Failed {
                        let _ =
                            events.send(TransportEvent::ChannelError("connection failed".into()));
                    }
                })
            }));
        }

        {
            let events = events.clone();
            let channel = Arc::clone(&channel);
            pc.on_data_channel(Box::new(move |dc| {
                let events = events.clone();
                let channel = Arc::clone(&channel);
                Box::pin(async move {
                    attach_channel_handlers(&dc, &events);
                    if let Ok(mut slot) = channel.lock() {
                        *slot = Some(Arc::new(WebRtcChannel { dc }));
                    }
                })
            }));
        }

        Ok((
            Self {
                pc,
                channel,
                events,
            },
            events_rx,
        ))
    }
}

/// Wire `on_open`, `on_close`, `on_error`, and `on_message` into the event
/// queue.
fn attach_channel_handlers(dc: &Arc<RTCDataChannel>, events: &EventSender) {
    let tx = events.clone();
    dc.on_open(Box::new(move || {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(TransportEvent::ChannelOpen);
        })
    }));

    let tx = events.clone();
    dc.on_close(Box::new(move || {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(TransportEvent::ChannelClosed);
        })
    }));

    let tx = events.clone();
    dc.on_error(Box::new(move |err| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(TransportEvent::ChannelError(err.to_string()));
        })
    }));

    let tx = events.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let tx = tx.clone();
        Box::pin(async move {
            let frame = if msg.is_string {
                Frame::Text(String::from_utf8_lossy(&msg.data).into_owned())
            } else {
                Frame::Binary(msg.data.to_vec())
            };
            let _ = tx.send(TransportEvent::Frame(frame));
        })
    }));
}

impl PeerTransport for WebRtcTransport {
    type Channel = WebRtcChannel;

    async fn create_offer(&mut self) -> Result<SessionDescription> {
        let dc = self
            .pc
            .create_data_channel(
                CHANNEL_LABEL,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| Error::Internal(format!("data channel: {e}")))?;
        attach_channel_handlers(&dc, &self.events);
        if let Ok(mut slot) = self.channel.lock() {
            *slot = Some(Arc::new(WebRtcChannel { dc }));
        }

        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| Error::DescriptionFailed(e.to_string()))?;
        let sdp = offer.sdp.clone();
        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| Error::DescriptionFailed(e.to_string()))?;
        Ok(SessionDescription::offer(sdp))
    }

    async fn accept_offer(&mut self, offer: &SessionDescription) -> Result<SessionDescription> {
        let remote = RTCSessionDescription::offer(offer.sdp.clone())
            .map_err(|e| Error::DescriptionFailed(e.to_string()))?;
        self.pc
            .set_remote_description(remote)
            .await
            .map_err(|e| Error::DescriptionFailed(e.to_string()))?;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::DescriptionFailed(e.to_string()))?;
        let sdp = answer.sdp.clone();
        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| Error::DescriptionFailed(e.to_string()))?;
        Ok(SessionDescription::answer(sdp))
    }

    async fn apply_answer(&mut self, answer: &SessionDescription) -> Result<()> {
        let remote = RTCSessionDescription::answer(answer.sdp.clone())
            .map_err(|e| Error::DescriptionFailed(e.to_string()))?;
        self.pc
            .set_remote_description(remote)
            .await
            .map_err(|e| Error::DescriptionFailed(e.to_string()))
    }

    async fn add_candidate(&mut self, candidate: &IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::CandidateRejected(e.to_string()))
    }

    fn signaling_state(&self) -> TransportSignalingState {
        match self.pc.signaling_state() {
            RTCSignalingState::HaveLocalOffer | RTCSignalingState::HaveRemotePranswer => {
                TransportSignalingState::HaveLocalOffer
            }
            RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveLocalPranswer => {
                TransportSignalingState::HaveRemoteOffer
            }
            RTCSignalingState::Closed => TransportSignalingState::Closed,
            _ => TransportSignalingState::Stable,
        }
    }

    fn channel(&self) -> Option<Arc<Self::Channel>> {
        self.channel.lock().ok().and_then(|slot| slot.clone())
    }

    async fn close(&mut self) {
        if let Err(e) = self.pc.close().await {
            debug!(%e, "error closing peer connection");
        }
    }
}

impl DataChannel for WebRtcChannel {
    async fn send(&self, frame: Frame) -> Result<()> {
        match frame {
            Frame::Text(text) => self
                .dc
                .send_text(text)
                .await
                .map(|_| ())
                .map_err(|e| Error::ChannelError(e.to_string())),
            Frame::Binary(bytes) => self
                .dc
                .send(&Bytes::from(bytes))
                .await
                .map(|_| ())
                .map_err(|e| Error::ChannelError(e.to_string())),
        }
    }

    async fn buffered_amount(&self) -> u64 {
        self.dc.buffered_amount().await as u64
    }

    async fn close(&self) {
        if let Err(e) = self.dc.close().await {
            debug!(%e, "error closing data channel");
        }
    }
}
