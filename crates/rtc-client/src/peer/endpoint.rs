//! Peer endpoint seam
//!
//! [`PeerEndpoint`] abstracts one WebRTC peer connection behind the small
//! set of operations negotiation needs: produce/accept SDP, feed ICE
//! candidates, bind outgoing tracks, and surface endpoint events. The
//! production implementation is [`RtcPeerEndpoint`] over webrtc-rs; tests
//! substitute scripted endpoints.

use crate::media::{TrackHandle, TrackKind};
use crate::signaling::{IceCandidate, SessionDescription};
use crate::{Error, Result, SessionConfig};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Transport-level state of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Created, not yet negotiating
    New,
    /// ICE/DTLS in progress
    Connecting,
    /// Media flows
    Connected,
    /// Transient connectivity loss
    Disconnected,
    /// Negotiation or transport failed
    Failed,
    /// Closed; terminal
    Closed,
}

/// A media track received from the remote peer
pub trait RemoteTrack: Send + Sync {
    /// Track id as announced by the remote
    fn id(&self) -> String;

    /// Audio or video
    fn kind(&self) -> TrackKind;
}

/// Events surfaced by an endpoint
pub enum EndpointEvent {
    /// A locally gathered ICE candidate to relay to the remote peer
    IceCandidate(IceCandidate),
    /// Transport state changed
    StateChanged(EndpointState),
    /// The remote peer added a media track
    TrackReceived(Arc<dyn RemoteTrack>),
}

impl std::fmt::Debug for EndpointEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IceCandidate(_) => write!(f, "IceCandidate"),
            Self::StateChanged(s) => write!(f, "StateChanged({:?})", s),
            Self::TrackReceived(t) => write!(f, "TrackReceived({})", t.id()),
        }
    }
}

/// One WebRTC peer connection, seen from negotiation's side
#[async_trait]
pub trait PeerEndpoint: Send + Sync {
    /// Create a local offer and install it as the local description
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Install a remote offer and produce the local answer
    async fn accept_offer(&self, offer: SessionDescription) -> Result<SessionDescription>;

    /// Install the remote answer to our earlier offer
    async fn accept_answer(&self, answer: SessionDescription) -> Result<()>;

    /// Whether a remote description has been installed yet
    async fn has_remote_description(&self) -> bool;

    /// Apply a remote ICE candidate. Callers must only invoke this after
    /// the remote description is installed.
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Bind (or replace, or remove) the outgoing track of the given kind
    async fn set_outgoing_track(&self, kind: TrackKind, track: Option<TrackHandle>) -> Result<()>;

    /// Take the event stream. Yields `None` after the first call.
    fn take_events(&self) -> Option<mpsc::Receiver<EndpointEvent>>;

    /// Close the endpoint. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Creates endpoints for new peer links
#[async_trait]
pub trait PeerEndpointFactory: Send + Sync {
    /// Create a fresh endpoint for the given remote peer
    async fn create(&self, peer_id: &str, config: &SessionConfig) -> Result<Arc<dyn PeerEndpoint>>;
}

/// A remote track backed by webrtc-rs
pub struct RtcRemoteTrack {
    inner: Arc<TrackRemote>,
}

impl RemoteTrack for RtcRemoteTrack {
    fn id(&self) -> String {
        self.inner.id()
    }

    fn kind(&self) -> TrackKind {
        if self.inner.codec().capability.mime_type.starts_with("audio/") {
            TrackKind::Audio
        } else {
            TrackKind::Video
        }
    }
}

impl RtcRemoteTrack {
    /// The underlying webrtc-rs track, for RTP consumers
    pub fn remote(&self) -> &Arc<TrackRemote> {
        &self.inner
    }
}

/// Production endpoint over webrtc-rs
pub struct RtcPeerEndpoint {
    peer_id: String,
    pc: Arc<RTCPeerConnection>,
    audio_sender: RwLock<Option<Arc<RTCRtpSender>>>,
    video_sender: RwLock<Option<Arc<RTCRtpSender>>>,
    events_rx: parking_lot::Mutex<Option<mpsc::Receiver<EndpointEvent>>>,
}

impl RtcPeerEndpoint {
    /// Build a peer connection with default codecs and interceptors, wire
    /// its callbacks into an event stream, and wrap it.
    pub async fn new(peer_id: &str, config: &SessionConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::PeerConnectionError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry = register_default_interceptors(Default::default(), &mut media_engine)
            .map_err(|e| {
                Error::PeerConnectionError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers = vec![RTCIceServer {
            urls: config.stun_servers.clone(),
            ..Default::default()
        }];

        let pc = Arc::new(
            api.new_peer_connection(RTCConfiguration {
                ice_servers,
                ..Default::default()
            })
            .await
            .map_err(|e| {
                Error::PeerConnectionError(format!("Failed to create peer connection: {}", e))
            })?,
        );

        let (events_tx, events_rx) = mpsc::channel::<EndpointEvent>(config.send_queue_depth);

        let candidate_tx = events_tx.clone();
        let candidate_peer = peer_id.to_string();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let candidate_tx = candidate_tx.clone();
            let peer_id = candidate_peer.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!("ICE gathering complete for peer {}", peer_id);
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let event = EndpointEvent::IceCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                        });
                        let _ = candidate_tx.send(event).await;
                    }
                    Err(e) => warn!("Failed to serialize ICE candidate: {}", e),
                }
            })
        }));

        let state_tx = events_tx.clone();
        let state_peer = peer_id.to_string();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let state_tx = state_tx.clone();
            let peer_id = state_peer.clone();
            Box::pin(async move {
                let state = match s {
                    RTCPeerConnectionState::New => EndpointState::New,
                    RTCPeerConnectionState::Connecting => EndpointState::Connecting,
                    RTCPeerConnectionState::Connected => EndpointState::Connected,
                    RTCPeerConnectionState::Disconnected => EndpointState::Disconnected,
                    RTCPeerConnectionState::Failed => EndpointState::Failed,
                    RTCPeerConnectionState::Closed => EndpointState::Closed,
                    _ => return,
                };
                debug!("Peer {} transport state: {:?}", peer_id, state);
                let _ = state_tx.send(EndpointEvent::StateChanged(state)).await;
            })
        }));

        let track_tx = events_tx;
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let track_tx = track_tx.clone();
            Box::pin(async move {
                let remote: Arc<dyn RemoteTrack> = Arc::new(RtcRemoteTrack { inner: track });
                let _ = track_tx.send(EndpointEvent::TrackReceived(remote)).await;
            })
        }));

        info!("Peer endpoint created for {}", peer_id);
        Ok(Self {
            peer_id: peer_id.to_string(),
            pc,
            audio_sender: RwLock::new(None),
            video_sender: RwLock::new(None),
            events_rx: parking_lot::Mutex::new(Some(events_rx)),
        })
    }
}

#[async_trait]
impl PeerEndpoint for RtcPeerEndpoint {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;
        let sdp = offer.sdp.clone();
        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local offer: {}", e)))?;
        debug!("Offer created for peer {}", self.peer_id);
        Ok(SessionDescription::offer(sdp))
    }

    async fn accept_offer(&self, offer: SessionDescription) -> Result<SessionDescription> {
        let remote = RTCSessionDescription::offer(offer.sdp)
            .map_err(|e| Error::SdpError(format!("Invalid remote offer: {}", e)))?;
        self.pc
            .set_remote_description(remote)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote offer: {}", e)))?;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;
        let sdp = answer.sdp.clone();
        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local answer: {}", e)))?;
        debug!("Answer created for peer {}", self.peer_id);
        Ok(SessionDescription::answer(sdp))
    }

    async fn accept_answer(&self, answer: SessionDescription) -> Result<()> {
        let remote = RTCSessionDescription::answer(answer.sdp)
            .map_err(|e| Error::SdpError(format!("Invalid remote answer: {}", e)))?;
        self.pc
            .set_remote_description(remote)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote answer: {}", e)))?;
        debug!("Answer accepted from peer {}", self.peer_id);
        Ok(())
    }

    async fn has_remote_description(&self) -> bool {
        self.pc.remote_description().await.is_some()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            ..Default::default()
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::IceCandidateError(format!("Failed to add candidate: {}", e)))
    }

    async fn set_outgoing_track(&self, kind: TrackKind, track: Option<TrackHandle>) -> Result<()> {
        let rtc_track = match &track {
            Some(t) => {
                let Some(local) = t.rtc_track() else {
                    return Err(Error::MediaTrackError(format!(
                        "track {} has no RTP backing",
                        t.id()
                    )));
                };
                Some(local)
            }
            None => None,
        };

        let sender_slot = match kind {
            TrackKind::Audio => &self.audio_sender,
            TrackKind::Video => &self.video_sender,
        };

        let existing = sender_slot.read().await.clone();
        match (existing, rtc_track) {
            // Replace the track inside the live sender. Keeps the
            // negotiated m-line, so no renegotiation is needed.
            (Some(sender), rtc_track) => {
                sender
                    .replace_track(rtc_track)
                    .await
                    .map_err(|e| Error::MediaTrackError(format!("Failed to replace track: {}", e)))?;
                debug!("Replaced {:?} track for peer {}", kind, self.peer_id);
            }
            (None, Some(rtc_track)) => {
                let sender = self
                    .pc
                    .add_track(rtc_track as Arc<dyn TrackLocal + Send + Sync>)
                    .await
                    .map_err(|e| Error::MediaTrackError(format!("Failed to add track: {}", e)))?;
                *sender_slot.write().await = Some(sender);
                debug!("Added {:?} track for peer {}", kind, self.peer_id);
            }
            (None, None) => {}
        }
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::Receiver<EndpointEvent>> {
        self.events_rx.lock().take()
    }

    async fn close(&self) -> Result<()> {
        self.pc
            .close()
            .await
            .map_err(|e| Error::PeerConnectionError(format!("Failed to close endpoint: {}", e)))?;
        info!("Peer endpoint closed for {}", self.peer_id);
        Ok(())
    }
}

/// Factory producing [`RtcPeerEndpoint`]s
#[derive(Debug, Default)]
pub struct RtcEndpointFactory;

impl RtcEndpointFactory {
    /// Create a new factory
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeerEndpointFactory for RtcEndpointFactory {
    async fn create(&self, peer_id: &str, config: &SessionConfig) -> Result<Arc<dyn PeerEndpoint>> {
        Ok(Arc::new(RtcPeerEndpoint::new(peer_id, config).await?))
    }
}
