//! Peer connection orchestration
//!
//! [`PeerManager`] owns one [`PeerLink`] per remote participant and drives
//! the offer/answer exchange over the signaling channel. The offer direction
//! is asymmetric: the side already in the session offers to the newcomer,
//! so a joining client only ever answers.
//!
//! Failures are isolated per peer: a timed-out or failed negotiation tears
//! down that one link and surfaces a [`PeerEvent::NegotiationFailed`], while
//! every other link keeps running.

use super::endpoint::{EndpointEvent, EndpointState, PeerEndpointFactory, RemoteTrack};
use super::link::{NegotiationState, PeerLink};
use super::registry::PeerRegistry;
use crate::media::{TrackHandle, TrackKind};
use crate::signaling::{IceCandidate, SessionDescription, SignalMessage, SignalingHandle};
use crate::{Result, SessionConfig};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Events surfaced by the peer layer
pub enum PeerEvent {
    /// A remote peer's media track arrived
    TrackReceived {
        /// Remote peer
        peer_id: String,
        /// The received track
        track: Arc<dyn RemoteTrack>,
    },
    /// A peer's transport state changed
    StateChanged {
        /// Remote peer
        peer_id: String,
        /// New transport state
        state: EndpointState,
    },
    /// Negotiation with one peer failed; its link was torn down
    NegotiationFailed {
        /// Remote peer
        peer_id: String,
        /// What went wrong
        reason: String,
    },
    /// A peer link was closed and removed
    PeerClosed {
        /// Remote peer
        peer_id: String,
    },
}

impl std::fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TrackReceived { peer_id, .. } => write!(f, "TrackReceived({})", peer_id),
            Self::StateChanged { peer_id, state } => {
                write!(f, "StateChanged({}, {:?})", peer_id, state)
            }
            Self::NegotiationFailed { peer_id, reason } => {
                write!(f, "NegotiationFailed({}, {})", peer_id, reason)
            }
            Self::PeerClosed { peer_id } => write!(f, "PeerClosed({})", peer_id),
        }
    }
}

#[derive(Default, Clone)]
struct OutgoingTracks {
    audio: Option<TrackHandle>,
    video: Option<TrackHandle>,
}

/// Orchestrates all peer links for one session
pub struct PeerManager {
    config: SessionConfig,
    session_id: String,
    factory: Arc<dyn PeerEndpointFactory>,
    signaling: SignalingHandle,
    registry: Arc<PeerRegistry>,
    outgoing: Mutex<OutgoingTracks>,
    events_tx: mpsc::Sender<PeerEvent>,
    events_rx: parking_lot::Mutex<Option<mpsc::Receiver<PeerEvent>>>,
}

impl PeerManager {
    /// Create a manager bound to one session and signaling channel
    pub fn new(
        config: SessionConfig,
        session_id: String,
        factory: Arc<dyn PeerEndpointFactory>,
        signaling: SignalingHandle,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.send_queue_depth);
        Self {
            config,
            session_id,
            factory,
            signaling,
            registry: Arc::new(PeerRegistry::new()),
            outgoing: Mutex::new(OutgoingTracks::default()),
            events_tx,
            events_rx: parking_lot::Mutex::new(Some(events_rx)),
        }
    }

    /// Take the event stream. Yields `None` after the first call.
    pub fn take_events(&self) -> Option<mpsc::Receiver<PeerEvent>> {
        self.events_rx.lock().take()
    }

    /// Ids of currently linked peers
    pub async fn linked_peers(&self) -> Vec<String> {
        self.registry.peer_ids().await
    }

    /// Number of active links
    pub async fn link_count(&self) -> usize {
        self.registry.len().await
    }

    /// Where negotiation with one peer stands, if linked
    pub async fn negotiation_state(&self, peer_id: &str) -> Option<NegotiationState> {
        self.registry.get(peer_id).await.map(|link| link.state())
    }

    /// Offer a connection to a peer that just joined.
    ///
    /// Called on the side already in the session. A pre-existing link for
    /// the same peer means the peer rejoined; the stale link is replaced.
    pub async fn offer_to(self: &Arc<Self>, peer_id: &str) -> Result<()> {
        if let Some(stale) = self.registry.remove(peer_id).await {
            info!("Replacing stale link for rejoining peer {}", peer_id);
            if let Err(e) = stale.close().await {
                warn!("Failed to close stale link for {}: {}", peer_id, e);
            }
        }

        let link = self.create_link(peer_id).await?;
        let offer = match link.initiate().await {
            Ok(offer) => offer,
            Err(e) => {
                self.fail_link(peer_id, e.to_string()).await;
                return Err(e);
            }
        };

        self.signaling
            .send(&SignalMessage::WebrtcOffer {
                session_id: Some(self.session_id.clone()),
                target_id: Some(peer_id.to_string()),
                sender_id: None,
                offer,
            })
            .await?;

        self.spawn_negotiation_watchdog(&link);
        info!("Offer sent to peer {}", peer_id);
        Ok(())
    }

    /// Handle an inbound offer (we are the newcomer being offered to)
    pub async fn handle_offer(
        self: &Arc<Self>,
        sender_id: &str,
        offer: SessionDescription,
    ) -> Result<()> {
        if let Some(stale) = self.registry.remove(sender_id).await {
            info!("Replacing stale link for re-offering peer {}", sender_id);
            if let Err(e) = stale.close().await {
                warn!("Failed to close stale link for {}: {}", sender_id, e);
            }
        }

        let link = self.create_link(sender_id).await?;
        let answer = match link.answer_offer(offer).await {
            Ok(answer) => answer,
            Err(e) => {
                self.fail_link(sender_id, e.to_string()).await;
                return Err(e);
            }
        };

        self.signaling
            .send(&SignalMessage::WebrtcAnswer {
                session_id: Some(self.session_id.clone()),
                target_id: Some(sender_id.to_string()),
                sender_id: None,
                answer,
            })
            .await?;

        info!("Answered offer from peer {}", sender_id);
        Ok(())
    }

    /// Handle an inbound answer to our earlier offer.
    ///
    /// An answer from a peer we no longer track (for instance one that
    /// already timed out) is logged and dropped.
    pub async fn handle_answer(&self, sender_id: &str, answer: SessionDescription) -> Result<()> {
        let Some(link) = self.registry.get(sender_id).await else {
            debug!("Dropping answer from unknown peer {}", sender_id);
            return Ok(());
        };

        if let Err(e) = link.accept_answer(answer).await {
            self.fail_link(sender_id, e.to_string()).await;
            return Err(e);
        }
        info!("Negotiation with peer {} complete", sender_id);
        Ok(())
    }

    /// Handle an inbound ICE candidate. The link queues it if the remote
    /// description is not yet installed; a candidate for an unknown peer
    /// is dropped.
    pub async fn handle_candidate(&self, sender_id: &str, candidate: IceCandidate) -> Result<()> {
        let Some(link) = self.registry.get(sender_id).await else {
            debug!("Dropping candidate from unknown peer {}", sender_id);
            return Ok(());
        };
        link.handle_candidate(candidate).await
    }

    /// Close and remove the link for a peer that left. No-op if absent.
    pub async fn remove_peer(&self, peer_id: &str) {
        let Some(link) = self.registry.remove(peer_id).await else {
            return;
        };
        if let Err(e) = link.close().await {
            warn!("Failed to close link for departed peer {}: {}", peer_id, e);
        }
        info!("Peer {} removed", peer_id);
        self.emit(PeerEvent::PeerClosed {
            peer_id: peer_id.to_string(),
        })
        .await;
    }

    /// Rebind the outgoing tracks on every link and remember them for
    /// links created later. Uses in-place sender replacement, so an
    /// already-negotiated link needs no renegotiation.
    pub async fn set_outgoing_tracks(
        &self,
        audio: Option<TrackHandle>,
        video: Option<TrackHandle>,
    ) {
        *self.outgoing.lock().await = OutgoingTracks {
            audio: audio.clone(),
            video: video.clone(),
        };

        for peer_id in self.registry.peer_ids().await {
            let Some(link) = self.registry.get(&peer_id).await else {
                continue;
            };
            let endpoint = link.endpoint();
            if let Err(e) = endpoint
                .set_outgoing_track(TrackKind::Audio, audio.clone())
                .await
            {
                warn!("Failed to rebind audio for peer {}: {}", peer_id, e);
            }
            if let Err(e) = endpoint
                .set_outgoing_track(TrackKind::Video, video.clone())
                .await
            {
                warn!("Failed to rebind video for peer {}: {}", peer_id, e);
            }
        }
    }

    /// Close every link. Idempotent.
    pub async fn shutdown(&self) {
        let links = self.registry.drain().await;
        if links.is_empty() {
            return;
        }
        info!("Closing {} peer links", links.len());
        for link in links {
            if let Err(e) = link.close().await {
                warn!("Failed to close link for {}: {}", link.peer_id(), e);
            }
        }
    }

    async fn create_link(self: &Arc<Self>, peer_id: &str) -> Result<Arc<PeerLink>> {
        let endpoint = self.factory.create(peer_id, &self.config).await?;

        // Bind the current outgoing tracks before any SDP is produced so
        // the first offer/answer already carries our media sections.
        let outgoing = self.outgoing.lock().await.clone();
        if let Some(audio) = outgoing.audio {
            endpoint
                .set_outgoing_track(TrackKind::Audio, Some(audio))
                .await?;
        }
        if let Some(video) = outgoing.video {
            endpoint
                .set_outgoing_track(TrackKind::Video, Some(video))
                .await?;
        }

        let events = endpoint.take_events();
        let link = Arc::new(PeerLink::new(peer_id.to_string(), endpoint));
        self.registry.insert(Arc::clone(&link)).await?;

        if let Some(events) = events {
            self.spawn_event_pump(Arc::downgrade(&link), events);
        }
        Ok(link)
    }

    /// Forward endpoint events onto signaling (candidates) and the peer
    /// event stream (state, tracks). The pump holds its link weakly: once
    /// the link is gone (replaced by a rejoin, or removed) a stale
    /// endpoint's events must not touch its successor.
    fn spawn_event_pump(
        self: &Arc<Self>,
        link: Weak<PeerLink>,
        mut events: mpsc::Receiver<EndpointEvent>,
    ) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(link) = link.upgrade() else {
                    break;
                };
                let peer_id = link.peer_id().to_string();
                match event {
                    EndpointEvent::IceCandidate(candidate) => {
                        let msg = SignalMessage::WebrtcIceCandidate {
                            session_id: Some(manager.session_id.clone()),
                            target_id: Some(peer_id.clone()),
                            sender_id: None,
                            candidate,
                        };
                        if let Err(e) = manager.signaling.send(&msg).await {
                            warn!("Failed to relay candidate for {}: {}", peer_id, e);
                        }
                    }
                    EndpointEvent::StateChanged(state) => {
                        if state == EndpointState::Connected {
                            // Answering side never sees an answer; the
                            // transport coming up completes its exchange.
                            link.mark_negotiated();
                        }
                        manager
                            .emit(PeerEvent::StateChanged {
                                peer_id: peer_id.clone(),
                                state,
                            })
                            .await;
                        if state == EndpointState::Failed {
                            manager
                                .fail_link_if_current(&link, "transport failed".to_string())
                                .await;
                        }
                    }
                    EndpointEvent::TrackReceived(track) => {
                        manager
                            .emit(PeerEvent::TrackReceived {
                                peer_id: peer_id.clone(),
                                track,
                            })
                            .await;
                    }
                }
            }
            debug!("Endpoint event pump ended");
        });
    }

    /// Tear down one offered link if no answer lands within the configured
    /// timeout. Other links are unaffected, and so is any replacement link
    /// a rejoin installed under the same peer id in the meantime.
    fn spawn_negotiation_watchdog(self: &Arc<Self>, link: &Arc<PeerLink>) {
        let manager = Arc::clone(self);
        let link = Arc::clone(link);
        let timeout = Duration::from_secs(u64::from(self.config.negotiation_timeout_secs));
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if link.state() == NegotiationState::OfferSent {
                manager
                    .fail_link_if_current(&link, format!("no answer within {:?}", timeout))
                    .await;
            }
        });
    }

    /// Fail a link only if it is still the registered one for its peer.
    /// A stale link (already replaced or removed) is left alone.
    async fn fail_link_if_current(&self, link: &Arc<PeerLink>, reason: String) {
        let peer_id = link.peer_id().to_string();
        let current = self.registry.get(&peer_id).await;
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, link)) {
            self.fail_link(&peer_id, reason).await;
        }
    }

    async fn fail_link(&self, peer_id: &str, reason: String) {
        warn!("Negotiation with peer {} failed: {}", peer_id, reason);
        if let Some(link) = self.registry.remove(peer_id).await {
            link.mark_failed();
            if let Err(e) = link.close().await {
                warn!("Failed to close failed link for {}: {}", peer_id, e);
            }
        }
        self.emit(PeerEvent::NegotiationFailed {
            peer_id: peer_id.to_string(),
            reason,
        })
        .await;
    }

    async fn emit(&self, event: PeerEvent) {
        if self.events_tx.send(event).await.is_err() {
            debug!("Peer event dropped: consumer gone");
        }
    }
}
