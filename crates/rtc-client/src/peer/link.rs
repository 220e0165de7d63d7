//! Per-peer negotiation state
//!
//! A [`PeerLink`] tracks one remote participant: its endpoint, where the
//! offer/answer exchange stands, and the remote ICE candidates that arrived
//! before the remote description was installed. Those early candidates are
//! queued and flushed once the description lands; applying them immediately
//! would be rejected by the endpoint and the candidate lost.

use super::endpoint::PeerEndpoint;
use crate::signaling::{IceCandidate, SessionDescription};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Where the offer/answer exchange with one peer stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Link created, no SDP exchanged
    Idle,
    /// We sent an offer and await the answer
    OfferSent,
    /// We answered the remote offer
    AnswerSent,
    /// Descriptions exchanged on both sides
    Negotiated,
    /// Negotiation failed; the link is being torn down
    Failed,
    /// Closed; terminal
    Closed,
}

/// One remote participant's connection
pub struct PeerLink {
    peer_id: String,
    endpoint: Arc<dyn PeerEndpoint>,
    state: parking_lot::RwLock<NegotiationState>,
    pending_candidates: Mutex<Vec<IceCandidate>>,
}

impl PeerLink {
    /// Wrap an endpoint for the given peer
    pub fn new(peer_id: String, endpoint: Arc<dyn PeerEndpoint>) -> Self {
        Self {
            peer_id,
            endpoint,
            state: parking_lot::RwLock::new(NegotiationState::Idle),
            pending_candidates: Mutex::new(Vec::new()),
        }
    }

    /// Remote peer id
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// The underlying endpoint
    pub fn endpoint(&self) -> &Arc<dyn PeerEndpoint> {
        &self.endpoint
    }

    /// Current negotiation state
    pub fn state(&self) -> NegotiationState {
        *self.state.read()
    }

    /// Start negotiation: create and return our offer.
    ///
    /// Only valid from `Idle`; a second initiation is a protocol error.
    pub async fn initiate(&self) -> Result<SessionDescription> {
        {
            let mut state = self.state.write();
            if *state != NegotiationState::Idle {
                return Err(Error::NegotiationError {
                    peer_id: self.peer_id.clone(),
                    message: format!("cannot offer from state {:?}", *state),
                });
            }
            *state = NegotiationState::OfferSent;
        }
        self.endpoint.create_offer().await
    }

    /// Accept a remote offer and return our answer. Flushes any candidates
    /// queued before the offer arrived.
    pub async fn answer_offer(&self, offer: SessionDescription) -> Result<SessionDescription> {
        let answer = self.endpoint.accept_offer(offer).await?;
        *self.state.write() = NegotiationState::AnswerSent;
        self.flush_pending_candidates().await;
        Ok(answer)
    }

    /// Accept the remote answer to our offer. Flushes queued candidates.
    pub async fn accept_answer(&self, answer: SessionDescription) -> Result<()> {
        if self.state() != NegotiationState::OfferSent {
            return Err(Error::NegotiationError {
                peer_id: self.peer_id.clone(),
                message: format!("unexpected answer in state {:?}", self.state()),
            });
        }
        self.endpoint.accept_answer(answer).await?;
        *self.state.write() = NegotiationState::Negotiated;
        self.flush_pending_candidates().await;
        Ok(())
    }

    /// Apply or queue a remote ICE candidate.
    ///
    /// Candidates that arrive before the remote description are held and
    /// flushed when it is installed, never dropped.
    pub async fn handle_candidate(&self, candidate: IceCandidate) -> Result<()> {
        // Holding the queue lock across the check closes the race with a
        // concurrent flush.
        let mut pending = self.pending_candidates.lock().await;
        if self.endpoint.has_remote_description().await {
            drop(pending);
            self.endpoint.add_ice_candidate(candidate).await
        } else {
            debug!(
                "Queueing early ICE candidate for peer {} ({} pending)",
                self.peer_id,
                pending.len() + 1
            );
            pending.push(candidate);
            Ok(())
        }
    }

    /// Number of queued candidates
    pub async fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.lock().await.len()
    }

    /// Mark this peer negotiated (both descriptions in place)
    pub fn mark_negotiated(&self) {
        let mut state = self.state.write();
        if *state == NegotiationState::AnswerSent {
            *state = NegotiationState::Negotiated;
        }
    }

    /// Mark this peer failed
    pub fn mark_failed(&self) {
        *self.state.write() = NegotiationState::Failed;
    }

    /// Close the link and its endpoint. Idempotent.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            if *state == NegotiationState::Closed {
                return Ok(());
            }
            *state = NegotiationState::Closed;
        }
        self.pending_candidates.lock().await.clear();
        self.endpoint.close().await
    }

    async fn flush_pending_candidates(&self) {
        let mut pending = self.pending_candidates.lock().await;
        if pending.is_empty() {
            return;
        }
        debug!(
            "Flushing {} queued ICE candidates for peer {}",
            pending.len(),
            self.peer_id
        );
        for candidate in pending.drain(..) {
            if let Err(e) = self.endpoint.add_ice_candidate(candidate).await {
                // One bad candidate does not doom the rest.
                warn!(
                    "Failed to apply queued candidate for peer {}: {}",
                    self.peer_id, e
                );
            }
        }
    }
}
