//! Session coordination
//!
//! [`SessionCoordinator`] wires the signaling channel, the peer manager,
//! the media controller, and the chat into one session and runs the event
//! loop that routes between them. The hosting application drives it with
//! `join`/`leave` and the media/chat accessors, and observes everything
//! through the [`SessionEvent`] stream.
//!
//! Offer direction: on `user-joined` the side already in the session offers
//! to the newcomer. The joining client never initiates; it answers the
//! offers that arrive from everyone already present.

use super::events::{Participant, SessionEvent, SessionState};
use crate::chat::ChatChannel;
use crate::media::{MediaController, MediaDevices, MediaEvent};
use crate::peer::{PeerEndpointFactory, PeerEvent, PeerManager};
use crate::signaling::{
    ChannelEvent, ChannelState, SignalMessage, SignalingChannel, SignalingHandle,
    SignalingTransport,
};
use crate::{Error, LocalIdentity, Result, SessionConfig};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct SessionRuntime {
    channel: Arc<SignalingChannel>,
    signaling: SignalingHandle,
    session_id: String,
    peers: Arc<PeerManager>,
    media: Arc<MediaController>,
    chat: Arc<ChatChannel>,
    roster: Arc<parking_lot::RwLock<Vec<Participant>>>,
    event_loop: JoinHandle<()>,
}

/// Orchestrates one multi-participant session
pub struct SessionCoordinator {
    config: SessionConfig,
    identity: LocalIdentity,
    state: Arc<parking_lot::RwLock<SessionState>>,
    runtime: Mutex<Option<SessionRuntime>>,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: parking_lot::Mutex<Option<mpsc::Receiver<SessionEvent>>>,
}

impl SessionCoordinator {
    /// Create a coordinator for the given local identity.
    ///
    /// The configuration is validated up front.
    pub fn new(config: SessionConfig, identity: LocalIdentity) -> Result<Self> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::channel(config.send_queue_depth);
        Ok(Self {
            config,
            identity,
            state: Arc::new(parking_lot::RwLock::new(SessionState::NotJoined)),
            runtime: Mutex::new(None),
            events_tx,
            events_rx: parking_lot::Mutex::new(Some(events_rx)),
        })
    }

    /// Take the session event stream. Yields `None` after the first call.
    pub fn take_events(&self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.events_rx.lock().take()
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Snapshot of the current roster
    pub async fn roster(&self) -> Vec<Participant> {
        match self.runtime.lock().await.as_ref() {
            Some(rt) => rt.roster.read().clone(),
            None => Vec::new(),
        }
    }

    /// The media controller, once joined
    pub async fn media(&self) -> Option<Arc<MediaController>> {
        self.runtime.lock().await.as_ref().map(|rt| Arc::clone(&rt.media))
    }

    /// The chat channel, once joined
    pub async fn chat(&self) -> Option<Arc<ChatChannel>> {
        self.runtime.lock().await.as_ref().map(|rt| Arc::clone(&rt.chat))
    }

    /// Ids of currently connected peers
    pub async fn connected_peers(&self) -> Vec<String> {
        match self.runtime.lock().await.as_ref() {
            Some(rt) => rt.peers.linked_peers().await,
            None => Vec::new(),
        }
    }

    /// Join a session.
    ///
    /// Connects signaling, announces ourselves, and spawns the routing
    /// loop. Local media starts inert: no device is touched until the user
    /// first toggles audio or video, so nothing is ever transmitted before
    /// the user opts in. Peer connections form as offers arrive from the
    /// participants already present.
    pub async fn join(
        &self,
        session_id: &str,
        transport: Arc<dyn SignalingTransport>,
        endpoint_factory: Arc<dyn PeerEndpointFactory>,
        devices: Arc<dyn MediaDevices>,
    ) -> Result<()> {
        {
            let mut state = self.state.write();
            match *state {
                SessionState::NotJoined | SessionState::Left => {}
                other => {
                    return Err(Error::SessionError(format!(
                        "cannot join from state {:?}",
                        other
                    )));
                }
            }
            *state = SessionState::Joining;
        }
        self.emit(SessionEvent::StateChanged(SessionState::Joining))
            .await;

        let channel = match SignalingChannel::connect(
            transport.as_ref(),
            &self.config.signaling_url,
            self.config.send_queue_depth,
        )
        .await
        {
            Ok(channel) => Arc::new(channel),
            Err(e) => {
                *self.state.write() = SessionState::NotJoined;
                self.emit(SessionEvent::StateChanged(SessionState::NotJoined))
                    .await;
                return Err(e);
            }
        };

        let signaling = channel.handle();
        let channel_events = channel
            .take_events()
            .ok_or_else(|| Error::InternalError("channel events already taken".to_string()))?;

        let peers = Arc::new(PeerManager::new(
            self.config.clone(),
            session_id.to_string(),
            endpoint_factory,
            signaling.clone(),
        ));
        let peer_events = peers
            .take_events()
            .ok_or_else(|| Error::InternalError("peer events already taken".to_string()))?;

        let media = Arc::new(MediaController::new(devices, self.config.send_queue_depth));
        let media_events = media
            .take_events()
            .ok_or_else(|| Error::InternalError("media events already taken".to_string()))?;

        let chat = Arc::new(ChatChannel::new(
            signaling.clone(),
            session_id.to_string(),
            self.identity.user_id.clone(),
            self.identity.display_name.clone(),
        ));

        signaling
            .send(&SignalMessage::JoinSession {
                session_id: session_id.to_string(),
                user_id: self.identity.user_id.clone(),
                user_name: self.identity.display_name.clone(),
                user_role: self.identity.role.clone(),
            })
            .await?;

        let roster = Arc::new(parking_lot::RwLock::new(Vec::new()));
        let event_loop = spawn_event_loop(LoopContext {
            local_user_id: self.identity.user_id.clone(),
            session_id: session_id.to_string(),
            signaling: signaling.clone(),
            peers: Arc::clone(&peers),
            media: Arc::clone(&media),
            chat: Arc::clone(&chat),
            roster: Arc::clone(&roster),
            state: Arc::clone(&self.state),
            events_tx: self.events_tx.clone(),
            channel_events,
            media_events,
            peer_events,
        });

        *self.runtime.lock().await = Some(SessionRuntime {
            channel,
            signaling,
            session_id: session_id.to_string(),
            peers,
            media,
            chat,
            roster,
            event_loop,
        });

        *self.state.write() = SessionState::Joined;
        info!(
            "Joined session {} as {}",
            session_id, self.identity.user_id
        );
        self.emit(SessionEvent::StateChanged(SessionState::Joined))
            .await;
        Ok(())
    }

    /// Leave the session: announce, tear down every peer link, stop local
    /// capture, close signaling. Idempotent.
    pub async fn leave(&self) -> Result<()> {
        let Some(runtime) = self.runtime.lock().await.take() else {
            return Ok(());
        };

        info!("Leaving session {}", runtime.session_id);
        if let Err(e) = runtime
            .signaling
            .send(&SignalMessage::LeaveSession {
                session_id: runtime.session_id.clone(),
            })
            .await
        {
            warn!("Failed to announce leave: {}", e);
        }

        runtime.peers.shutdown().await;
        runtime.media.shutdown().await;
        runtime.channel.close();
        runtime.event_loop.abort();

        *self.state.write() = SessionState::Left;
        self.emit(SessionEvent::StateChanged(SessionState::Left))
            .await;
        Ok(())
    }

    async fn emit(&self, event: SessionEvent) {
        if self.events_tx.send(event).await.is_err() {
            debug!("Session event dropped: consumer gone");
        }
    }
}

struct LoopContext {
    local_user_id: String,
    session_id: String,
    signaling: SignalingHandle,
    peers: Arc<PeerManager>,
    media: Arc<MediaController>,
    chat: Arc<ChatChannel>,
    roster: Arc<parking_lot::RwLock<Vec<Participant>>>,
    state: Arc<parking_lot::RwLock<SessionState>>,
    events_tx: mpsc::Sender<SessionEvent>,
    channel_events: mpsc::Receiver<ChannelEvent>,
    media_events: mpsc::Receiver<MediaEvent>,
    peer_events: mpsc::Receiver<PeerEvent>,
}

fn spawn_event_loop(mut ctx: LoopContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = ctx.channel_events.recv() => {
                    match event {
                        Some(ChannelEvent::Message(msg)) => {
                            handle_signal(&ctx, msg).await;
                        }
                        Some(ChannelEvent::StateChanged(ChannelState::Closed)) | None => {
                            handle_signaling_loss(&ctx).await;
                            break;
                        }
                        Some(ChannelEvent::StateChanged(_)) => {}
                    }
                }
                event = ctx.media_events.recv() => {
                    let Some(event) = event else { continue };
                    handle_media_event(&ctx, event).await;
                }
                event = ctx.peer_events.recv() => {
                    let Some(event) = event else { continue };
                    handle_peer_event(&ctx, event).await;
                }
            }
        }
        debug!("Session event loop ended");
    })
}

async fn handle_signal(ctx: &LoopContext, msg: SignalMessage) {
    match msg {
        SignalMessage::UserJoined {
            user_id,
            user_name,
            user_role,
        } => {
            if user_id == ctx.local_user_id {
                return;
            }
            let participant = Participant {
                user_id: user_id.clone(),
                user_name: user_name.clone(),
                user_role,
                is_host: false,
                is_muted: false,
                has_video: false,
                is_screen_sharing: false,
            };
            {
                let mut roster = ctx.roster.write();
                if !roster.iter().any(|p| p.user_id == user_id) {
                    roster.push(participant.clone());
                }
            }

            let notice = ctx
                .chat
                .record_system(format!("{} joined the session", user_name));
            emit(ctx, SessionEvent::ChatReceived(notice)).await;
            emit(ctx, SessionEvent::ParticipantJoined(participant)).await;

            // We are already in the session, so we offer to the newcomer.
            if let Err(e) = ctx.peers.offer_to(&user_id).await {
                warn!("Failed to offer to joining peer {}: {}", user_id, e);
            }
        }

        SignalMessage::UserLeft { user_id, user_name } => {
            ctx.peers.remove_peer(&user_id).await;
            ctx.roster.write().retain(|p| p.user_id != user_id);

            let notice = ctx
                .chat
                .record_system(format!("{} left the session", user_name));
            emit(ctx, SessionEvent::ChatReceived(notice)).await;
            emit(
                ctx,
                SessionEvent::ParticipantLeft { user_id, user_name },
            )
            .await;
        }

        SignalMessage::ParticipantsUpdate { participants } => {
            let roster: Vec<Participant> =
                participants.into_iter().map(Participant::from).collect();
            *ctx.roster.write() = roster.clone();
            emit(ctx, SessionEvent::RosterUpdated(roster)).await;
        }

        SignalMessage::WebrtcOffer {
            sender_id, offer, ..
        } => {
            let Some(sender_id) = sender_id else {
                warn!("Dropping offer without sender");
                return;
            };
            if let Err(e) = ctx.peers.handle_offer(&sender_id, offer).await {
                warn!("Failed to answer offer from {}: {}", sender_id, e);
            }
        }

        SignalMessage::WebrtcAnswer {
            sender_id, answer, ..
        } => {
            let Some(sender_id) = sender_id else {
                warn!("Dropping answer without sender");
                return;
            };
            if let Err(e) = ctx.peers.handle_answer(&sender_id, answer).await {
                warn!("Failed to apply answer from {}: {}", sender_id, e);
            }
        }

        SignalMessage::WebrtcIceCandidate {
            sender_id,
            candidate,
            ..
        } => {
            let Some(sender_id) = sender_id else {
                warn!("Dropping candidate without sender");
                return;
            };
            if let Err(e) = ctx.peers.handle_candidate(&sender_id, candidate).await {
                warn!("Failed to apply candidate from {}: {}", sender_id, e);
            }
        }

        SignalMessage::ChatMessage {
            sender_id,
            sender_name,
            message,
            ..
        } => {
            if sender_id.as_deref() == Some(ctx.local_user_id.as_str()) {
                // Our copy was appended at send time.
                return;
            }
            let entry = ctx.chat.record_incoming(sender_id, sender_name, message);
            emit(ctx, SessionEvent::ChatReceived(entry)).await;
        }

        SignalMessage::MediaStateChanged {
            user_id,
            is_muted,
            has_video,
            is_screen_sharing,
        } => {
            {
                let mut roster = ctx.roster.write();
                if let Some(p) = roster.iter_mut().find(|p| p.user_id == user_id) {
                    p.is_muted = is_muted;
                    p.has_video = has_video;
                    p.is_screen_sharing = is_screen_sharing;
                }
            }
            emit(
                ctx,
                SessionEvent::RemoteMediaChanged {
                    user_id,
                    is_muted,
                    has_video,
                    is_screen_sharing,
                },
            )
            .await;
        }

        other => {
            debug!("Ignoring unexpected inbound {}", other.type_name());
        }
    }
}

async fn handle_media_event(ctx: &LoopContext, event: MediaEvent) {
    match event {
        MediaEvent::OutgoingTracksChanged { audio, video } => {
            ctx.peers.set_outgoing_tracks(audio, video).await;
            publish_media_state(ctx).await;
        }
        MediaEvent::StateChanged(_) => {
            // Mute and share flags travel over signaling only; the track
            // topology is untouched and no renegotiation happens.
            publish_media_state(ctx).await;
        }
        MediaEvent::DeviceError(message) => {
            emit(ctx, SessionEvent::MediaError(message)).await;
        }
    }
}

async fn publish_media_state(ctx: &LoopContext) {
    let snapshot = ctx.media.snapshot().await;
    let msg = SignalMessage::MediaStateChange {
        session_id: ctx.session_id.clone(),
        is_muted: !snapshot.audio_enabled,
        has_video: snapshot.video_enabled,
        is_screen_sharing: snapshot.screen_sharing,
    };
    if let Err(e) = ctx.signaling.send(&msg).await {
        warn!("Failed to publish media state: {}", e);
    }
    emit(ctx, SessionEvent::LocalMediaChanged(snapshot)).await;
}

async fn handle_peer_event(ctx: &LoopContext, event: PeerEvent) {
    match event {
        PeerEvent::TrackReceived { peer_id, track } => {
            emit(ctx, SessionEvent::RemoteTrack { peer_id, track }).await;
        }
        PeerEvent::StateChanged { peer_id, state } => {
            emit(ctx, SessionEvent::PeerStateChanged { peer_id, state }).await;
        }
        PeerEvent::NegotiationFailed { peer_id, reason } => {
            emit(
                ctx,
                SessionEvent::PeerNegotiationFailed { peer_id, reason },
            )
            .await;
        }
        PeerEvent::PeerClosed { peer_id } => {
            debug!("Peer {} closed", peer_id);
        }
    }
}

/// Signaling loss is terminal: tear everything down and mark the session
/// left. The hosting application must create a new session to rejoin.
async fn handle_signaling_loss(ctx: &LoopContext) {
    let active = matches!(
        *ctx.state.read(),
        SessionState::Joined | SessionState::Joining
    );
    if !active {
        return;
    }
    warn!("Signaling connection lost; session is over");
    ctx.peers.shutdown().await;
    ctx.media.shutdown().await;
    *ctx.state.write() = SessionState::Left;
    emit(ctx, SessionEvent::SignalingLost).await;
    emit(ctx, SessionEvent::StateChanged(SessionState::Left)).await;
}

async fn emit(ctx: &LoopContext, event: SessionEvent) {
    if ctx.events_tx.send(event).await.is_err() {
        debug!("Session event dropped: consumer gone");
    }
}
