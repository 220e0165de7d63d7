//! Shared test doubles: an in-memory signaling relay with the production
//! routing rules (fan-out, targetId -> senderId rewriting), scripted peer
//! endpoints, and fake capture devices.

#![allow(dead_code)]

use async_trait::async_trait;
use liveclass_rtc::media::ScreenShareEnded;
use liveclass_rtc::peer::EndpointEvent;
use liveclass_rtc::signaling::TransportLink;
use liveclass_rtc::{
    EndpointState, Error, IceCandidate, MediaDevices, MediaStreamHandle, MediaTrack,
    ParticipantInfo, PeerEndpoint, PeerEndpointFactory, SessionConfig, SessionDescription,
    SignalMessage, SignalingTransport, TrackHandle, TrackKind,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Install the log subscriber for test output. Idempotent; later calls
/// are no-ops. Filter with `RUST_LOG` as usual.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A short config suitable for tests
pub fn test_config() -> SessionConfig {
    init_tracing();
    SessionConfig::new("ws://relay.test/ws").with_negotiation_timeout_secs(1)
}

/// Poll an async condition until it holds, panicking after two seconds
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Receive events until one matches the predicate, panicking after two
/// seconds
pub async fn wait_for_event<T, F>(events: &mut mpsc::Receiver<T>, what: &str, mut pred: F) -> T
where
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("event stream ended");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for event: {}", what))
}

/// A signaling channel over an in-memory pipe, with the far-side receiver
/// for asserting what went out on the wire. Inbound frames can be injected
/// through the returned sender.
pub async fn pipe_signaling() -> (
    liveclass_rtc::SignalingChannel,
    mpsc::Receiver<String>,
    mpsc::Sender<String>,
) {
    struct PipeTransport {
        ends: parking_lot::Mutex<Option<(mpsc::Receiver<String>, mpsc::Sender<String>)>>,
    }

    #[async_trait]
    impl SignalingTransport for PipeTransport {
        async fn connect(&self, _url: &str) -> liveclass_rtc::Result<TransportLink> {
            let (incoming, outgoing) = self.ends.lock().take().expect("single connect");
            Ok(TransportLink { outgoing, incoming })
        }
    }

    let (out_tx, out_rx) = mpsc::channel(64);
    let (in_tx, in_rx) = mpsc::channel(64);
    let transport = PipeTransport {
        ends: parking_lot::Mutex::new(Some((in_rx, out_tx))),
    };
    let channel = liveclass_rtc::SignalingChannel::connect(&transport, "ws://pipe", 64)
        .await
        .expect("pipe connect");
    (channel, out_rx, in_tx)
}

// ---------------------------------------------------------------------------
// In-memory relay
// ---------------------------------------------------------------------------

struct RelayClient {
    user_name: String,
    user_role: String,
    to_client: mpsc::Sender<String>,
    kill: mpsc::Sender<()>,
}

#[derive(Default)]
struct RelayState {
    clients: HashMap<String, RelayClient>,
}

/// In-memory signaling relay.
///
/// Speaks the production protocol: `join-session` registers the client and
/// broadcasts `user-joined` plus a roster update, peer-addressed messages
/// are routed by `targetId` with `senderId` substituted, chat and media
/// state fan out to everyone else.
#[derive(Clone, Default)]
pub struct FakeRelay {
    state: Arc<parking_lot::Mutex<RelayState>>,
}

impl FakeRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that connects to this relay
    pub fn transport(&self) -> Arc<dyn SignalingTransport> {
        Arc::new(RelayTransport {
            relay: self.clone(),
        })
    }

    /// Currently joined user ids
    pub fn joined_users(&self) -> Vec<String> {
        self.state.lock().clients.keys().cloned().collect()
    }

    /// Wait until the relay has processed a client's `join-session`.
    ///
    /// Registration happens on the connection task, so `join()` returning
    /// does not mean the relay can route to the new client yet; frames
    /// sent before registration would reach nobody.
    pub async fn wait_for_join(&self, user_id: &str) {
        let relay = self.clone();
        let user_id = user_id.to_string();
        eventually(&format!("relay registers {}", user_id), move || {
            let relay = relay.clone();
            let user_id = user_id.clone();
            async move { relay.joined_users().contains(&user_id) }
        })
        .await;
    }

    /// Sever one client's connection without a leave, as a relay crash or
    /// network drop would
    pub fn disconnect(&self, user_id: &str) {
        let removed = self.state.lock().clients.remove(user_id);
        if let Some(client) = removed {
            // Tells the connection task to drop its inbound sender, which
            // ends the client's incoming stream.
            let _ = client.kill.try_send(());
            self.broadcast_user_left(user_id, &client.user_name);
            self.broadcast_roster();
        }
    }

    fn broadcast_user_left(&self, user_id: &str, user_name: &str) {
        let msg = SignalMessage::UserLeft {
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
        };
        self.broadcast_except(user_id, &msg);
    }

    fn broadcast_except(&self, skip_user: &str, msg: &SignalMessage) {
        let frame = msg.to_json().expect("relay frame");
        let state = self.state.lock();
        for (user_id, client) in &state.clients {
            if user_id != skip_user {
                let _ = client.to_client.try_send(frame.clone());
            }
        }
    }

    fn send_to(&self, user_id: &str, msg: &SignalMessage) {
        let frame = msg.to_json().expect("relay frame");
        if let Some(client) = self.state.lock().clients.get(user_id) {
            let _ = client.to_client.try_send(frame);
        }
    }

    fn roster(&self) -> Vec<ParticipantInfo> {
        self.state
            .lock()
            .clients
            .iter()
            .map(|(user_id, client)| ParticipantInfo {
                user_id: user_id.clone(),
                user_name: client.user_name.clone(),
                user_role: client.user_role.clone(),
                is_host: false,
                is_muted: false,
                has_video: false,
                is_screen_sharing: false,
            })
            .collect()
    }

    fn broadcast_roster(&self) {
        let msg = SignalMessage::ParticipantsUpdate {
            participants: self.roster(),
        };
        let frame = msg.to_json().expect("relay frame");
        let state = self.state.lock();
        for client in state.clients.values() {
            let _ = client.to_client.try_send(frame.clone());
        }
    }
}

struct RelayTransport {
    relay: FakeRelay,
}

#[async_trait]
impl SignalingTransport for RelayTransport {
    async fn connect(&self, _url: &str) -> liveclass_rtc::Result<TransportLink> {
        let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
        let (in_tx, in_rx) = mpsc::channel::<String>(64);

        let relay = self.relay.clone();
        tokio::spawn(async move {
            let mut user_id: Option<String> = None;
            let mut in_tx = Some(in_tx);
            let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
            loop {
                tokio::select! {
                    frame = out_rx.recv() => {
                        let Some(frame) = frame else { break };
                        let Ok(msg) = SignalMessage::from_json(&frame) else {
                            continue;
                        };
                        relay.route(&mut user_id, &in_tx, &kill_tx, msg);
                    }
                    _ = kill_rx.recv() => {
                        // Severed by the test; the client sees its inbound
                        // stream end as it would on a network drop.
                        in_tx = None;
                    }
                }
            }
            // Connection dropped without a leave.
            if let Some(user_id) = user_id {
                let name = relay
                    .state
                    .lock()
                    .clients
                    .remove(&user_id)
                    .map(|c| c.user_name)
                    .unwrap_or_default();
                if !name.is_empty() {
                    relay.broadcast_user_left(&user_id, &name);
                    relay.broadcast_roster();
                }
            }
        });

        Ok(TransportLink {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

impl FakeRelay {
    fn route(
        &self,
        user_id: &mut Option<String>,
        in_tx: &Option<mpsc::Sender<String>>,
        kill: &mpsc::Sender<()>,
        msg: SignalMessage,
    ) {
        match msg {
            SignalMessage::JoinSession {
                user_id: joining,
                user_name,
                user_role,
                ..
            } => {
                let Some(in_tx) = in_tx else { return };
                let broadcast = SignalMessage::UserJoined {
                    user_id: joining.clone(),
                    user_name: user_name.clone(),
                    user_role: user_role.clone(),
                };
                self.broadcast_except(&joining, &broadcast);
                self.state.lock().clients.insert(
                    joining.clone(),
                    RelayClient {
                        user_name,
                        user_role,
                        to_client: in_tx.clone(),
                        kill: kill.clone(),
                    },
                );
                *user_id = Some(joining);
                self.broadcast_roster();
            }

            SignalMessage::LeaveSession { .. } => {
                if let Some(user_id) = user_id.take() {
                    let name = self
                        .state
                        .lock()
                        .clients
                        .remove(&user_id)
                        .map(|c| c.user_name)
                        .unwrap_or_default();
                    self.broadcast_user_left(&user_id, &name);
                    self.broadcast_roster();
                }
            }

            SignalMessage::WebrtcOffer {
                target_id, offer, ..
            } => {
                let (Some(sender), Some(target)) = (user_id.clone(), target_id) else {
                    return;
                };
                self.send_to(
                    &target,
                    &SignalMessage::WebrtcOffer {
                        session_id: None,
                        target_id: None,
                        sender_id: Some(sender),
                        offer,
                    },
                );
            }

            SignalMessage::WebrtcAnswer {
                target_id, answer, ..
            } => {
                let (Some(sender), Some(target)) = (user_id.clone(), target_id) else {
                    return;
                };
                self.send_to(
                    &target,
                    &SignalMessage::WebrtcAnswer {
                        session_id: None,
                        target_id: None,
                        sender_id: Some(sender),
                        answer,
                    },
                );
            }

            SignalMessage::WebrtcIceCandidate {
                target_id,
                candidate,
                ..
            } => {
                let (Some(sender), Some(target)) = (user_id.clone(), target_id) else {
                    return;
                };
                self.send_to(
                    &target,
                    &SignalMessage::WebrtcIceCandidate {
                        session_id: None,
                        target_id: None,
                        sender_id: Some(sender),
                        candidate,
                    },
                );
            }

            SignalMessage::ChatMessage { message, .. } => {
                let Some(sender) = user_id.clone() else {
                    return;
                };
                let sender_name = self
                    .state
                    .lock()
                    .clients
                    .get(&sender)
                    .map(|c| c.user_name.clone());
                self.broadcast_except(
                    &sender,
                    &SignalMessage::ChatMessage {
                        session_id: None,
                        sender_id: Some(sender.clone()),
                        sender_name,
                        message,
                    },
                );
            }

            SignalMessage::MediaStateChange {
                is_muted,
                has_video,
                is_screen_sharing,
                ..
            } => {
                let Some(sender) = user_id.clone() else {
                    return;
                };
                self.broadcast_except(
                    &sender,
                    &SignalMessage::MediaStateChanged {
                        user_id: sender.clone(),
                        is_muted,
                        has_video,
                        is_screen_sharing,
                    },
                );
            }

            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted peer endpoints
// ---------------------------------------------------------------------------

/// A peer endpoint that negotiates on paper: SDP is synthesized, candidates
/// and track bindings are recorded for inspection.
pub struct FakeEndpoint {
    pub peer_id: String,
    remote_set: AtomicBool,
    pub offers_created: AtomicUsize,
    pub offers_accepted: AtomicUsize,
    pub answers_accepted: AtomicUsize,
    pub candidates: parking_lot::Mutex<Vec<IceCandidate>>,
    pub track_binds: parking_lot::Mutex<Vec<(TrackKind, Option<String>)>>,
    pub closed: AtomicBool,
    fail_answers: AtomicBool,
    events_tx: mpsc::Sender<EndpointEvent>,
    events_rx: parking_lot::Mutex<Option<mpsc::Receiver<EndpointEvent>>>,
}

impl FakeEndpoint {
    fn new(peer_id: &str) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(64);
        Arc::new(Self {
            peer_id: peer_id.to_string(),
            remote_set: AtomicBool::new(false),
            offers_created: AtomicUsize::new(0),
            offers_accepted: AtomicUsize::new(0),
            answers_accepted: AtomicUsize::new(0),
            candidates: parking_lot::Mutex::new(Vec::new()),
            track_binds: parking_lot::Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            fail_answers: AtomicBool::new(false),
            events_tx,
            events_rx: parking_lot::Mutex::new(Some(events_rx)),
        })
    }

    /// Make `accept_answer` fail, to exercise negotiation-failure paths
    pub fn fail_answers(&self) {
        self.fail_answers.store(true, Ordering::SeqCst);
    }

    /// Inject a gathered ICE candidate, as the ICE agent would
    pub async fn emit_candidate(&self, candidate: IceCandidate) {
        let _ = self
            .events_tx
            .send(EndpointEvent::IceCandidate(candidate))
            .await;
    }

    /// Inject a transport state change
    pub async fn emit_state(&self, state: EndpointState) {
        let _ = self.events_tx.send(EndpointEvent::StateChanged(state)).await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Ids of tracks bound per kind, in call order
    pub fn bound_tracks(&self, kind: TrackKind) -> Vec<Option<String>> {
        self.track_binds
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| id.clone())
            .collect()
    }
}

#[async_trait]
impl PeerEndpoint for FakeEndpoint {
    async fn create_offer(&self) -> liveclass_rtc::Result<SessionDescription> {
        self.offers_created.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription::offer(format!(
            "v=0 offer-for-{}",
            self.peer_id
        )))
    }

    async fn accept_offer(
        &self,
        _offer: SessionDescription,
    ) -> liveclass_rtc::Result<SessionDescription> {
        self.offers_accepted.fetch_add(1, Ordering::SeqCst);
        self.remote_set.store(true, Ordering::SeqCst);
        Ok(SessionDescription::answer(format!(
            "v=0 answer-for-{}",
            self.peer_id
        )))
    }

    async fn accept_answer(&self, _answer: SessionDescription) -> liveclass_rtc::Result<()> {
        if self.fail_answers.load(Ordering::SeqCst) {
            return Err(Error::SdpError("scripted answer failure".to_string()));
        }
        self.answers_accepted.fetch_add(1, Ordering::SeqCst);
        self.remote_set.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn has_remote_description(&self) -> bool {
        self.remote_set.load(Ordering::SeqCst)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> liveclass_rtc::Result<()> {
        self.candidates.lock().push(candidate);
        Ok(())
    }

    async fn set_outgoing_track(
        &self,
        kind: TrackKind,
        track: Option<TrackHandle>,
    ) -> liveclass_rtc::Result<()> {
        self.track_binds
            .lock()
            .push((kind, track.map(|t| t.id().to_string())));
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::Receiver<EndpointEvent>> {
        self.events_rx.lock().take()
    }

    async fn close(&self) -> liveclass_rtc::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory that records every endpoint it creates
#[derive(Default)]
pub struct FakeEndpointFactory {
    endpoints: parking_lot::Mutex<Vec<Arc<FakeEndpoint>>>,
}

impl FakeEndpointFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every endpoint created so far, in creation order
    pub fn endpoints(&self) -> Vec<Arc<FakeEndpoint>> {
        self.endpoints.lock().clone()
    }

    /// The most recent endpoint created for a peer
    pub fn endpoint_for(&self, peer_id: &str) -> Option<Arc<FakeEndpoint>> {
        self.endpoints
            .lock()
            .iter()
            .rev()
            .find(|e| e.peer_id == peer_id)
            .cloned()
    }

    /// Total offers created across all endpoints
    pub fn total_offers_created(&self) -> usize {
        self.endpoints
            .lock()
            .iter()
            .map(|e| e.offers_created.load(Ordering::SeqCst))
            .sum()
    }
}

#[async_trait]
impl PeerEndpointFactory for FakeEndpointFactory {
    async fn create(
        &self,
        peer_id: &str,
        _config: &SessionConfig,
    ) -> liveclass_rtc::Result<Arc<dyn PeerEndpoint>> {
        let endpoint = FakeEndpoint::new(peer_id);
        self.endpoints.lock().push(Arc::clone(&endpoint));
        Ok(endpoint)
    }
}

// ---------------------------------------------------------------------------
// Fake capture devices
// ---------------------------------------------------------------------------

pub struct FakeTrack {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl FakeTrack {
    pub fn new(kind: TrackKind, label: &str) -> TrackHandle {
        Arc::new(Self {
            id: format!("{}-{}", label, uuid::Uuid::new_v4()),
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        })
    }
}

impl MediaTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }
    fn kind(&self) -> TrackKind {
        self.kind
    }
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Fake capture: hands out labeled tracks and exposes the screen-share
/// "sharing ended" trigger
#[derive(Default)]
pub struct FakeDevices {
    pub fail_user_media: AtomicBool,
    acquisitions: AtomicUsize,
    ended_tx: parking_lot::Mutex<Option<oneshot::Sender<()>>>,
}

impl FakeDevices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Total device acquisitions, user and display combined
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Simulate the OS-level "stop sharing" control
    pub fn end_screen_share(&self) {
        if let Some(tx) = self.ended_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn acquire_user_media(
        &self,
        audio: bool,
        video: bool,
    ) -> liveclass_rtc::Result<MediaStreamHandle> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        if self.fail_user_media.load(Ordering::SeqCst) {
            return Err(Error::DeviceError("permission denied".to_string()));
        }
        let mut tracks = Vec::new();
        if audio {
            tracks.push(FakeTrack::new(TrackKind::Audio, "mic"));
        }
        if video {
            tracks.push(FakeTrack::new(TrackKind::Video, "camera"));
        }
        Ok(MediaStreamHandle::new(tracks))
    }

    async fn acquire_display_media(
        &self,
    ) -> liveclass_rtc::Result<(MediaStreamHandle, ScreenShareEnded)> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        *self.ended_tx.lock() = Some(tx);
        Ok((
            MediaStreamHandle::new(vec![FakeTrack::new(TrackKind::Video, "screen")]),
            rx,
        ))
    }
}
