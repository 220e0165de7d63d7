//! Real-time session client: signaling, WebRTC peer orchestration, local
//! media control, and chat for multi-participant audio/video sessions.
//!
//! The crate connects to a signaling relay over WebSocket, maintains one
//! WebRTC peer connection per remote participant in a full mesh, and keeps
//! a session roster and an append-only chat history. The hosting
//! application drives a [`SessionCoordinator`] and observes everything
//! through its [`SessionEvent`] stream.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use liveclass_rtc::{
//!     LocalIdentity, RtcEndpointFactory, SessionConfig, SessionCoordinator,
//!     WebSocketTransport,
//! };
//!
//! # async fn run(devices: Arc<dyn liveclass_rtc::MediaDevices>) -> liveclass_rtc::Result<()> {
//! let config = SessionConfig::new("wss://relay.example.com/ws");
//! let identity = LocalIdentity::new("user-1", "Alice", "teacher");
//! let coordinator = SessionCoordinator::new(config, identity)?;
//!
//! let mut events = coordinator.take_events().expect("first take");
//! coordinator
//!     .join(
//!         "session-1",
//!         Arc::new(WebSocketTransport::new()),
//!         Arc::new(RtcEndpointFactory::new()),
//!         devices,
//!     )
//!     .await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;

pub use chat::{ChatChannel, ChatMessage, MessageKind};
pub use config::{LocalIdentity, SessionConfig};
pub use error::{Error, Result};
pub use media::{
    MediaController, MediaDevices, MediaEvent, MediaStateSnapshot, MediaStreamHandle, MediaTrack,
    TrackHandle, TrackKind,
};
pub use peer::{
    EndpointState, PeerEndpoint, PeerEndpointFactory, PeerEvent, PeerManager, RemoteTrack,
    RtcEndpointFactory,
};
pub use session::{Participant, SessionCoordinator, SessionEvent, SessionState};
pub use signaling::{
    ChannelEvent, ChannelState, IceCandidate, ParticipantInfo, SessionDescription,
    SignalMessage, SignalingChannel, SignalingHandle, SignalingTransport, WebSocketTransport,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the crate version
pub fn version() -> &'static str {
    VERSION
}
