//! Signaling: wire protocol, transport seam, and the persistent channel

pub mod channel;
pub mod protocol;
pub mod transport;

pub use channel::{ChannelEvent, ChannelState, SignalingChannel, SignalingHandle};
pub use protocol::{
    IceCandidate, ParticipantInfo, SdpKind, SessionDescription, SignalMessage,
};
pub use transport::{SignalingTransport, TransportLink, WebSocketTransport};
