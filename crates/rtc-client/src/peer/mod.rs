//! Peer connections: endpoint seam, per-peer negotiation, orchestration

pub mod endpoint;
pub mod link;
pub mod manager;
pub mod registry;

pub use endpoint::{
    EndpointEvent, EndpointState, PeerEndpoint, PeerEndpointFactory, RemoteTrack,
    RtcEndpointFactory, RtcPeerEndpoint, RtcRemoteTrack,
};
pub use link::{NegotiationState, PeerLink};
pub use manager::{PeerEvent, PeerManager};
pub use registry::PeerRegistry;
