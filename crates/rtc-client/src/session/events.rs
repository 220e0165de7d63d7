//! Session-level events and roster types

use crate::chat::ChatMessage;
use crate::media::MediaStateSnapshot;
use crate::peer::{EndpointState, RemoteTrack};
use crate::signaling::ParticipantInfo;
use std::sync::Arc;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not joined yet
    NotJoined,
    /// Join in progress
    Joining,
    /// In the session
    Joined,
    /// Left (voluntarily or after signaling loss); terminal
    Left,
}

/// A participant as tracked in the local roster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Stable user id
    pub user_id: String,
    /// Display name
    pub user_name: String,
    /// Application-defined role
    pub user_role: String,
    /// Whether this participant hosts the session
    pub is_host: bool,
    /// Published microphone state
    pub is_muted: bool,
    /// Published camera state
    pub has_video: bool,
    /// Published screen-share state
    pub is_screen_sharing: bool,
}

impl From<ParticipantInfo> for Participant {
    fn from(info: ParticipantInfo) -> Self {
        Self {
            user_id: info.user_id,
            user_name: info.user_name,
            user_role: info.user_role,
            is_host: info.is_host,
            is_muted: info.is_muted,
            has_video: info.has_video,
            is_screen_sharing: info.is_screen_sharing,
        }
    }
}

/// Everything the hosting application observes about the session
pub enum SessionEvent {
    /// Session lifecycle changed
    StateChanged(SessionState),
    /// A participant joined
    ParticipantJoined(Participant),
    /// A participant left
    ParticipantLeft {
        /// Departed user id
        user_id: String,
        /// Departed user name
        user_name: String,
    },
    /// The relay published a full roster replacement
    RosterUpdated(Vec<Participant>),
    /// A remote participant's published media flags changed
    RemoteMediaChanged {
        /// The participant
        user_id: String,
        /// Microphone muted
        is_muted: bool,
        /// Camera on
        has_video: bool,
        /// Screen-share active
        is_screen_sharing: bool,
    },
    /// A chat message was appended to the history
    ChatReceived(ChatMessage),
    /// A remote peer's media track arrived
    RemoteTrack {
        /// The peer
        peer_id: String,
        /// The track
        track: Arc<dyn RemoteTrack>,
    },
    /// A peer's transport state changed
    PeerStateChanged {
        /// The peer
        peer_id: String,
        /// New state
        state: EndpointState,
    },
    /// Negotiation with one peer failed; others are unaffected
    PeerNegotiationFailed {
        /// The peer
        peer_id: String,
        /// What went wrong
        reason: String,
    },
    /// Local media state changed (mute, share, track set)
    LocalMediaChanged(MediaStateSnapshot),
    /// A local device operation failed; the session continues
    MediaError(String),
    /// The signaling connection was lost. Terminal: no reconnect is
    /// attempted, the session must be recreated.
    SignalingLost,
}

impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StateChanged(s) => write!(f, "StateChanged({:?})", s),
            Self::ParticipantJoined(p) => write!(f, "ParticipantJoined({})", p.user_id),
            Self::ParticipantLeft { user_id, .. } => write!(f, "ParticipantLeft({})", user_id),
            Self::RosterUpdated(r) => write!(f, "RosterUpdated({} participants)", r.len()),
            Self::RemoteMediaChanged { user_id, .. } => {
                write!(f, "RemoteMediaChanged({})", user_id)
            }
            Self::ChatReceived(m) => write!(f, "ChatReceived({})", m.id),
            Self::RemoteTrack { peer_id, .. } => write!(f, "RemoteTrack({})", peer_id),
            Self::PeerStateChanged { peer_id, state } => {
                write!(f, "PeerStateChanged({}, {:?})", peer_id, state)
            }
            Self::PeerNegotiationFailed { peer_id, reason } => {
                write!(f, "PeerNegotiationFailed({}, {})", peer_id, reason)
            }
            Self::LocalMediaChanged(s) => write!(f, "LocalMediaChanged({:?})", s),
            Self::MediaError(e) => write!(f, "MediaError({})", e),
            Self::SignalingLost => write!(f, "SignalingLost"),
        }
    }
}
