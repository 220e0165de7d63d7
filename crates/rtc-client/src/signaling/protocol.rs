//! Typed signaling protocol
//!
//! JSON messages exchanged with the relay over the persistent channel. Every
//! message is an object with a `type` discriminator and camelCase payload
//! fields. Outbound peer-addressed messages carry `targetId`; the relay
//! rewrites addressing so the inbound copy carries `senderId` instead, which
//! is why those fields are optional on the shared variants.

use serde::{Deserialize, Serialize};

/// SDP description kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Offer from the initiating side
    Offer,
    /// Answer from the responding side
    Answer,
}

/// An SDP offer or answer as carried on the wire
///
/// Matches the browser `RTCSessionDescriptionInit` JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// "offer" or "answer"
    #[serde(rename = "type")]
    pub kind: SdpKind,

    /// SDP body
    pub sdp: String,
}

impl SessionDescription {
    /// Build an offer description
    pub fn offer(sdp: String) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp,
        }
    }

    /// Build an answer description
    pub fn answer(sdp: String) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp,
        }
    }
}

/// A trickled ICE candidate as carried on the wire
///
/// Matches the browser `RTCIceCandidateInit` JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate string ("candidate:... typ srflx ...")
    pub candidate: String,

    /// Media section identifier
    #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none", default)]
    pub sdp_mid: Option<String>,

    /// Media line index
    #[serde(
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub sdp_mline_index: Option<u16>,
}

/// Roster entry as published by the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    /// Stable user id
    pub user_id: String,

    /// Display name
    pub user_name: String,

    /// Application-defined role
    #[serde(default)]
    pub user_role: String,

    /// Whether this participant hosts the session
    #[serde(default)]
    pub is_host: bool,

    /// Published microphone state
    #[serde(default)]
    pub is_muted: bool,

    /// Published camera state
    #[serde(default)]
    pub has_video: bool,

    /// Published screen-share state
    #[serde(default)]
    pub is_screen_sharing: bool,
}

/// Signaling messages exchanged with the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// Join a named session (outbound)
    #[serde(rename_all = "camelCase")]
    JoinSession {
        /// Session to join
        session_id: String,
        /// Local user id
        user_id: String,
        /// Local display name
        user_name: String,
        /// Local role
        user_role: String,
    },

    /// Leave the session (outbound)
    #[serde(rename_all = "camelCase")]
    LeaveSession {
        /// Session being left
        session_id: String,
    },

    /// A participant joined (inbound broadcast)
    #[serde(rename_all = "camelCase")]
    UserJoined {
        /// Joining user id
        user_id: String,
        /// Joining user name
        user_name: String,
        /// Joining user role
        #[serde(default)]
        user_role: String,
    },

    /// A participant left (inbound broadcast)
    #[serde(rename_all = "camelCase")]
    UserLeft {
        /// Leaving user id
        user_id: String,
        /// Leaving user name
        user_name: String,
    },

    /// Authoritative roster snapshot (inbound broadcast)
    #[serde(rename_all = "camelCase")]
    ParticipantsUpdate {
        /// Full replacement roster
        participants: Vec<ParticipantInfo>,
    },

    /// SDP offer (outbound carries `targetId`, inbound carries `senderId`)
    #[serde(rename_all = "camelCase")]
    WebrtcOffer {
        /// Session scope (outbound only)
        #[serde(skip_serializing_if = "Option::is_none", default)]
        session_id: Option<String>,
        /// Recipient (outbound only)
        #[serde(skip_serializing_if = "Option::is_none", default)]
        target_id: Option<String>,
        /// Originator (inbound only, filled by the relay)
        #[serde(skip_serializing_if = "Option::is_none", default)]
        sender_id: Option<String>,
        /// The offer
        offer: SessionDescription,
    },

    /// SDP answer (outbound carries `targetId`, inbound carries `senderId`)
    #[serde(rename_all = "camelCase")]
    WebrtcAnswer {
        /// Session scope (outbound only)
        #[serde(skip_serializing_if = "Option::is_none", default)]
        session_id: Option<String>,
        /// Recipient (outbound only)
        #[serde(skip_serializing_if = "Option::is_none", default)]
        target_id: Option<String>,
        /// Originator (inbound only, filled by the relay)
        #[serde(skip_serializing_if = "Option::is_none", default)]
        sender_id: Option<String>,
        /// The answer
        answer: SessionDescription,
    },

    /// Trickled ICE candidate (outbound carries `targetId`, inbound `senderId`)
    #[serde(rename_all = "camelCase")]
    WebrtcIceCandidate {
        /// Session scope (outbound only)
        #[serde(skip_serializing_if = "Option::is_none", default)]
        session_id: Option<String>,
        /// Recipient (outbound only)
        #[serde(skip_serializing_if = "Option::is_none", default)]
        target_id: Option<String>,
        /// Originator (inbound only, filled by the relay)
        #[serde(skip_serializing_if = "Option::is_none", default)]
        sender_id: Option<String>,
        /// The candidate
        candidate: IceCandidate,
    },

    /// Chat text (outbound carries `sessionId`, inbound carries sender info)
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        /// Session scope (outbound only)
        #[serde(skip_serializing_if = "Option::is_none", default)]
        session_id: Option<String>,
        /// Originator (inbound only, filled by the relay)
        #[serde(skip_serializing_if = "Option::is_none", default)]
        sender_id: Option<String>,
        /// Originator name (inbound only)
        #[serde(skip_serializing_if = "Option::is_none", default)]
        sender_name: Option<String>,
        /// Message body
        message: String,
    },

    /// Publish local media flags so remote UIs can update (outbound)
    #[serde(rename_all = "camelCase")]
    MediaStateChange {
        /// Session scope
        session_id: String,
        /// Microphone muted
        is_muted: bool,
        /// Camera on
        has_video: bool,
        /// Screen-share active
        is_screen_sharing: bool,
    },

    /// A remote participant's media flags changed (inbound broadcast).
    /// Never triggers renegotiation; display state only.
    #[serde(rename_all = "camelCase")]
    MediaStateChanged {
        /// Participant whose flags changed
        user_id: String,
        /// Microphone muted
        is_muted: bool,
        /// Camera on
        has_video: bool,
        /// Screen-share active
        is_screen_sharing: bool,
    },
}

impl SignalMessage {
    /// Convert message to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!(
                "Failed to serialize signaling message: {}",
                e
            ))
        })
    }

    /// Parse message from JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::SerializationError(format!(
                "Failed to deserialize signaling message: {}",
                e
            ))
        })
    }

    /// Get the wire `type` tag
    pub fn type_name(&self) -> &'static str {
        match self {
            SignalMessage::JoinSession { .. } => "join-session",
            SignalMessage::LeaveSession { .. } => "leave-session",
            SignalMessage::UserJoined { .. } => "user-joined",
            SignalMessage::UserLeft { .. } => "user-left",
            SignalMessage::ParticipantsUpdate { .. } => "participants-update",
            SignalMessage::WebrtcOffer { .. } => "webrtc-offer",
            SignalMessage::WebrtcAnswer { .. } => "webrtc-answer",
            SignalMessage::WebrtcIceCandidate { .. } => "webrtc-ice-candidate",
            SignalMessage::ChatMessage { .. } => "chat-message",
            SignalMessage::MediaStateChange { .. } => "media-state-change",
            SignalMessage::MediaStateChanged { .. } => "media-state-changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_session_wire_shape() {
        let msg = SignalMessage::JoinSession {
            session_id: "s1".to_string(),
            user_id: "alice".to_string(),
            user_name: "Alice".to_string(),
            user_role: "teacher".to_string(),
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"join-session\""));
        assert!(json.contains("\"sessionId\":\"s1\""));
        assert!(json.contains("\"userId\":\"alice\""));

        let parsed = SignalMessage::from_json(&json).unwrap();
        assert_eq!(msg, parsed);
    }

    #[test]
    fn test_offer_outbound_omits_sender() {
        let msg = SignalMessage::WebrtcOffer {
            session_id: Some("s1".to_string()),
            target_id: Some("bob".to_string()),
            sender_id: None,
            offer: SessionDescription::offer("v=0\r\n".to_string()),
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"targetId\":\"bob\""));
        assert!(!json.contains("senderId"));
        assert!(json.contains("\"type\":\"offer\""));
    }

    #[test]
    fn test_offer_inbound_parses_sender() {
        let json = r#"{"type":"webrtc-offer","senderId":"alice","offer":{"type":"offer","sdp":"v=0"}}"#;
        let msg = SignalMessage::from_json(json).unwrap();
        match msg {
            SignalMessage::WebrtcOffer {
                sender_id, offer, ..
            } => {
                assert_eq!(sender_id.as_deref(), Some("alice"));
                assert_eq!(offer.kind, SdpKind::Offer);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_ice_candidate_round_trip() {
        let msg = SignalMessage::WebrtcIceCandidate {
            session_id: Some("s1".to_string()),
            target_id: Some("bob".to_string()),
            sender_id: None,
            candidate: IceCandidate {
                candidate: "candidate:1 1 udp 2130706431 10.0.0.1 54321 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
            },
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"sdpMLineIndex\":0"));
        let parsed = SignalMessage::from_json(&json).unwrap();
        assert_eq!(msg, parsed);
    }

    #[test]
    fn test_participants_update_defaults_media_flags() {
        let json = r#"{"type":"participants-update","participants":[
            {"userId":"alice","userName":"Alice","userRole":"teacher","isHost":true}
        ]}"#;
        let msg = SignalMessage::from_json(json).unwrap();
        match msg {
            SignalMessage::ParticipantsUpdate { participants } => {
                assert_eq!(participants.len(), 1);
                assert!(participants[0].is_host);
                assert!(!participants[0].is_muted);
                assert!(!participants[0].has_video);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_chat_message_inbound() {
        let json =
            r#"{"type":"chat-message","senderId":"alice","senderName":"Alice","message":"hi"}"#;
        let msg = SignalMessage::from_json(json).unwrap();
        match msg {
            SignalMessage::ChatMessage {
                sender_id, message, ..
            } => {
                assert_eq!(sender_id.as_deref(), Some("alice"));
                assert_eq!(message, "hi");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_media_state_change_pair() {
        let out = SignalMessage::MediaStateChange {
            session_id: "s1".to_string(),
            is_muted: true,
            has_video: false,
            is_screen_sharing: false,
        };
        assert_eq!(out.type_name(), "media-state-change");

        let json = r#"{"type":"media-state-changed","userId":"bob","isMuted":false,"hasVideo":true,"isScreenSharing":false}"#;
        let parsed = SignalMessage::from_json(json).unwrap();
        assert_eq!(parsed.type_name(), "media-state-changed");
    }

    #[test]
    fn test_unknown_type_is_error() {
        let json = r#"{"type":"course-updated","courseId":"c1"}"#;
        assert!(SignalMessage::from_json(json).is_err());
    }
}
