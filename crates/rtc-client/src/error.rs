//! Error types for the session client

/// Result type alias using the session client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in session signaling and peer orchestration
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signaling channel error (connect, send, decode)
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// Signaling channel is not open
    #[error("Signaling channel closed")]
    ChannelClosed,

    /// Peer not found in the link registry
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// A peer link already exists for this participant
    #[error("Peer already linked: {0}")]
    PeerAlreadyLinked(String),

    /// WebRTC peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// Illegal negotiation state transition (e.g. answer before offer)
    #[error("Negotiation error for peer {peer_id}: {message}")]
    NegotiationError {
        /// Remote participant the link belongs to
        peer_id: String,
        /// What went wrong
        message: String,
    },

    /// SDP offer/answer error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// Local device capture failure (permission denied, no device)
    #[error("Device acquisition error: {0}")]
    DeviceError(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// Session lifecycle error (join while joined, etc.)
    #[error("Session error: {0}")]
    SessionError(String),

    /// Offer/answer exchange exceeded the configured bound
    #[error("Operation timeout: {0}")]
    OperationTimeout(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error (should not occur in normal operation)
    #[error("Internal error: {0}")]
    InternalError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is fatal to the session's liveness.
    ///
    /// Only loss of the signaling channel is fatal; everything else is
    /// recovered locally (link removed, roster updated, media state reset).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ChannelClosed)
    }

    /// Check if this error is scoped to a single peer link
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Error::PeerNotFound(_)
                | Error::PeerAlreadyLinked(_)
                | Error::PeerConnectionError(_)
                | Error::NegotiationError { .. }
                | Error::SdpError(_)
                | Error::IceCandidateError(_)
        )
    }

    /// Check if this error leaves local media off but the session alive
    pub fn is_media_error(&self) -> bool {
        matches!(self, Error::DeviceError(_) | Error::MediaTrackError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidConfig("test".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: test");
    }

    #[test]
    fn test_channel_loss_is_fatal() {
        assert!(Error::ChannelClosed.is_fatal());
        assert!(!Error::PeerNotFound("bob".to_string()).is_fatal());
        assert!(!Error::DeviceError("denied".to_string()).is_fatal());
    }

    #[test]
    fn test_error_is_peer_error() {
        assert!(Error::PeerNotFound("bob".to_string()).is_peer_error());
        assert!(Error::NegotiationError {
            peer_id: "bob".to_string(),
            message: "answer before offer".to_string(),
        }
        .is_peer_error());
        assert!(!Error::DeviceError("denied".to_string()).is_peer_error());
    }

    #[test]
    fn test_error_is_media_error() {
        assert!(Error::DeviceError("no camera".to_string()).is_media_error());
        assert!(!Error::SdpError("bad sdp".to_string()).is_media_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::IoError(_)));
    }
}
