//! Configuration types for the session client

use serde::{Deserialize, Serialize};

/// Default offer/answer exchange bound in seconds
const DEFAULT_NEGOTIATION_TIMEOUT_SECS: u32 = 30;

/// Main configuration for a [`SessionCoordinator`](crate::SessionCoordinator)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// WebSocket signaling relay URL (ws:// or wss://)
    pub signaling_url: String,

    /// STUN server URLs (at least one required; no TURN in current scope)
    pub stun_servers: Vec<String>,

    /// Bound on how long a link may sit in OfferSent/AnswerSent before it
    /// is closed (seconds). Expiry closes only that link.
    pub negotiation_timeout_secs: u32,

    /// Outbound signaling queue depth
    pub send_queue_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:8080".to_string(),
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            negotiation_timeout_secs: DEFAULT_NEGOTIATION_TIMEOUT_SECS,
            send_queue_depth: 64,
        }
    }
}

impl SessionConfig {
    /// Create a configuration pointed at the given relay, with defaults
    /// for everything else
    pub fn new(signaling_url: &str) -> Self {
        Self {
            signaling_url: signaling_url.to_string(),
            ..Default::default()
        }
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `signaling_url` is not a ws:// or wss:// URL
    /// - `stun_servers` is empty
    /// - `negotiation_timeout_secs` is not in range 1-300
    /// - `send_queue_depth` is zero
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.signaling_url.starts_with("ws://") && !self.signaling_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must start with ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        if self.negotiation_timeout_secs == 0 || self.negotiation_timeout_secs > 300 {
            return Err(Error::InvalidConfig(format!(
                "negotiation_timeout_secs must be in range 1-300, got {}",
                self.negotiation_timeout_secs
            )));
        }

        if self.send_queue_depth == 0 {
            return Err(Error::InvalidConfig(
                "send_queue_depth must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Replace the STUN server list
    ///
    /// Useful for chaining with [`SessionConfig::new`].
    pub fn with_stun_servers(mut self, stun_servers: Vec<String>) -> Self {
        self.stun_servers = stun_servers;
        self
    }

    /// Set the negotiation timeout
    ///
    /// Useful for chaining with [`SessionConfig::new`].
    pub fn with_negotiation_timeout_secs(mut self, secs: u32) -> Self {
        self.negotiation_timeout_secs = secs;
        self
    }
}

/// Identity of the local participant, supplied by the hosting
/// application's auth/session context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    /// Stable user id
    pub user_id: String,

    /// Name shown in rosters and chat
    pub display_name: String,

    /// Application-defined role (e.g. "teacher", "student")
    pub role: String,
}

impl LocalIdentity {
    /// Create a new identity
    pub fn new(user_id: &str, display_name: &str, role: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            role: role.to_string(),
        }
    }
}
