//! Session chat
//!
//! Text chat rides the signaling channel rather than peer data channels, so
//! it works the moment the channel opens and is independent of any peer's
//! negotiation state. History is append-only for the lifetime of the
//! session; there is no edit or delete.

use crate::signaling::{SignalMessage, SignalingHandle};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Kind of a chat entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A participant-authored text message
    Text,
    /// A locally generated notice (joins, leaves)
    System,
}

/// One entry in the session chat history
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// Locally assigned id
    pub id: String,
    /// Author's user id; empty for system notices
    pub sender_id: String,
    /// Author's display name
    pub sender_name: String,
    /// Message body
    pub body: String,
    /// Local receive/send time
    pub sent_at: DateTime<Utc>,
    /// Text or system notice
    pub kind: MessageKind,
    /// Whether the local user authored it
    pub own: bool,
}

impl ChatMessage {
    fn new(
        sender_id: String,
        sender_name: String,
        body: String,
        kind: MessageKind,
        own: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender_id,
            sender_name,
            body,
            sent_at: Utc::now(),
            kind,
            own,
        }
    }
}

/// Append-only chat over the signaling channel
pub struct ChatChannel {
    signaling: SignalingHandle,
    session_id: String,
    local_user_id: String,
    local_user_name: String,
    history: parking_lot::RwLock<Vec<ChatMessage>>,
}

impl ChatChannel {
    /// Create a chat bound to one session
    pub fn new(
        signaling: SignalingHandle,
        session_id: String,
        local_user_id: String,
        local_user_name: String,
    ) -> Self {
        Self {
            signaling,
            session_id,
            local_user_id,
            local_user_name,
            history: parking_lot::RwLock::new(Vec::new()),
        }
    }

    /// Send a text message and append our own copy immediately.
    ///
    /// The relay does not echo messages back to the sender, so the local
    /// append is the only copy we will ever have.
    pub async fn send(&self, body: &str) -> Result<ChatMessage> {
        let body = body.trim();
        if body.is_empty() {
            return Err(Error::SessionError("empty chat message".to_string()));
        }

        self.signaling
            .send(&SignalMessage::ChatMessage {
                session_id: Some(self.session_id.clone()),
                sender_id: None,
                sender_name: None,
                message: body.to_string(),
            })
            .await?;

        let entry = ChatMessage::new(
            self.local_user_id.clone(),
            self.local_user_name.clone(),
            body.to_string(),
            MessageKind::Text,
            true,
        );
        self.history.write().push(entry.clone());
        debug!("Chat message sent ({} chars)", body.len());
        Ok(entry)
    }

    /// Append an inbound message from a remote participant
    pub fn record_incoming(
        &self,
        sender_id: Option<String>,
        sender_name: Option<String>,
        body: String,
    ) -> ChatMessage {
        let entry = ChatMessage::new(
            sender_id.unwrap_or_default(),
            sender_name.unwrap_or_else(|| "Unknown".to_string()),
            body,
            MessageKind::Text,
            false,
        );
        self.history.write().push(entry.clone());
        entry
    }

    /// Append a locally generated system notice
    pub fn record_system(&self, body: String) -> ChatMessage {
        let entry = ChatMessage::new(
            String::new(),
            String::new(),
            body,
            MessageKind::System,
            false,
        );
        self.history.write().push(entry.clone());
        entry
    }

    /// Snapshot of the full history, in arrival order
    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.read().clone()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.history.read().len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.history.read().is_empty()
    }
}
