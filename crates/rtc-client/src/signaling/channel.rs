//! Signaling channel
//!
//! Owns the single persistent connection to the relay. Outbound messages are
//! serialized and pushed to the transport; inbound frames are decoded into
//! typed [`SignalMessage`]s and delivered on the channel's event stream
//! together with lifecycle state changes.
//!
//! There is no auto-reconnect: an involuntary close transitions the channel
//! to `Closed`, a final state-change event is emitted, and the session is
//! inert until the hosting application recreates it.

use super::protocol::SignalMessage;
use super::transport::{SignalingTransport, TransportLink};
use crate::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Connection lifecycle of the signaling channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Transport connect in progress
    Connecting,
    /// Connected; messages flow
    Open,
    /// Closed (voluntarily or not); terminal
    Closed,
}

/// Events delivered by the channel to its consumer
#[derive(Debug)]
pub enum ChannelEvent {
    /// A decoded inbound signaling message
    Message(SignalMessage),
    /// The channel lifecycle changed
    StateChanged(ChannelState),
}

/// Cloneable sender half of the channel.
///
/// `send` fails silently (logged, non-fatal) when the channel is not open,
/// so late sends during teardown never surface as errors.
#[derive(Clone)]
pub struct SignalingHandle {
    state: Arc<parking_lot::RwLock<ChannelState>>,
    out_tx: mpsc::Sender<String>,
}

impl SignalingHandle {
    /// Current channel state
    pub fn state(&self) -> ChannelState {
        *self.state.read()
    }

    /// Serialize and transmit a message.
    ///
    /// A no-op (with a warning) if the channel is not `Open`.
    pub async fn send(&self, msg: &SignalMessage) -> Result<()> {
        if self.state() != ChannelState::Open {
            warn!(
                "Dropping {} message: signaling channel not open",
                msg.type_name()
            );
            return Ok(());
        }

        let frame = msg.to_json()?;
        if self.out_tx.send(frame).await.is_err() {
            warn!(
                "Dropping {} message: signaling transport gone",
                msg.type_name()
            );
        }
        Ok(())
    }
}

/// The persistent signaling connection to the relay
pub struct SignalingChannel {
    state: Arc<parking_lot::RwLock<ChannelState>>,
    out_tx: mpsc::Sender<String>,
    events_rx: parking_lot::Mutex<Option<mpsc::Receiver<ChannelEvent>>>,
}

impl SignalingChannel {
    /// Connect the channel through the given transport.
    ///
    /// Transitions Connecting -> Open and spawns the read loop that decodes
    /// inbound frames. Undecodable frames are logged and skipped; they do
    /// not kill the read loop.
    pub async fn connect(
        transport: &dyn SignalingTransport,
        url: &str,
        queue_depth: usize,
    ) -> Result<Self> {
        let state = Arc::new(parking_lot::RwLock::new(ChannelState::Connecting));

        let TransportLink {
            outgoing,
            mut incoming,
        } = transport.connect(url).await?;

        *state.write() = ChannelState::Open;
        info!("Signaling channel open: {}", url);

        let (events_tx, events_rx) = mpsc::channel::<ChannelEvent>(queue_depth);

        // The consumer learns about Open before any message.
        let _ = events_tx.send(ChannelEvent::StateChanged(ChannelState::Open)).await;

        let state_for_loop = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(frame) = incoming.recv().await {
                match SignalMessage::from_json(&frame) {
                    Ok(msg) => {
                        debug!("Signaling message received: {}", msg.type_name());
                        if events_tx.send(ChannelEvent::Message(msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Skipping undecodable signaling frame: {}", e);
                    }
                }
            }

            *state_for_loop.write() = ChannelState::Closed;
            info!("Signaling channel closed");
            let _ = events_tx
                .send(ChannelEvent::StateChanged(ChannelState::Closed))
                .await;
        });

        Ok(Self {
            state,
            out_tx: outgoing,
            events_rx: parking_lot::Mutex::new(Some(events_rx)),
        })
    }

    /// Current channel state
    pub fn state(&self) -> ChannelState {
        *self.state.read()
    }

    /// Get a cloneable sender handle
    pub fn handle(&self) -> SignalingHandle {
        SignalingHandle {
            state: Arc::clone(&self.state),
            out_tx: self.out_tx.clone(),
        }
    }

    /// Take the event stream. Yields `None` after the first call.
    pub fn take_events(&self) -> Option<mpsc::Receiver<ChannelEvent>> {
        self.events_rx.lock().take()
    }

    /// Close the channel voluntarily.
    ///
    /// Idempotent; handles observing `Closed` drop further sends.
    pub fn close(&self) {
        let mut state = self.state.write();
        if *state != ChannelState::Closed {
            info!("Closing signaling channel");
            *state = ChannelState::Closed;
        }
    }
}
