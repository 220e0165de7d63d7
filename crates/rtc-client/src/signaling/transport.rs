//! Signaling transport seam
//!
//! [`SignalingTransport`] abstracts the raw bidirectional text pipe to the
//! relay so the channel logic is testable against an in-memory pipe. The
//! production implementation is [`WebSocketTransport`] over tokio-tungstenite.

use crate::{Error, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info};

/// A connected bidirectional text pipe.
///
/// Dropping `outgoing` closes the write side; `incoming` yielding `None`
/// means the transport disconnected (voluntarily or not).
pub struct TransportLink {
    /// Raw outbound frames
    pub outgoing: mpsc::Sender<String>,

    /// Raw inbound frames
    pub incoming: mpsc::Receiver<String>,
}

/// Factory for connected transport links
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Open a connection to the relay at `url`
    async fn connect(&self, url: &str) -> Result<TransportLink>;
}

/// WebSocket transport over tokio-tungstenite
#[derive(Debug, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create a new WebSocket transport factory
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SignalingTransport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<TransportLink> {
        info!("Connecting to signaling relay: {}", url);

        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocketError(format!("Failed to connect to {}: {}", url, e)))?;

        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
        let (in_tx, in_rx) = mpsc::channel::<String>(64);

        // Outbound pump: channel -> socket. Ends when all senders drop.
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = ws_tx.send(Message::Text(frame)).await {
                    error!("Failed to send WebSocket frame: {}", e);
                    break;
                }
            }
            let _ = ws_tx.close().await;
            debug!("WebSocket outbound pump ended");
        });

        // Inbound pump: socket -> channel. Dropping in_tx signals closure.
        tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("WebSocket closed by remote");
                        break;
                    }
                    Ok(_) => {} // binary/ping/pong handled by tungstenite
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                }
            }
            debug!("WebSocket inbound pump ended");
        });

        Ok(TransportLink {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}
