//! Peer link registry
//!
//! Keyed storage for active [`PeerLink`]s. One link per remote peer id;
//! inserting a duplicate is an error so overlapping join races surface
//! instead of silently replacing a live connection.

use super::link::PeerLink;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Active peer links, keyed by peer id
#[derive(Default)]
pub struct PeerRegistry {
    links: RwLock<HashMap<String, Arc<PeerLink>>>,
}

impl PeerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new link. Fails with [`Error::PeerAlreadyLinked`] if the
    /// peer already has one.
    pub async fn insert(&self, link: Arc<PeerLink>) -> Result<()> {
        let mut links = self.links.write().await;
        let peer_id = link.peer_id().to_string();
        if links.contains_key(&peer_id) {
            return Err(Error::PeerAlreadyLinked(peer_id));
        }
        links.insert(peer_id, link);
        Ok(())
    }

    /// Look up a link
    pub async fn get(&self, peer_id: &str) -> Option<Arc<PeerLink>> {
        self.links.read().await.get(peer_id).cloned()
    }

    /// Remove and return a link
    pub async fn remove(&self, peer_id: &str) -> Option<Arc<PeerLink>> {
        self.links.write().await.remove(peer_id)
    }

    /// Remove and return every link
    pub async fn drain(&self) -> Vec<Arc<PeerLink>> {
        self.links.write().await.drain().map(|(_, v)| v).collect()
    }

    /// Ids of all linked peers
    pub async fn peer_ids(&self) -> Vec<String> {
        self.links.read().await.keys().cloned().collect()
    }

    /// Number of active links
    pub async fn len(&self) -> usize {
        self.links.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.links.read().await.is_empty()
    }
}
