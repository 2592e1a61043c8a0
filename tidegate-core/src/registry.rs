//! Hash-keyed registry of the session's live torrent handles.
//!
//! Lookup by info hash is O(1); the map is the only shared mutable state the
//! gateway introduces on top of the engine. Hashes are compared in parsed
//! 20-byte form, so hex case never affects lookup.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::engine::{InfoHash, TorrentHandle};

/// Shared map from info hash to live handle.
#[derive(Default)]
pub struct TorrentRegistry {
    handles: RwLock<HashMap<InfoHash, Arc<dyn TorrentHandle>>>,
}

impl TorrentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a handle under its info hash.
    ///
    /// Re-registering an already-tracked hash keeps the existing handle, so
    /// one info hash never maps to two handles within a session.
    pub async fn insert(&self, handle: Arc<dyn TorrentHandle>) -> Arc<dyn TorrentHandle> {
        self.handles
            .write()
            .await
            .entry(handle.info_hash())
            .or_insert(handle)
            .clone()
    }

    /// Handle registered under `info_hash`, if any.
    pub async fn find_by_hash(&self, info_hash: InfoHash) -> Option<Arc<dyn TorrentHandle>> {
        self.handles.read().await.get(&info_hash).cloned()
    }

    /// Stops tracking one hash, returning the handle it mapped to.
    pub async fn remove(&self, info_hash: InfoHash) -> Option<Arc<dyn TorrentHandle>> {
        self.handles.write().await.remove(&info_hash)
    }

    /// All tracked handles, in no particular order.
    pub async fn all(&self) -> Vec<Arc<dyn TorrentHandle>> {
        self.handles.read().await.values().cloned().collect()
    }

    /// Drops every tracked handle.
    pub async fn clear(&self) {
        self.handles.write().await.clear();
    }
}
