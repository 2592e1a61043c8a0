//! Production torrent engine backed by librqbit.
//!
//! The librqbit session owns swarm networking and piece storage; this adapter
//! narrows it to the [`TorrentEngine`] seam and keeps an info-hash map of the
//! torrents it registered so removal and shutdown stay in the gateway's hands.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use librqbit::api::TorrentIdOrHash;
use librqbit::{AddTorrent, AddTorrentOptions, ManagedTorrent, SessionOptions};
use parking_lot::Mutex;
use tracing::{info, warn};

use super::{
    EngineError, EngineOptions, InfoHash, MediaStream, TorrentEngine, TorrentFileEntry,
    TorrentHandle,
};

/// How often a metadata wait re-checks the engine's metadata slot.
const METADATA_POLL_INTERVAL: Duration = Duration::from_millis(200);

fn backend_error(context: &str, error: impl std::fmt::Display) -> EngineError {
    EngineError::Backend {
        reason: format!("{context}: {error:#}"),
    }
}

/// Backend session settings derived from [`EngineOptions`].
///
/// The peer-listen port becomes the session's TCP listen port. The backend
/// has no IPv6 toggle (its peer listener is IPv4-only) and no seed flag (it
/// seeds whatever it holds while the session is open), so those two options
/// shape gateway behavior instead: the listener bind family and the session
/// lifetime after a completed download.
fn session_options(options: &EngineOptions) -> SessionOptions {
    SessionOptions {
        listen_port_range: Some(options.peer_port..options.peer_port.saturating_add(1)),
        ..Default::default()
    }
}

/// [`TorrentEngine`] implementation over a librqbit session.
pub struct RqbitEngine {
    session: Arc<librqbit::Session>,
    tracked: Mutex<HashMap<InfoHash, usize>>,
    closed: AtomicBool,
}

impl RqbitEngine {
    /// Starts a librqbit session rooted at the configured storage directory,
    /// listening for peers on the configured port.
    ///
    /// # Errors
    ///
    /// - `EngineError::Backend` - If the session fails to start
    pub async fn new(options: EngineOptions) -> Result<Arc<Self>, EngineError> {
        let session = librqbit::Session::new_with_opts(
            options.storage_dir.clone(),
            session_options(&options),
        )
        .await
        .map_err(|e| backend_error("failed to start torrent session", e))?;
        info!(
            storage_dir = %options.storage_dir.display(),
            peer_port = options.peer_port,
            "Torrent engine started"
        );
        Ok(Arc::new(Self {
            session,
            tracked: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }))
    }

    async fn register(&self, add: AddTorrent<'_>) -> Result<Arc<dyn TorrentHandle>, EngineError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::EngineClosed);
        }

        let add_opts = AddTorrentOptions {
            overwrite: true,
            ..Default::default()
        };
        let response = self
            .session
            .add_torrent(add, Some(add_opts))
            .await
            .map_err(|e| EngineError::RegistrationFailed {
                reason: format!("{e:#}"),
            })?;
        let torrent = response
            .into_handle()
            .ok_or_else(|| EngineError::RegistrationFailed {
                reason: "engine returned no live handle".to_string(),
            })?;

        let info_hash = InfoHash::from_hex(&torrent.info_hash().as_string())?;
        self.tracked.lock().insert(info_hash, torrent.id());
        Ok(Arc::new(RqbitHandle {
            info_hash,
            added_at: Utc::now(),
            torrent,
        }))
    }
}

#[async_trait]
impl TorrentEngine for RqbitEngine {
    async fn add_magnet(&self, uri: &str) -> Result<Arc<dyn TorrentHandle>, EngineError> {
        self.register(AddTorrent::from_url(uri)).await
    }

    async fn add_metainfo_file(
        &self,
        path: &Path,
    ) -> Result<Arc<dyn TorrentHandle>, EngineError> {
        let bytes = tokio::fs::read(path).await?;
        self.register(AddTorrent::from_bytes(bytes)).await
    }

    async fn remove(&self, info_hash: InfoHash) -> Result<(), EngineError> {
        let torrent_id = self
            .tracked
            .lock()
            .remove(&info_hash)
            .ok_or(EngineError::TorrentNotFound { info_hash })?;
        self.session
            .delete(TorrentIdOrHash::Id(torrent_id), false)
            .await
            .map_err(|e| backend_error("failed to remove torrent", e))
    }

    async fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let drained: Vec<(InfoHash, usize)> = self.tracked.lock().drain().collect();
        for (info_hash, torrent_id) in drained {
            if let Err(e) = self
                .session
                .delete(TorrentIdOrHash::Id(torrent_id), false)
                .await
            {
                warn!(%info_hash, "Failed to release torrent during shutdown: {e:#}");
            }
        }
        info!("Torrent engine closed");
        Ok(())
    }
}

struct RqbitHandle {
    info_hash: InfoHash,
    added_at: DateTime<Utc>,
    torrent: Arc<ManagedTorrent>,
}

#[async_trait]
impl TorrentHandle for RqbitHandle {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    fn name(&self) -> Option<String> {
        self.torrent.name()
    }

    fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    fn metadata_ready(&self) -> bool {
        self.torrent.metadata.load().is_some()
    }

    async fn wait_metadata(&self) -> Result<(), EngineError> {
        // The engine publishes metadata through a swap slot rather than a
        // wakeable signal, so readiness is observed by polling it.
        loop {
            if self.metadata_ready() {
                return Ok(());
            }
            tokio::time::sleep(METADATA_POLL_INTERVAL).await;
        }
    }

    async fn wait_completed(&self) -> Result<(), EngineError> {
        self.torrent
            .wait_until_completed()
            .await
            .map_err(|e| backend_error("download aborted", e))
    }

    fn files(&self) -> Result<Vec<TorrentFileEntry>, EngineError> {
        let metadata = self.torrent.metadata.load();
        let Some(meta) = &*metadata else {
            return Err(EngineError::MetadataNotResolved {
                info_hash: self.info_hash,
            });
        };
        let details = meta
            .info
            .iter_file_details()
            .map_err(|e| backend_error("failed to enumerate files", e))?;

        let mut entries = Vec::new();
        for (file_id, file) in details.enumerate() {
            let path = file
                .filename
                .to_string()
                .map_err(|e| backend_error("unreadable file path in metainfo", e))?;
            entries.push(TorrentFileEntry {
                file_id,
                path,
                length: file.len,
            });
        }
        Ok(entries)
    }

    async fn open_stream(&self, file_id: usize) -> Result<Box<dyn MediaStream>, EngineError> {
        if !self.metadata_ready() {
            return Err(EngineError::MetadataNotResolved {
                info_hash: self.info_hash,
            });
        }
        let stream = Arc::clone(&self.torrent)
            .stream(file_id)
            .map_err(|e| backend_error("failed to open file stream", e))?;
        Ok(Box::new(stream))
    }
}
