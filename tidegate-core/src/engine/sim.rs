//! Scripted in-memory engine for tests.
//!
//! Registration hands out handles for pre-declared torrents instead of
//! touching any swarm. Metadata resolution is scripted per torrent
//! (immediate, delayed, or held until a test releases it), which makes the
//! gateway's wait and timeout paths exercisable without network access.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{
    EngineError, EngineOptions, InfoHash, MediaStream, TorrentEngine, TorrentFileEntry,
    TorrentHandle,
};

/// Extracts the hex info hash from a magnet link's `xt=urn:btih:` parameter.
pub fn magnet_info_hash(uri: &str) -> Option<InfoHash> {
    let (_, query) = uri.split_once('?')?;
    for param in query.split('&') {
        if let Some(encoded) = param.strip_prefix("xt=urn:btih:") {
            return InfoHash::from_hex(encoded).ok();
        }
    }
    None
}

/// When a scripted torrent's metadata becomes available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Resolved as soon as the torrent is registered.
    Immediate,
    /// Resolved after a delay from registration.
    AfterDelay(Duration),
    /// Held until the test calls [`SimHandle::resolve_now`].
    Held,
}

/// Declaration of one torrent the sim engine will accept.
#[derive(Debug, Clone)]
pub struct SimTorrent {
    pub info_hash: InfoHash,
    pub name: String,
    pub files: Vec<(String, Vec<u8>)>,
    pub resolve: ResolveMode,
}

impl SimTorrent {
    /// New scripted torrent with an info hash of twenty `seed` bytes.
    pub fn new(seed: u8, name: &str) -> Self {
        Self {
            info_hash: InfoHash::new([seed; 20]),
            name: name.to_string(),
            files: Vec::new(),
            resolve: ResolveMode::Immediate,
        }
    }

    /// Adds a file with the given contents.
    #[must_use]
    pub fn with_file(mut self, path: &str, content: &[u8]) -> Self {
        self.files.push((path.to_string(), content.to_vec()));
        self
    }

    #[must_use]
    pub fn resolve_after(mut self, delay: Duration) -> Self {
        self.resolve = ResolveMode::AfterDelay(delay);
        self
    }

    /// Metadata stays unresolved until the test releases it.
    #[must_use]
    pub fn held(mut self) -> Self {
        self.resolve = ResolveMode::Held;
        self
    }

    /// Magnet link for this torrent's info hash.
    pub fn magnet(&self) -> String {
        format!("magnet:?xt=urn:btih:{}", self.info_hash)
    }
}

/// Scripted [`TorrentEngine`] implementation.
pub struct SimEngine {
    options: EngineOptions,
    scripts: Mutex<Vec<SimTorrent>>,
    handles: Mutex<HashMap<InfoHash, Arc<SimHandle>>>,
    closed: AtomicBool,
}

impl SimEngine {
    pub fn new(options: EngineOptions, scripts: Vec<SimTorrent>) -> Arc<Self> {
        Arc::new(Self {
            options,
            scripts: Mutex::new(scripts),
            handles: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Options this engine was constructed with, for plumbing assertions.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// The live handle for a registered torrent, if any.
    pub fn handle(&self, info_hash: InfoHash) -> Option<Arc<SimHandle>> {
        self.handles.lock().get(&info_hash).cloned()
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::EngineClosed);
        }
        Ok(())
    }

    fn activate(&self, script: SimTorrent) -> Arc<dyn TorrentHandle> {
        if let Some(existing) = self.handles.lock().get(&script.info_hash) {
            return existing.clone();
        }
        let handle = SimHandle::spawn(script);
        self.handles
            .lock()
            .insert(handle.info_hash, handle.clone());
        handle
    }

    fn claim_script<F>(&self, matcher: F) -> Option<SimTorrent>
    where
        F: Fn(&SimTorrent) -> bool,
    {
        let mut scripts = self.scripts.lock();
        let position = scripts.iter().position(matcher)?;
        Some(scripts.remove(position))
    }
}

#[async_trait]
impl TorrentEngine for SimEngine {
    async fn add_magnet(&self, uri: &str) -> Result<Arc<dyn TorrentHandle>, EngineError> {
        self.ensure_open()?;
        let info_hash = magnet_info_hash(uri).ok_or_else(|| EngineError::RegistrationFailed {
            reason: format!("unparseable magnet link: {uri}"),
        })?;
        if let Some(existing) = self.handles.lock().get(&info_hash) {
            return Ok(existing.clone());
        }
        let script = self
            .claim_script(|s| s.info_hash == info_hash)
            .ok_or_else(|| EngineError::RegistrationFailed {
                reason: format!("no scripted torrent for hash {info_hash}"),
            })?;
        Ok(self.activate(script))
    }

    async fn add_metainfo_file(
        &self,
        path: &Path,
    ) -> Result<Arc<dyn TorrentHandle>, EngineError> {
        self.ensure_open()?;
        // Real engines fail on unreadable metainfo paths; mirror that.
        tokio::fs::metadata(path).await?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let script = self
            .claim_script(|s| s.name == stem)
            .or_else(|| self.claim_script(|_| true))
            .ok_or_else(|| EngineError::RegistrationFailed {
                reason: format!("no scripted torrent left for {}", path.display()),
            })?;
        Ok(self.activate(script))
    }

    async fn remove(&self, info_hash: InfoHash) -> Result<(), EngineError> {
        self.handles
            .lock()
            .remove(&info_hash)
            .map(|_| ())
            .ok_or(EngineError::TorrentNotFound { info_hash })
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.closed.store(true, Ordering::Release);
        self.handles.lock().clear();
        Ok(())
    }
}

/// Handle to one scripted torrent.
pub struct SimHandle {
    info_hash: InfoHash,
    name: String,
    added_at: DateTime<Utc>,
    files: Vec<(String, Vec<u8>)>,
    resolved: AtomicBool,
    resolve_notify: Notify,
}

impl SimHandle {
    fn spawn(script: SimTorrent) -> Arc<Self> {
        let handle = Arc::new(Self {
            info_hash: script.info_hash,
            name: script.name,
            added_at: Utc::now(),
            files: script.files,
            resolved: AtomicBool::new(script.resolve == ResolveMode::Immediate),
            resolve_notify: Notify::new(),
        });
        if let ResolveMode::AfterDelay(delay) = script.resolve {
            let delayed = handle.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                delayed.resolve_now();
            });
        }
        handle
    }

    /// Marks metadata as resolved and wakes waiters.
    pub fn resolve_now(&self) {
        self.resolved.store(true, Ordering::Release);
        self.resolve_notify.notify_waiters();
    }
}

#[async_trait]
impl TorrentHandle for SimHandle {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    fn name(&self) -> Option<String> {
        self.metadata_ready().then(|| self.name.clone())
    }

    fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    fn metadata_ready(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    async fn wait_metadata(&self) -> Result<(), EngineError> {
        loop {
            if self.metadata_ready() {
                return Ok(());
            }
            let notified = self.resolve_notify.notified();
            if self.metadata_ready() {
                return Ok(());
            }
            notified.await;
        }
    }

    async fn wait_completed(&self) -> Result<(), EngineError> {
        // Scripted torrents have their bytes from the start; completion
        // coincides with metadata resolution.
        self.wait_metadata().await
    }

    fn files(&self) -> Result<Vec<TorrentFileEntry>, EngineError> {
        if !self.metadata_ready() {
            return Err(EngineError::MetadataNotResolved {
                info_hash: self.info_hash,
            });
        }
        Ok(self
            .files
            .iter()
            .enumerate()
            .map(|(file_id, (path, content))| TorrentFileEntry {
                file_id,
                path: path.clone(),
                length: content.len() as u64,
            })
            .collect())
    }

    async fn open_stream(&self, file_id: usize) -> Result<Box<dyn MediaStream>, EngineError> {
        if !self.metadata_ready() {
            return Err(EngineError::MetadataNotResolved {
                info_hash: self.info_hash,
            });
        }
        let (_, content) = self
            .files
            .get(file_id)
            .ok_or(EngineError::FileNotFound {
                info_hash: self.info_hash,
                file_id,
            })?;
        Ok(Box::new(Cursor::new(content.clone())))
    }
}
