//! Engine seam: the torrent backend consumed by the gateway.
//!
//! The gateway never speaks the BitTorrent wire protocol itself. Everything
//! swarm-related (peers, DHT, piece storage) lives behind the [`TorrentEngine`]
//! and [`TorrentHandle`] traits, with a production adapter over librqbit and an
//! in-memory scripted engine for tests.

pub mod rqbit;
#[cfg(any(test, feature = "test-utils"))]
pub mod sim;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncSeek};

pub use rqbit::RqbitEngine;

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte hash of the metainfo's info dictionary, canonically rendered as a
/// lowercase hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from a 20-byte hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to the underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parses a 40-character hex string, accepting either hex case.
    ///
    /// # Errors
    ///
    /// - `EngineError::InvalidInfoHash` - If the input is not 40 hex digits
    pub fn from_hex(input: &str) -> Result<Self, EngineError> {
        let decoded = hex::decode(input).map_err(|e| EngineError::InvalidInfoHash {
            reason: e.to_string(),
        })?;
        let bytes: [u8; 20] = decoded
            .try_into()
            .map_err(|_| EngineError::InvalidInfoHash {
                reason: format!("expected 20 bytes, got {} hex digits", input.len()),
            })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// One file inside a torrent, as reported by the engine.
///
/// `file_id` is the engine's own zero-based identifier in metainfo order. It
/// stays valid for the handle's lifetime and is what [`TorrentHandle::open_stream`]
/// expects; the gateway's episode numbering is layered on top of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFileEntry {
    pub file_id: usize,
    /// Relative path inside the torrent, `/`-separated.
    pub path: String,
    pub length: u64,
}

/// Seekable async byte stream over one torrent file.
pub trait MediaStream: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> MediaStream for T {}

/// Settings handed to an engine implementation at construction.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Directory the engine uses for piece storage.
    pub storage_dir: PathBuf,
    /// Port for inbound peer connections.
    pub peer_port: u16,
    /// Disables IPv6 networking when set.
    pub disable_ipv6: bool,
    /// Keep seeding completed torrents while the session is open.
    pub seed: bool,
}

/// Errors reported by engine implementations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to register torrent: {reason}")]
    RegistrationFailed { reason: String },

    #[error("Invalid info hash: {reason}")]
    InvalidInfoHash { reason: String },

    #[error("Torrent {info_hash} not found")]
    TorrentNotFound { info_hash: InfoHash },

    #[error("File {file_id} not found in torrent {info_hash}")]
    FileNotFound { info_hash: InfoHash, file_id: usize },

    #[error("Metadata for torrent {info_hash} is not resolved yet")]
    MetadataNotResolved { info_hash: InfoHash },

    #[error("Engine backend error: {reason}")]
    Backend { reason: String },

    #[error("Engine is shut down")]
    EngineClosed,

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// Torrent backend owned by the session.
///
/// Registration returns a shared handle immediately; metadata for
/// magnet-originated torrents resolves later and is awaited through the
/// handle. Implementations must be safe to share across tasks.
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    /// Registers a magnet link with the engine.
    ///
    /// # Errors
    ///
    /// - `EngineError::RegistrationFailed` - If the engine rejects the descriptor
    /// - `EngineError::EngineClosed` - If the engine has been shut down
    async fn add_magnet(&self, uri: &str) -> Result<Arc<dyn TorrentHandle>, EngineError>;

    /// Registers a local `.torrent` metainfo file.
    ///
    /// # Errors
    ///
    /// - `EngineError::Io` - If the file cannot be read
    /// - `EngineError::RegistrationFailed` - If the engine rejects the metainfo
    /// - `EngineError::EngineClosed` - If the engine has been shut down
    async fn add_metainfo_file(&self, path: &Path)
    -> Result<Arc<dyn TorrentHandle>, EngineError>;

    /// Removes one torrent, releasing its peers and engine state.
    ///
    /// # Errors
    ///
    /// - `EngineError::TorrentNotFound` - If no such torrent is registered
    async fn remove(&self, info_hash: InfoHash) -> Result<(), EngineError>;

    /// Shuts the engine down, releasing all peer connections.
    ///
    /// Idempotent; registration calls after close fail with `EngineClosed`.
    ///
    /// # Errors
    ///
    /// - `EngineError::Backend` - If backend teardown fails
    async fn close(&self) -> Result<(), EngineError>;
}

/// One active torrent, owned by the engine and borrowed by the gateway.
#[async_trait]
pub trait TorrentHandle: Send + Sync {
    /// Identifier of this torrent. Known immediately, even before metadata.
    fn info_hash(&self) -> InfoHash;

    /// Torrent name from metadata, when resolved.
    fn name(&self) -> Option<String>;

    /// When this handle was registered with the engine.
    ///
    /// Stands in for the metainfo creation date, which engines do not
    /// uniformly expose; stable for the handle's lifetime so conditional
    /// requests keyed on it behave consistently.
    fn added_at(&self) -> DateTime<Utc>;

    /// Whether the file list and piece layout are known yet.
    fn metadata_ready(&self) -> bool;

    /// Waits until the engine has resolved metadata for this torrent.
    ///
    /// Never times out on its own; callers bound the wait.
    ///
    /// # Errors
    ///
    /// - `EngineError::EngineClosed` - If the engine shuts down mid-wait
    async fn wait_metadata(&self) -> Result<(), EngineError>;

    /// Waits until every file of this torrent has been downloaded.
    ///
    /// # Errors
    ///
    /// - `EngineError::Backend` - If the engine aborts the download
    async fn wait_completed(&self) -> Result<(), EngineError>;

    /// Files in engine order. Requires resolved metadata.
    ///
    /// # Errors
    ///
    /// - `EngineError::MetadataNotResolved` - If metadata has not arrived yet
    fn files(&self) -> Result<Vec<TorrentFileEntry>, EngineError>;

    /// Opens a seekable reader over one file.
    ///
    /// # Errors
    ///
    /// - `EngineError::MetadataNotResolved` - If metadata has not arrived yet
    /// - `EngineError::FileNotFound` - If `file_id` is not a file of this torrent
    async fn open_stream(&self, file_id: usize) -> Result<Box<dyn MediaStream>, EngineError>;
}
