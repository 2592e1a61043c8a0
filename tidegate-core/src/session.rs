//! Session manager: engine ownership, ingestion, and torrent bookkeeping.
//!
//! One [`Session`] exists per process. It resolves the storage directory,
//! owns the torrent engine exclusively, tracks every registered torrent in a
//! hash-keyed registry, and is the only component allowed to close the
//! engine. The HTTP gateway borrows the session for lookups and streaming.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::engine::{
    EngineError, EngineOptions, InfoHash, RqbitEngine, TorrentEngine, TorrentHandle,
};
use crate::link::StreamLink;
use crate::media::MediaGate;
use crate::registry::TorrentRegistry;
use crate::source::{SourceError, TorrentSource, fetch_remote};

/// Errors fatal to session construction.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Project name must not be empty")]
    EmptyProjectName,

    #[error("Cannot resolve a storage directory: set TIDEGATE_STORAGE_DIR or HOME")]
    NoStorageRoot,

    #[error("Failed to create storage directory {path}")]
    StorageDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to build HTTP fetch client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Errors from ingesting one torrent descriptor.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Failed to resolve torrent source: {0}")]
    Source(#[from] SourceError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Metadata for torrent {info_hash} did not resolve within {waited:?}")]
    MetadataTimeout { info_hash: InfoHash, waited: Duration },
}

/// One registered torrent, summarized for operator display.
#[derive(Debug, Clone)]
pub struct TorrentSummary {
    pub info_hash: InfoHash,
    pub name: Option<String>,
    pub resolved: bool,
    pub file_count: usize,
    pub total_size: u64,
}

/// Process-wide gateway session.
pub struct Session {
    config: GatewayConfig,
    engine: Arc<dyn TorrentEngine>,
    registry: TorrentRegistry,
    media_gate: MediaGate,
    http_client: reqwest::Client,
}

impl Session {
    /// Creates a session over the production engine.
    ///
    /// Resolves and creates the storage directory, then starts the engine
    /// rooted there. The HTTP listener is started separately by the gateway
    /// so construction returns promptly.
    ///
    /// # Errors
    ///
    /// - `SessionError::EmptyProjectName` - If the configured project name is empty
    /// - `SessionError::NoStorageRoot` - If no cache root can be derived
    /// - `SessionError::StorageDir` - If the directory cannot be created
    /// - `SessionError::Engine` - If the engine fails to start
    pub async fn init(config: GatewayConfig) -> Result<Arc<Self>, SessionError> {
        let storage_dir = resolve_storage_dir(&config)?;
        let engine = RqbitEngine::new(engine_options(&config, storage_dir)).await?;
        Self::with_engine(config, engine)
    }

    /// Creates a session over a caller-supplied engine.
    ///
    /// The production path goes through [`Session::init`]; this exists for
    /// wiring in alternative engines, tests included.
    ///
    /// # Errors
    ///
    /// - `SessionError::HttpClient` - If the fetch client cannot be built
    pub fn with_engine(
        config: GatewayConfig,
        engine: Arc<dyn TorrentEngine>,
    ) -> Result<Arc<Self>, SessionError> {
        let media_gate = MediaGate::new(&config.media);
        let http_client = reqwest::Client::builder()
            .timeout(config.ingest.fetch_timeout)
            .build()?;
        Ok(Arc::new(Self {
            config,
            engine,
            registry: TorrentRegistry::new(),
            media_gate,
            http_client,
        }))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn media_gate(&self) -> &MediaGate {
        &self.media_gate
    }

    /// Ingests one torrent descriptor: magnet link, URL, or local path.
    ///
    /// The descriptor is classified, normalized (URLs are downloaded to a
    /// temp file that is removed before this returns), registered with the
    /// engine, tracked in the registry, and awaited until metadata resolves
    /// or the configured bound expires. A handle that times out stays
    /// registered; its metadata may still arrive later.
    ///
    /// # Errors
    ///
    /// - `IngestError::Source` - If a remote descriptor cannot be downloaded
    /// - `IngestError::Engine` - If the engine rejects the descriptor
    /// - `IngestError::MetadataTimeout` - If metadata misses the configured bound
    pub async fn ingest(&self, descriptor: &str) -> Result<Arc<dyn TorrentHandle>, IngestError> {
        let handle = match TorrentSource::classify(descriptor) {
            TorrentSource::Magnet(uri) => self.engine.add_magnet(&uri).await?,
            TorrentSource::RemoteUrl(url) => {
                let fetched = fetch_remote(&self.http_client, &url).await?;
                // `fetched` lives until registration is done, then the
                // downloaded file goes away with it.
                self.engine.add_metainfo_file(fetched.path()).await?
            }
            TorrentSource::LocalFile(path) => self.engine.add_metainfo_file(&path).await?,
        };

        let handle = self.registry.insert(handle).await;
        info!(info_hash = %handle.info_hash(), "Registered torrent");

        self.await_metadata(&handle).await?;
        Ok(handle)
    }

    /// Waits for a handle's metadata under the configured bound.
    ///
    /// With no bound configured the wait is indefinite, which an
    /// unresolvable torrent turns into a hang; callers opting into that
    /// accept the liveness risk.
    ///
    /// # Errors
    ///
    /// - `IngestError::MetadataTimeout` - If the bound expires first
    /// - `IngestError::Engine` - If the engine shuts down mid-wait
    pub async fn await_metadata(&self, handle: &Arc<dyn TorrentHandle>) -> Result<(), IngestError> {
        match self.config.ingest.metadata_timeout {
            None => handle.wait_metadata().await?,
            Some(bound) => {
                tokio::time::timeout(bound, handle.wait_metadata())
                    .await
                    .map_err(|_| IngestError::MetadataTimeout {
                        info_hash: handle.info_hash(),
                        waited: bound,
                    })??;
            }
        }
        Ok(())
    }

    /// Handle registered under `info_hash`, if any.
    pub async fn find_by_hash(&self, info_hash: InfoHash) -> Option<Arc<dyn TorrentHandle>> {
        self.registry.find_by_hash(info_hash).await
    }

    /// Removes one torrent from the engine and the registry.
    ///
    /// The engine is released first; when that fails the registry entry is
    /// kept, so lookups never lose a torrent that is still live in the
    /// engine.
    ///
    /// # Errors
    ///
    /// - `EngineError::TorrentNotFound` - If the hash is not registered
    pub async fn drop_torrent(&self, info_hash: InfoHash) -> Result<(), EngineError> {
        if self.registry.find_by_hash(info_hash).await.is_none() {
            return Err(EngineError::TorrentNotFound { info_hash });
        }
        self.engine.remove(info_hash).await?;
        self.registry.remove(info_hash).await;
        info!(%info_hash, "Dropped torrent");
        Ok(())
    }

    /// Summaries of every registered torrent.
    pub async fn list(&self) -> Vec<TorrentSummary> {
        let mut summaries = Vec::new();
        for handle in self.registry.all().await {
            let files = handle.files().ok();
            summaries.push(TorrentSummary {
                info_hash: handle.info_hash(),
                name: handle.name(),
                resolved: handle.metadata_ready(),
                file_count: files.as_ref().map_or(0, Vec::len),
                total_size: files
                    .as_ref()
                    .map_or(0, |f| f.iter().map(|e| e.length).sum()),
            });
        }
        summaries
    }

    /// Stream links for every gate-passing file of a resolved torrent.
    ///
    /// Links are in episode order and carry each file's 1-based episode
    /// index; files the media gate rejects get no link. `port` is the
    /// gateway's actually bound port, which can differ from the configured
    /// one when binding ephemerally.
    ///
    /// # Errors
    ///
    /// - `EngineError::MetadataNotResolved` - If metadata has not arrived yet
    pub fn stream_links(
        &self,
        handle: &dyn TorrentHandle,
        port: u16,
    ) -> Result<Vec<StreamLink>, EngineError> {
        let files = crate::index::sorted_files(handle.files()?);
        Ok(files
            .iter()
            .enumerate()
            .filter(|(_, file)| self.media_gate.check(file).is_ok())
            .map(|(position, _)| {
                StreamLink::new(
                    &self.config.http.host,
                    port,
                    handle.info_hash(),
                    position + 1,
                )
            })
            .collect())
    }

    /// Shuts the engine down, releasing all peer connections.
    ///
    /// # Errors
    ///
    /// - `EngineError::Backend` - If engine teardown fails
    pub async fn close(&self) -> Result<(), EngineError> {
        self.registry.clear().await;
        self.engine.close().await?;
        info!("Session closed");
        Ok(())
    }
}

/// Engine settings derived from the gateway configuration.
fn engine_options(config: &GatewayConfig, storage_dir: PathBuf) -> EngineOptions {
    EngineOptions {
        storage_dir,
        peer_port: config.peer_port(),
        disable_ipv6: config.engine.disable_ipv6,
        seed: config.engine.seed,
    }
}

/// Storage root for the engine's piece storage.
///
/// An explicit override wins; otherwise one directory per project name under
/// the user's cache root (`XDG_CACHE_HOME`, falling back to `~/.cache`).
fn resolve_storage_dir(config: &GatewayConfig) -> Result<PathBuf, SessionError> {
    if config.engine.project_name.trim().is_empty() {
        return Err(SessionError::EmptyProjectName);
    }

    let dir = match &config.engine.storage_dir {
        Some(dir) => dir.clone(),
        None => {
            let cache_root = std::env::var_os("XDG_CACHE_HOME")
                .map(PathBuf::from)
                .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
                .ok_or(SessionError::NoStorageRoot)?;
            cache_root.join(&config.engine.project_name)
        }
    };

    std::fs::create_dir_all(&dir).map_err(|source| {
        warn!(path = %dir.display(), "Failed to create storage directory");
        SessionError::StorageDir {
            path: dir.clone(),
            source,
        }
    })?;
    Ok(dir)
}
