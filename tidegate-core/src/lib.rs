//! Tidegate Core - Torrent ingestion, indexing, and session management
//!
//! This crate provides everything beneath the HTTP layer of the
//! torrent-to-HTTP streaming gateway: the engine seam and its adapters,
//! descriptor classification and remote fetching, deterministic episode
//! indexing, the streamable-media gate, the hash-keyed torrent registry,
//! and the process-wide session that owns it all.

pub mod config;
pub mod engine;
pub mod index;
pub mod link;
pub mod media;
pub mod registry;
pub mod session;
pub mod source;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::GatewayConfig;
pub use engine::{EngineError, InfoHash, TorrentEngine, TorrentFileEntry, TorrentHandle};
pub use index::{IndexError, resolve_episode, sorted_files};
pub use link::StreamLink;
pub use media::{MediaError, MediaGate};
pub use session::{IngestError, Session, SessionError, TorrentSummary};
pub use source::TorrentSource;
