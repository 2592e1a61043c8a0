//! Stream locator formatting.
//!
//! A [`StreamLink`] is a stateless value: a URL naming an (info hash,
//! episode) pair on some gateway. Nothing is validated at formatting time;
//! the gateway checks everything when the link is dereferenced.

use std::fmt;

use crate::engine::InfoHash;

/// Locator for one streamable file: `http://<host>:<port>/stream?hash=<hex>&ep=<n>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLink {
    pub host: String,
    pub port: u16,
    pub info_hash: InfoHash,
    /// 1-based episode index.
    pub episode: usize,
}

impl StreamLink {
    pub fn new(host: &str, port: u16, info_hash: InfoHash, episode: usize) -> Self {
        Self {
            host: host.to_string(),
            port,
            info_hash,
            episode,
        }
    }
}

impl fmt::Display for StreamLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "http://{}:{}/stream?hash={}&ep={}",
            self.host, self.port, self.info_hash, self.episode
        )
    }
}
