//! Streamable-media policy: extension allow-list and content types.
//!
//! The gate decides whether an indexed file may be streamed at all; the
//! content type for the response comes from a per-extension lookup rather
//! than one fixed media type.

use std::collections::HashSet;

use crate::config::MediaConfig;
use crate::engine::TorrentFileEntry;

/// Errors from the media gate.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("Unsupported media type for {path}")]
    UnsupportedMediaType { path: String },
}

/// Allow-list gate over file extensions.
///
/// Matching is case-sensitive against the extension exactly as it appears
/// in the torrent, with no dot.
#[derive(Debug, Clone)]
pub struct MediaGate {
    allowed: HashSet<String>,
}

impl MediaGate {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            allowed: config.allowed_extensions.iter().cloned().collect(),
        }
    }

    /// Passes the file through unchanged when its extension is allowed.
    ///
    /// # Errors
    ///
    /// - `MediaError::UnsupportedMediaType` - If the file has no extension or
    ///   an extension outside the allow-list
    pub fn check<'a>(&self, file: &'a TorrentFileEntry) -> Result<&'a TorrentFileEntry, MediaError> {
        let allowed = extension(&file.path).is_some_and(|ext| self.allowed.contains(ext));
        if allowed {
            Ok(file)
        } else {
            Err(MediaError::UnsupportedMediaType {
                path: file.path.clone(),
            })
        }
    }
}

/// Extension of the final path segment, without the dot.
fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next()?;
    match name.rsplit_once('.') {
        Some(("", _)) | None => None,
        Some((_, ext)) => Some(ext),
    }
}

/// Content type for a file path, falling back to octet-stream.
pub fn content_type(path: &str) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}
