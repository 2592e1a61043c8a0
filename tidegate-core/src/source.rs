//! Torrent descriptor classification and remote metainfo fetching.
//!
//! A descriptor names a torrent one of three ways: a magnet link, a URL to a
//! `.torrent` file, or a local filesystem path. URLs are normalized into the
//! local-file case by downloading into a temp directory scoped to the
//! ingestion call, so the downloaded file disappears on every exit path.

use std::path::PathBuf;

use futures::StreamExt;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

/// Classified torrent descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentSource {
    /// Magnet link, handed to the engine as-is.
    Magnet(String),
    /// URL of a remote `.torrent` file, downloaded before registration.
    RemoteUrl(String),
    /// Path to a local `.torrent` metainfo file.
    LocalFile(PathBuf),
}

impl TorrentSource {
    /// Classifies a raw descriptor string.
    ///
    /// The magnet scheme prefix always wins, even when the descriptor also
    /// contains "http" (magnet links routinely embed tracker URLs). Anything
    /// unrecognized falls through to the local-file case and fails later with
    /// the engine's file-not-found.
    pub fn classify(descriptor: &str) -> Self {
        if descriptor.starts_with("magnet:") {
            Self::Magnet(descriptor.to_string())
        } else if descriptor.contains("http") {
            Self::RemoteUrl(descriptor.to_string())
        } else {
            Self::LocalFile(PathBuf::from(descriptor))
        }
    }
}

/// Errors from resolving a torrent source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Invalid torrent URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to fetch torrent: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// A `.torrent` file downloaded from a URL.
///
/// Holds the temp directory it lives in; dropping this value removes the
/// file. Keep it alive until the engine has consumed the metainfo.
#[derive(Debug)]
pub struct FetchedTorrent {
    path: PathBuf,
    _dir: TempDir,
}

impl FetchedTorrent {
    /// Path of the downloaded metainfo file.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

/// File name a download lands under, taken from the URL path.
fn remote_file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.last().map(str::to_string))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "download.torrent".to_string())
}

/// Downloads a remote `.torrent` file into a fresh temp directory.
///
/// The response body is streamed to disk chunk by chunk rather than buffered
/// whole.
///
/// # Errors
///
/// - `SourceError::InvalidUrl` - If the descriptor is not a parseable URL
/// - `SourceError::Http` - If the GET fails or returns a non-success status
/// - `SourceError::Io` - If the temp file cannot be created or written
pub async fn fetch_remote(
    client: &reqwest::Client,
    url: &str,
) -> Result<FetchedTorrent, SourceError> {
    let parsed = Url::parse(url).map_err(|e| SourceError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let file_name = remote_file_name(&parsed);

    let dir = TempDir::new()?;
    let path = dir.path().join(&file_name);

    let response = client.get(parsed).send().await?.error_for_status()?;
    let mut file = tokio::fs::File::create(&path).await?;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    debug!(url, file = %path.display(), "Fetched remote torrent");
    Ok(FetchedTorrent { path, _dir: dir })
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[test]
    fn test_magnet_prefix_always_wins() {
        let descriptor = "magnet:?xt=urn:btih:abc&tr=http://tracker.example/announce";
        assert_eq!(
            TorrentSource::classify(descriptor),
            TorrentSource::Magnet(descriptor.to_string())
        );
    }

    #[test]
    fn test_http_substring_classifies_as_remote() {
        let descriptor = "https://example.com/files/show.torrent";
        assert_eq!(
            TorrentSource::classify(descriptor),
            TorrentSource::RemoteUrl(descriptor.to_string())
        );
    }

    #[test]
    fn test_plain_path_classifies_as_local_file() {
        assert_eq!(
            TorrentSource::classify("/downloads/show.torrent"),
            TorrentSource::LocalFile(PathBuf::from("/downloads/show.torrent"))
        );
        // Unrecognized garbage falls through to the local-file case.
        assert_eq!(
            TorrentSource::classify("not a torrent"),
            TorrentSource::LocalFile(PathBuf::from("not a torrent"))
        );
    }

    #[test]
    fn test_remote_file_name_from_url() {
        let url = Url::parse("http://example.com/dir/show.torrent?key=1").unwrap();
        assert_eq!(remote_file_name(&url), "show.torrent");

        let bare = Url::parse("http://example.com/").unwrap();
        assert_eq!(remote_file_name(&bare), "download.torrent");
    }

    /// One-shot HTTP server returning a fixed response for the next request.
    async fn serve_once(status_line: &'static str, body: &'static [u8]) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "{status_line}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_fetch_remote_streams_to_scoped_file() {
        let addr = serve_once("HTTP/1.1 200 OK", b"d8:announce0:e").await;
        let client = reqwest::Client::new();
        let url = format!("http://{addr}/linked.torrent");

        let fetched = fetch_remote(&client, &url).await.unwrap();
        assert_eq!(
            fetched.path().file_name().unwrap().to_str().unwrap(),
            "linked.torrent"
        );
        let contents = tokio::fs::read(fetched.path()).await.unwrap();
        assert_eq!(contents, b"d8:announce0:e");

        // Dropping the fetch removes the downloaded file.
        let path = fetched.path().to_path_buf();
        drop(fetched);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_fetch_remote_surfaces_http_failure() {
        let addr = serve_once("HTTP/1.1 404 Not Found", b"").await;
        let client = reqwest::Client::new();
        let url = format!("http://{addr}/missing.torrent");

        let result = fetch_remote(&client, &url).await;
        assert!(matches!(result, Err(SourceError::Http(_))));
    }

    #[tokio::test]
    async fn test_fetch_remote_rejects_unparseable_url() {
        let client = reqwest::Client::new();
        let result = fetch_remote(&client, "not-http-at-all").await;
        assert!(matches!(result, Err(SourceError::InvalidUrl { .. })));
    }
}
