//! The `/stream` handler: (info hash, episode) to live file stream.
//!
//! Per request: validate `hash` and `ep`, look the handle up in the
//! session's registry, wait (bounded) on that one handle's metadata if it is
//! not resolved yet, index the file set, pass the media gate, and hand the
//! stream to the content server. Every failure maps to an explicit status;
//! nothing is silently dropped.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tidegate_core::engine::EngineError;
use tidegate_core::index::IndexError;
use tidegate_core::media::MediaError;
use tidegate_core::session::IngestError;
use tidegate_core::{InfoHash, resolve_episode, sorted_files};
use tracing::{debug, warn};

use crate::content;
use crate::server::AppState;

/// Query parameters of `GET /stream`.
///
/// Both arrive as raw strings so validation (trimming, numeric parsing,
/// positivity) stays in the handler and maps to the statuses below instead
/// of the extractor's defaults.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    hash: Option<String>,
    ep: Option<String>,
}

/// Request-time streaming failures.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Missing or empty hash parameter")]
    MissingHash,

    #[error("Invalid hash parameter: {reason}")]
    InvalidHash { reason: String },

    #[error("Missing, non-numeric, or non-positive ep parameter")]
    InvalidEpisode,

    #[error("Torrent {info_hash} not found")]
    TorrentNotFound { info_hash: InfoHash },

    #[error("Episode not found: {0}")]
    EpisodeNotFound(#[from] IndexError),

    #[error(transparent)]
    NotStreamable(#[from] MediaError),

    #[error("Metadata for torrent {info_hash} is not resolved yet")]
    MetadataPending { info_hash: InfoHash, retry_after: u64 },

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Failed to serve content")]
    Content(StatusCode),
}

impl IntoResponse for StreamError {
    fn into_response(self) -> Response {
        let status = match &self {
            StreamError::MissingHash
            | StreamError::InvalidHash { .. }
            | StreamError::InvalidEpisode => StatusCode::BAD_REQUEST,
            StreamError::TorrentNotFound { .. } | StreamError::EpisodeNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            StreamError::NotStreamable(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            StreamError::MetadataPending { .. } => StatusCode::SERVICE_UNAVAILABLE,
            StreamError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StreamError::Content(status) => *status,
        };

        if status.is_server_error() {
            warn!(%status, error = %self, "Stream request failed");
        } else {
            debug!(%status, error = %self, "Stream request rejected");
        }

        let mut response = (status, self.to_string()).into_response();
        if let StreamError::MetadataPending { retry_after, .. } = self {
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// `GET /stream?hash=<hex-info-hash>&ep=<1-based-index>`
pub async fn stream_handler(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, StreamError> {
    // Hash values pasted from shells and playlists often carry whitespace or
    // a trailing newline.
    let hash = query.hash.unwrap_or_default();
    let hash = hash.trim();
    if hash.is_empty() {
        return Err(StreamError::MissingHash);
    }
    let info_hash =
        InfoHash::from_hex(hash).map_err(|e| StreamError::InvalidHash {
            reason: e.to_string(),
        })?;

    let episode: i64 = query
        .ep
        .as_deref()
        .map(str::trim)
        .and_then(|ep| ep.parse().ok())
        .ok_or(StreamError::InvalidEpisode)?;
    if episode < 1 {
        return Err(StreamError::InvalidEpisode);
    }

    let session = &state.session;
    let handle = session
        .find_by_hash(info_hash)
        .await
        .ok_or(StreamError::TorrentNotFound { info_hash })?;

    // Wait only on the requested torrent, never on unrelated ones, and only
    // under the configured bound.
    if !handle.metadata_ready() {
        session.await_metadata(&handle).await.map_err(|e| match e {
            IngestError::MetadataTimeout { waited, .. } => StreamError::MetadataPending {
                info_hash,
                retry_after: waited.as_secs().max(1),
            },
            IngestError::Engine(engine) => StreamError::Engine(engine),
            IngestError::Source(source) => StreamError::Engine(EngineError::Backend {
                reason: source.to_string(),
            }),
        })?;
    }

    let files = sorted_files(handle.files()?);
    let file = resolve_episode(&files, episode)?;
    session.media_gate().check(file)?;

    let stream = handle.open_stream(file.file_id).await?;
    let display_name = file.path.rsplit('/').next().unwrap_or(&file.path);
    debug!(%info_hash, episode, file = display_name, "Streaming torrent file");

    content::serve(&headers, display_name, file.length, handle.added_at(), stream)
        .await
        .map_err(StreamError::Content)
}
