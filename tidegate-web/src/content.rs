//! Range-capable content serving over engine file streams.
//!
//! Implements the subset of RFC 7233 a seeking media player needs: one
//! `bytes=` range per request, partial-content responses with correct
//! Content-Range, 416 for unsatisfiable ranges, and If-Modified-Since
//! conditional GETs keyed on the torrent's timestamp. Bodies are streamed,
//! never buffered whole.

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;
use chrono::{DateTime, Utc};
use tidegate_core::engine::MediaStream;
use tidegate_core::media;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Outcome of parsing a Range header against a file's total size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// No usable range; serve the whole file.
    Full,
    /// Inclusive byte slice to serve as partial content.
    Slice { start: u64, end: u64 },
    /// Syntactically valid but outside the file; answer 416.
    Unsatisfiable,
}

/// Parses a single-range `bytes=` header.
///
/// Malformed headers and multi-range requests fall back to serving the full
/// file; only a well-formed range that lies entirely past the end is
/// unsatisfiable.
pub fn parse_range(header: Option<&str>, total_size: u64) -> RangeSpec {
    let Some(spec) = header.and_then(|value| value.strip_prefix("bytes=")) else {
        return RangeSpec::Full;
    };
    if spec.contains(',') {
        return RangeSpec::Full;
    }
    let Some((start_str, end_str)) = spec.split_once('-') else {
        return RangeSpec::Full;
    };

    if start_str.is_empty() {
        // Suffix form: last `n` bytes.
        let Ok(suffix) = end_str.parse::<u64>() else {
            return RangeSpec::Full;
        };
        if suffix == 0 || total_size == 0 {
            return RangeSpec::Unsatisfiable;
        }
        return RangeSpec::Slice {
            start: total_size.saturating_sub(suffix),
            end: total_size - 1,
        };
    }

    let Ok(start) = start_str.parse::<u64>() else {
        return RangeSpec::Full;
    };
    if start >= total_size {
        return RangeSpec::Unsatisfiable;
    }
    let end = if end_str.is_empty() {
        total_size - 1
    } else {
        match end_str.parse::<u64>() {
            Ok(end) if end >= start => end.min(total_size - 1),
            _ => return RangeSpec::Full,
        }
    };
    RangeSpec::Slice { start, end }
}

fn http_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format(HTTP_DATE_FORMAT).to_string()
}

/// Whether `If-Modified-Since` makes the response a 304.
///
/// Timestamps are compared at second precision, matching the resolution of
/// the date format on the wire.
fn not_modified(headers: &HeaderMap, modified: DateTime<Utc>) -> bool {
    headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
        .is_some_and(|since| modified.timestamp() <= since.timestamp())
}

/// Serves one torrent file with range and conditional-GET support.
///
/// `name` drives the content type and download file name; `modified` is the
/// torrent's timestamp used for caching headers.
///
/// # Errors
///
/// - `StatusCode::INTERNAL_SERVER_ERROR` - If seeking the stream or
///   assembling the response fails
pub async fn serve(
    headers: &HeaderMap,
    name: &str,
    length: u64,
    modified: DateTime<Utc>,
    mut stream: Box<dyn MediaStream>,
) -> Result<Response, StatusCode> {
    if not_modified(headers, modified) {
        return Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::LAST_MODIFIED, http_date(modified))
            .body(Body::empty())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR);
    }

    let range_header = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    let builder = Response::builder()
        .header(header::CONTENT_TYPE, media::content_type(name))
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::LAST_MODIFIED, http_date(modified))
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{name}\""),
        );

    match parse_range(range_header, length) {
        RangeSpec::Unsatisfiable => Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{length}"))
            .body(Body::empty())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR),
        RangeSpec::Full => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, length.to_string())
            .body(Body::from_stream(ReaderStream::new(stream.take(length))))
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR),
        RangeSpec::Slice { start, end } => {
            stream
                .seek(std::io::SeekFrom::Start(start))
                .await
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            let content_length = end - start + 1;
            debug!(name, start, end, "Serving partial content");
            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_LENGTH, content_length.to_string())
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{end}/{length}"),
                )
                .body(Body::from_stream(ReaderStream::new(
                    stream.take(content_length),
                )))
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
