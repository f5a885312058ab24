//! Blob routes
//!
//! Serve the presigned URLs minted by `LocalObjectStore`. Requests carry no
//! credentials beyond the URL signature.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_RANGE, ETAG, RANGE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, warn};

use super::handlers::AppState;
use crate::models::ErrorResponse;
use crate::storage::{BlobParams, StorageError};

/// A blob request failure rendered with the blob-specific status.
#[derive(Debug)]
pub struct BlobError(StorageError);

impl From<StorageError> for BlobError {
    fn from(err: StorageError) -> Self {
        BlobError(err)
    }
}

impl BlobError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            StorageError::Signature(_) | StorageError::Expired => StatusCode::FORBIDDEN,
            StorageError::NotFound(_) | StorageError::NoSuchUpload(_) => StatusCode::NOT_FOUND,
            StorageError::InvalidPart(_) | StorageError::ChecksumMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            StorageError::InvalidRange(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            StorageError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BlobError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!(status = status.as_u16(), error = %self.0, "blob request rejected");
        let code = match status {
            StatusCode::FORBIDDEN => "permission_denied",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::INTERNAL_SERVER_ERROR => "internal",
            _ => "invalid_argument",
        };
        (status, Json(ErrorResponse::new(code, "blob request failed"))).into_response()
    }
}

/// Parses `bytes=start-end` or `bytes=start-` (inclusive end).
fn parse_range(value: &str) -> Option<(u64, u64)> {
    let spec = value.trim().strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = match end.trim() {
        "" => u64::MAX,
        end => end.parse().ok()?,
    };
    Some((start, end))
}

/// Handler for PUT /blobs/:key
///
/// Stores a whole object, or one part when the URL names an upload id and
/// part number. Replies with the stored bytes' ETag.
pub async fn put_blob_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<BlobParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, BlobError> {
    if !headers.contains_key(CONTENT_LENGTH) {
        return Ok((
            StatusCode::LENGTH_REQUIRED,
            Json(ErrorResponse::new("invalid_argument", "content length required")),
        )
            .into_response());
    }
    state.blobs.verify("PUT", &key, &params)?;

    let etag = match (params.upload_id.as_deref(), params.part_number) {
        (Some(upload_id), Some(part)) => {
            state.blobs.upload_part(&key, upload_id, part, body).await?
        }
        _ => {
            state
                .blobs
                .put_object(
                    &key,
                    body,
                    params.checksum.as_deref(),
                    params.compression.as_deref().unwrap_or(""),
                )
                .await?
        }
    };

    debug!(key = %key, part = ?params.part_number, "blob stored");
    Ok((StatusCode::OK, [(ETAG, etag)]).into_response())
}

/// Handler for GET /blobs/:key
///
/// Honours a `Range` header, replying 206 with `Content-Range`. A URL
/// presigned for a range only serves that range.
pub async fn get_blob_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<BlobParams>,
    headers: HeaderMap,
) -> Result<Response, BlobError> {
    state.blobs.verify("GET", &key, &params)?;

    let requested = headers.get(RANGE).and_then(|v| v.to_str().ok());
    let range = match (params.range.as_deref(), requested) {
        (Some(signed), Some(header)) => {
            let header = header.trim().trim_start_matches("bytes=");
            if signed != header {
                return Err(StorageError::Signature(format!(
                    "range {} outside signed range {}",
                    header, signed
                ))
                .into());
            }
            parse_range(&format!("bytes={}", signed))
        }
        (Some(signed), None) => parse_range(&format!("bytes={}", signed)),
        (None, Some(header)) => Some(
            parse_range(header)
                .ok_or_else(|| StorageError::InvalidRange(header.to_string()))?,
        ),
        (None, None) => None,
    };

    let read = state.blobs.read_object(&key, range).await?;
    match read.range {
        Some((start, end)) => Ok((
            StatusCode::PARTIAL_CONTENT,
            [
                (ETAG, read.etag),
                (
                    CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, read.total_size),
                ),
            ],
            read.data,
        )
            .into_response()),
        None => Ok((StatusCode::OK, [(ETAG, read.etag)], read.data).into_response()),
    }
}
