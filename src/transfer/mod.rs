//! Part Transfer Module
//!
//! Client-side execution of the presigned instructions handed out by the
//! planner: a bounded worker pool with per-part retry, and upload/download
//! jobs built on it.

mod download;
mod engine;
mod retry;
mod upload;

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::info;

use crate::error::CacheError;
use crate::models::Offset;

pub use download::{assemble, DownloadedPart, Downloader};
pub use engine::TransferEngine;
pub use retry::RetryPolicy;
pub use upload::{UploadedPart, Uploader};

/// Parts in flight at once when the caller does not choose.
pub const DEFAULT_CONCURRENCY: usize = 20;

// == Transfer Error ==
#[derive(Debug, Error)]
pub enum TransferError {
    /// Client-side rejection that no retry can fix
    #[error("object store rejected request: HTTP {status}")]
    Permanent { status: u16 },

    #[error("object store returned HTTP {status}")]
    Status { status: u16 },

    #[error("network error: {0}")]
    Network(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer cancelled")]
    Cancelled,

    #[error("part {0} response carried no ETag")]
    MissingEtag(u32),

    #[error("part {part} has an unusable byte range {start}-{end}")]
    InvalidOffset { part: u32, start: u64, end: u64 },

    #[error("transfer task failed: {0}")]
    Task(String),
}

impl TransferError {
    /// Classifies a non-success response status.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN | StatusCode::LENGTH_REQUIRED => {
                TransferError::Permanent {
                    status: status.as_u16(),
                }
            }
            _ => TransferError::Status {
                status: status.as_u16(),
            },
        }
    }

    pub(crate) fn invalid_offset(offset: &Offset) -> Self {
        TransferError::InvalidOffset {
            part: offset.part,
            start: offset.start,
            end: offset.end,
        }
    }

    /// Whether retrying the same request is pointless.
    pub fn is_permanent(&self) -> bool {
        !matches!(
            self,
            TransferError::Status { .. } | TransferError::Network(_)
        )
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        TransferError::Network(err.to_string())
    }
}

impl From<TransferError> for CacheError {
    fn from(err: TransferError) -> Self {
        CacheError::Internal(format!("transfer: {}", err))
    }
}

fn log_throughput(direction: &'static str, parts: usize, bytes: u64, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let bytes_per_sec = if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        bytes
    };
    info!(
        direction,
        parts,
        bytes,
        elapsed_ms = elapsed.as_millis() as u64,
        bytes_per_sec,
        "transfer complete"
    );
}
