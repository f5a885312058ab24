//! Object Storage Module
//!
//! The object-store contract consumed by the planner and coordinator, and a
//! local in-process implementation whose presigned URLs are served by the
//! `/blobs` routes.

mod local;
mod signing;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::CacheError;
use crate::models::Offset;

pub use local::{LocalObjectStore, ObjectRead};
pub use signing::{BlobParams, UrlSigner};

// == Storage Error ==
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("no such upload: {0}")]
    NoSuchUpload(String),

    #[error("invalid part: {0}")]
    InvalidPart(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("signature rejected: {0}")]
    Signature(String),

    #[error("presigned url expired")]
    Expired,

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for CacheError {
    fn from(err: StorageError) -> Self {
        CacheError::Internal(format!("object store: {}", err))
    }
}

// == Object Types ==
/// Attributes recorded with an uploaded object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectAttributes {
    pub sha256: String,
    pub compression: String,
}

/// Result of a head-object call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    pub sha256: Option<String>,
    pub compression: Option<String>,
}

/// One part listed in a multipart completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part: u32,
    pub etag: String,
}

// == Object Store Trait ==
/// Backing object store: presigning, multipart lifecycle and head.
///
/// Store limits (part count, part size) are properties of the backend and
/// are not enforced by callers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Presigned URL for a single PUT of the whole object.
    async fn presign_put(
        &self,
        key: &str,
        attributes: &ObjectAttributes,
    ) -> Result<String, StorageError>;

    /// Presigned URL for a GET, optionally scoped to a byte range.
    async fn presign_get(&self, key: &str, range: Option<Offset>)
        -> Result<String, StorageError>;

    /// Opens a multipart upload and returns its id.
    async fn create_multipart_upload(
        &self,
        key: &str,
        attributes: &ObjectAttributes,
    ) -> Result<String, StorageError>;

    /// Presigned URL for uploading one part of an open multipart upload.
    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part: u32,
    ) -> Result<String, StorageError>;

    /// Finalises a multipart upload. `parts` must be in ascending part order.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StorageError>;

    /// Returns object metadata, or None if the object does not exist.
    async fn head_object(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError>;

    /// Backend identifier for logging
    fn name(&self) -> &str;
}
