//! Transfer Planner
//!
//! Splits an object of known size into parts and asks the object store for
//! one presigned instruction per part.
//!
//! Part offsets use inclusive `end` everywhere: part `n` covers
//! `[(n-1) * part_size, min(n * part_size, total) - 1]`.

use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{Offset, TransferInstruction, TransferMethod};
use crate::storage::{ObjectAttributes, ObjectStore};

/// Smallest part most object stores accept for multipart uploads (5 MiB).
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Typical backend limit on parts per multipart upload.
pub const MAX_PARTS: usize = 10_000;

/// Typical backend limit on a single part's size (5 GiB).
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Upload plan: instructions plus the multipart upload they belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPlan {
    pub multipart_upload_id: Option<String>,
    pub instructions: Vec<TransferInstruction>,
}

impl UploadPlan {
    pub fn is_multipart(&self) -> bool {
        self.multipart_upload_id.is_some()
    }
}

/// Partitions `[0, total_size)` into consecutive inclusive spans of
/// `part_size` bytes; the last one may be shorter.
///
/// Returns an empty list when `total_size` is below `part_size`, meaning the
/// object is transferred unpartitioned.
pub fn partition(total_size: u64, part_size: u64) -> Vec<Offset> {
    if part_size == 0 || total_size < part_size {
        return Vec::new();
    }

    let mut offsets = Vec::with_capacity(total_size.div_ceil(part_size) as usize);
    let mut start = 0u64;
    let mut part = 1u32;
    while start < total_size {
        let end = (start + part_size).min(total_size) - 1;
        offsets.push(Offset { part, start, end });
        start = end + 1;
        part += 1;
    }
    offsets
}

// == Transfer Planner ==
#[derive(Clone)]
pub struct TransferPlanner {
    objects: Arc<dyn ObjectStore>,
    part_size: u64,
}

impl TransferPlanner {
    pub fn new(objects: Arc<dyn ObjectStore>, part_size: u64) -> Self {
        if part_size > MAX_PART_SIZE {
            warn!(part_size, "part size exceeds the usual backend limit");
        }
        Self { objects, part_size }
    }

    /// Plans an upload. Objects smaller than the part size get exactly one
    /// unpartitioned PUT; larger objects open a multipart upload with one
    /// PUT per part. Any presign failure aborts the whole plan.
    pub async fn plan_upload(
        &self,
        key: &str,
        checksum: &str,
        compression: &str,
        total_size: u64,
    ) -> Result<UploadPlan> {
        let attributes = ObjectAttributes {
            sha256: checksum.to_string(),
            compression: compression.to_string(),
        };

        let offsets = partition(total_size, self.part_size);
        if offsets.is_empty() {
            let url = self.objects.presign_put(key, &attributes).await?;
            return Ok(UploadPlan {
                multipart_upload_id: None,
                instructions: vec![TransferInstruction {
                    method: TransferMethod::Put,
                    url,
                    offset: None,
                }],
            });
        }

        if offsets.len() > MAX_PARTS {
            warn!(
                parts = offsets.len(),
                "upload exceeds the usual backend part limit"
            );
        }

        let upload_id = self
            .objects
            .create_multipart_upload(key, &attributes)
            .await?;

        let instructions = try_join_all(offsets.into_iter().map(|offset| {
            let upload_id = upload_id.as_str();
            async move {
                let url = self
                    .objects
                    .presign_upload_part(key, upload_id, offset.part)
                    .await?;
                Ok::<_, crate::storage::StorageError>(TransferInstruction {
                    method: TransferMethod::Put,
                    url,
                    offset: Some(offset),
                })
            }
        }))
        .await?;

        debug!(key, parts = instructions.len(), "planned multipart upload");
        Ok(UploadPlan {
            multipart_upload_id: Some(upload_id),
            instructions,
        })
    }

    /// Plans a download as one GET, or one ranged GET per part.
    pub async fn plan_download(
        &self,
        key: &str,
        total_size: u64,
    ) -> Result<Vec<TransferInstruction>> {
        let offsets = partition(total_size, self.part_size);
        if offsets.is_empty() {
            let url = self.objects.presign_get(key, None).await?;
            return Ok(vec![TransferInstruction {
                method: TransferMethod::Get,
                url,
                offset: None,
            }]);
        }

        let instructions = try_join_all(offsets.into_iter().map(|offset| async move {
            let url = self.objects.presign_get(key, Some(offset)).await?;
            Ok::<_, crate::storage::StorageError>(TransferInstruction {
                method: TransferMethod::Get,
                url,
                offset: Some(offset),
            })
        }))
        .await?;

        Ok(instructions)
    }
}
