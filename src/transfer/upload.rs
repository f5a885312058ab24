use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use reqwest::header::ETAG;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{log_throughput, TransferEngine, TransferError};
use crate::models::{MultipartEtag, Offset, TransferInstruction};

/// Outcome of one uploaded part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    pub part: u32,
    pub etag: String,
    pub bytes: u64,
}

impl From<&UploadedPart> for MultipartEtag {
    fn from(part: &UploadedPart) -> Self {
        MultipartEtag {
            etag: part.etag.clone(),
            part: part.part,
            part_size: part.bytes,
        }
    }
}

// == Uploader ==
#[derive(Debug, Clone)]
pub struct Uploader {
    client: reqwest::Client,
    engine: TransferEngine,
}

impl Uploader {
    pub fn new(client: reqwest::Client, engine: TransferEngine) -> Self {
        Self { client, engine }
    }

    /// PUTs the spans of `path` named by `instructions`.
    ///
    /// Each part opens the file on its own and reads only its span.
    pub async fn upload(
        &self,
        path: &Path,
        instructions: Vec<TransferInstruction>,
    ) -> Result<Vec<UploadedPart>, TransferError> {
        let started = Instant::now();
        let path = Arc::new(path.to_path_buf());
        let client = self.client.clone();

        let parts = self
            .engine
            .execute(instructions, move |instruction| {
                let client = client.clone();
                let path = Arc::clone(&path);
                async move { upload_part(&client, &path, instruction).await }
            })
            .await?;

        let bytes = parts.iter().map(|p| p.bytes).sum();
        log_throughput("upload", parts.len(), bytes, started.elapsed());
        Ok(parts)
    }
}

async fn upload_part(
    client: &reqwest::Client,
    path: &Path,
    instruction: TransferInstruction,
) -> Result<UploadedPart, TransferError> {
    let part = instruction.part();
    let body = read_span(path, instruction.offset).await?;
    let bytes = body.len() as u64;

    let response = client.put(&instruction.url).body(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransferError::from_status(status));
    }

    let etag = response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or(TransferError::MissingEtag(part))?;

    Ok(UploadedPart { part, etag, bytes })
}

/// Reads exactly the bytes of `offset`, or the whole file when unpartitioned.
pub(crate) async fn read_span(path: &Path, offset: Option<Offset>) -> Result<Vec<u8>, TransferError> {
    let mut file = File::open(path).await?;
    match offset {
        None => {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf).await?;
            Ok(buf)
        }
        Some(offset) => {
            let len = offset
                .byte_len()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| TransferError::invalid_offset(&offset))?;
            file.seek(SeekFrom::Start(offset.start)).await?;
            let mut buf = vec![0u8; len];
            file.read_exact(&mut buf).await?;
            Ok(buf)
        }
    }
}
