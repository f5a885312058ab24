use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{ETAG, RANGE};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use super::{log_throughput, TransferEngine, TransferError};
use crate::models::TransferInstruction;

/// One part written to the work directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedPart {
    pub part: u32,
    pub etag: Option<String>,
    pub size: u64,
    pub path: PathBuf,
}

// == Downloader ==
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    engine: TransferEngine,
    work_dir: PathBuf,
}

impl Downloader {
    /// Creates a downloader writing part files under `work_dir`.
    pub fn new(client: reqwest::Client, engine: TransferEngine, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            engine,
            work_dir: work_dir.into(),
        }
    }

    /// GETs every instruction into its own file, in parallel.
    pub async fn download(
        &self,
        instructions: Vec<TransferInstruction>,
    ) -> Result<Vec<DownloadedPart>, TransferError> {
        fs::create_dir_all(&self.work_dir).await?;

        let started = Instant::now();
        let client = self.client.clone();
        let work_dir = Arc::new(self.work_dir.clone());

        let parts = self
            .engine
            .execute(instructions, move |instruction| {
                let client = client.clone();
                let work_dir = Arc::clone(&work_dir);
                async move {
                    let target = work_dir.join(format!("part-{}-{}", instruction.part(), Uuid::new_v4()));
                    let result = download_part(&client, &target, &instruction).await;
                    if result.is_err() {
                        let _ = fs::remove_file(&target).await;
                    }
                    result
                }
            })
            .await?;

        let bytes = parts.iter().map(|p| p.size).sum();
        log_throughput("download", parts.len(), bytes, started.elapsed());
        Ok(parts)
    }
}

async fn download_part(
    client: &reqwest::Client,
    target: &Path,
    instruction: &TransferInstruction,
) -> Result<DownloadedPart, TransferError> {
    let part = instruction.part();
    let mut request = client.get(&instruction.url);
    if let Some(offset) = instruction.offset {
        request = request.header(RANGE, offset.range_header());
    }

    let mut response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransferError::from_status(status));
    }
    let etag = response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut file = File::create(target).await?;
    let mut size = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        size += chunk.len() as u64;
    }
    file.flush().await?;

    if let Some(offset) = instruction.offset {
        let expected = offset.byte_len().ok_or_else(|| TransferError::invalid_offset(&offset))?;
        if size != expected {
            return Err(TransferError::Network(format!(
                "part {}: expected {} bytes, received {}",
                part, expected, size
            )));
        }
    }

    debug!(part, size, "part downloaded");
    Ok(DownloadedPart {
        part,
        etag,
        size,
        path: target.to_path_buf(),
    })
}

/// Concatenates part files in part order into `destination`, removing each
/// part file once copied. Returns the assembled length.
pub async fn assemble(parts: &[DownloadedPart], destination: &Path) -> Result<u64, TransferError> {
    let mut ordered: Vec<&DownloadedPart> = parts.iter().collect();
    ordered.sort_by_key(|p| p.part);

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut out = File::create(destination).await?;
    let mut total = 0u64;
    for part in ordered {
        let mut source = File::open(&part.path).await?;
        total += tokio::io::copy(&mut source, &mut out).await?;
        fs::remove_file(&part.path).await?;
    }
    out.flush().await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_assemble_orders_parts() {
        let dir = tempfile::tempdir().unwrap();
        let mut parts = Vec::new();
        for (part, body) in [(3u32, "c"), (1, "a"), (2, "b")] {
            let path = dir.path().join(format!("p{}", part));
            fs::write(&path, body).await.unwrap();
            parts.push(DownloadedPart {
                part,
                etag: None,
                size: 1,
                path,
            });
        }

        let destination = dir.path().join("out").join("archive.tzst");
        let total = assemble(&parts, &destination).await.unwrap();

        assert_eq!(total, 3);
        assert_eq!(fs::read_to_string(&destination).await.unwrap(), "abc");
        assert!(!parts[0].path.exists());
    }

    #[tokio::test]
    async fn test_assemble_missing_part_fails() {
        let dir = tempfile::tempdir().unwrap();
        let parts = vec![DownloadedPart {
            part: 1,
            etag: None,
            size: 10,
            path: dir.path().join("gone"),
        }];

        let result = assemble(&parts, &dir.path().join("out")).await;
        assert!(matches!(result, Err(TransferError::Io(_))));
    }
}
