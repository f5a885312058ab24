//! Cache Client
//!
//! Speaks the cache RPCs on behalf of a CI job and drives the transfer
//! engine for the bytes.

use std::path::{Path, PathBuf};

use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::PROVIDER_HEADER;
use crate::models::{
    CacheEntry, CheckEntryResponse, CreateEntryResponse, ErrorResponse, GetEntryResponse,
    MultipartEtag, ProviderType, UpdateEntryResponse,
};
use crate::transfer::{assemble, Downloader, TransferEngine, TransferError, Uploader};

const CACHE_SERVICE: &str = "cache.v1.CacheService";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{code}: {message} (HTTP {status})")]
    Rpc {
        status: u16,
        code: String,
        message: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("restored {actual} bytes, entry records {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
}

/// A packed artifact ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
    pub compression: String,
    pub paths: Vec<String>,
}

impl Archive {
    /// Describes an existing archive file, hashing its contents.
    pub async fn from_file(
        path: impl Into<PathBuf>,
        compression: &str,
        paths: Vec<String>,
    ) -> Result<Self, ClientError> {
        let path = path.into();
        let mut file = tokio::fs::File::open(&path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        let mut size = 0u64;
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }

        Ok(Self {
            path,
            size,
            sha256: hex::encode(hasher.finalize()),
            compression: compression.to_string(),
            paths,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A committed entry with the same checksum already exists
    Skipped,
    Uploaded { id: String, parts: usize },
}

/// Where a cache entry lives: key plus the name and branch it was built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRef<'a> {
    pub key: &'a str,
    pub name: &'a str,
    pub branch: &'a str,
}

// == Cache Client ==
#[derive(Debug, Clone)]
pub struct CacheClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    provider: ProviderType,
    owner: String,
    engine: TransferEngine,
    work_dir: PathBuf,
}

impl CacheClient {
    pub fn new(base_url: &str, token: &str, provider: ProviderType, owner: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            provider,
            owner: owner.to_string(),
            engine: TransferEngine::default(),
            work_dir: std::env::temp_dir().join("artifact-cache"),
        }
    }

    pub fn with_engine(mut self, engine: TransferEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Directory that holds downloaded parts until they are assembled.
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    async fn call<Req, Resp>(&self, method: &str, body: &Req) -> Result<Resp, ClientError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}/{}", self.base_url, CACHE_SERVICE, method);
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(PROVIDER_HEADER, self.provider.as_str())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error = response
            .json::<ErrorResponse>()
            .await
            .unwrap_or_else(|_| ErrorResponse::new("unknown", format!("{} failed", method)));
        Err(ClientError::Rpc {
            status: status.as_u16(),
            code: error.code,
            message: error.message,
        })
    }

    pub async fn check_entry(&self, key: &str) -> Result<CheckEntryResponse, ClientError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            owner: &'a str,
            provider_type: ProviderType,
            key: &'a str,
        }

        self.call(
            "CheckEntry",
            &Body {
                owner: &self.owner,
                provider_type: self.provider,
                key,
            },
        )
        .await
    }

    /// Uploads `archive` under `entry` unless an identical version is
    /// already committed.
    pub async fn save(&self, entry: EntryRef<'_>, archive: &Archive) -> Result<SaveOutcome, ClientError> {
        let existing = self.check_entry(entry.key).await?;
        if existing.exists && existing.sha256.eq_ignore_ascii_case(&archive.sha256) {
            info!(key = entry.key, "cache entry up to date, skipping upload");
            return Ok(SaveOutcome::Skipped);
        }

        let created: CreateEntryResponse = self
            .call(
                "CreateEntry",
                &serde_json::json!({
                    "owner": self.owner,
                    "providerType": self.provider,
                    "cacheEntry": CacheEntry {
                        key: entry.key.to_string(),
                        compression: archive.compression.clone(),
                        file_size: archive.size,
                        sha256: archive.sha256.clone(),
                        paths: archive.paths.clone(),
                        name: entry.name.to_string(),
                        branch: entry.branch.to_string(),
                    },
                }),
            )
            .await?;
        debug!(upload_id = %created.id, parts = created.upload_instructions.len(), "upload planned");

        let uploader = Uploader::new(self.http.clone(), self.engine.clone());
        let parts = uploader
            .upload(&archive.path, created.upload_instructions)
            .await?;

        let multipart_etags: Vec<MultipartEtag> = if created.multipart {
            parts.iter().map(MultipartEtag::from).collect()
        } else {
            Vec::new()
        };
        let updated: UpdateEntryResponse = self
            .call(
                "UpdateEntry",
                &serde_json::json!({
                    "id": created.id,
                    "name": entry.name,
                    "branch": entry.branch,
                    "key": entry.key,
                    "multipartEtags": multipart_etags,
                }),
            )
            .await?;

        Ok(SaveOutcome::Uploaded {
            id: updated.id,
            parts: parts.len(),
        })
    }

    /// Downloads the committed version of `entry` into `destination`.
    pub async fn restore(&self, entry: EntryRef<'_>, destination: &Path) -> Result<CacheEntry, ClientError> {
        let found: GetEntryResponse = self
            .call(
                "GetEntry",
                &serde_json::json!({
                    "owner": self.owner,
                    "providerType": self.provider,
                    "name": entry.name,
                    "branch": entry.branch,
                    "key": entry.key,
                }),
            )
            .await?;

        let instructions = found.download_instructions;
        let scratch = self.work_dir.join(Uuid::new_v4().to_string());
        let downloader = Downloader::new(self.http.clone(), self.engine.clone(), &scratch);
        let result = async {
            let parts = downloader.download(instructions).await?;
            Ok::<_, ClientError>(assemble(&parts, destination).await?)
        }
        .await;
        let _ = tokio::fs::remove_dir_all(&scratch).await;

        let restored = result?;
        if restored != found.cache_entry.file_size {
            return Err(ClientError::SizeMismatch {
                expected: found.cache_entry.file_size,
                actual: restored,
            });
        }
        Ok(found.cache_entry)
    }
}
