//! Shared wire types
//!
//! Types that appear both in RPC bodies and in the coordinator/planner APIs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// == Provider Type ==
/// CI provider whose OIDC issuer vouches for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    GithubActions,
    Gitlab,
    Buildkite,
    #[default]
    Unspecified,
}

impl ProviderType {
    /// Canonical name, as used in keys and the `X-Provider` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::GithubActions => "github-actions",
            ProviderType::Gitlab => "gitlab",
            ProviderType::Buildkite => "buildkite",
            ProviderType::Unspecified => "unspecified",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = String;

    /// Parses a provider name (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github-actions" | "github" => Ok(ProviderType::GithubActions),
            "gitlab" => Ok(ProviderType::Gitlab),
            "buildkite" => Ok(ProviderType::Buildkite),
            "unspecified" => Ok(ProviderType::Unspecified),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

// == Cache Entry ==
/// Client-facing description of a cached artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheEntry {
    pub key: String,
    pub compression: String,
    pub file_size: u64,
    pub sha256: String,
    pub paths: Vec<String>,
    pub name: String,
    pub branch: String,
}

// == Multipart ETag ==
/// ETag reported by the client for one uploaded part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartEtag {
    pub etag: String,
    pub part: u32,
    #[serde(default)]
    pub part_size: u64,
}

// == Offset ==
/// Byte span of one part. Both `start` and `end` are inclusive, matching
/// HTTP `Range` semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    /// 1-based part number
    pub part: u32,
    pub start: u64,
    pub end: u64,
}

impl Offset {
    /// Number of bytes covered by this part, or `None` when `end` precedes
    /// `start`.
    pub fn byte_len(&self) -> Option<u64> {
        self.end.checked_sub(self.start)?.checked_add(1)
    }

    /// Value for an HTTP `Range` request header.
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

// == Transfer Instruction ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferMethod {
    Put,
    Get,
}

/// One presigned request the client must execute against the object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferInstruction {
    pub method: TransferMethod,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<Offset>,
}

impl TransferInstruction {
    /// Part number this instruction transfers; unpartitioned transfers count as part 1.
    pub fn part(&self) -> u32 {
        self.offset.map(|o| o.part).unwrap_or(1)
    }
}
