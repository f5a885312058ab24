//! Presigned URL signing
//!
//! HMAC-SHA256 over the method, object key, expiry and every scoped query
//! parameter. A URL is only valid for the exact operation it was minted for.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::StorageError;

type HmacSha256 = Hmac<Sha256>;

/// Query parameters carried by a presigned blob URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobParams {
    /// Unix seconds after which the URL is rejected
    #[serde(default)]
    pub expires: i64,
    #[serde(default)]
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_number: Option<u32>,
    /// Inclusive byte range "start-end" the GET is scoped to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    /// Expected SHA-256 of a single-PUT body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Compression recorded for a single-PUT body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
}

impl BlobParams {
    fn canonical(&self, method: &str, key: &str) -> String {
        format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}",
            method,
            key,
            self.expires,
            self.upload_id.as_deref().unwrap_or(""),
            self.part_number.map(|p| p.to_string()).unwrap_or_default(),
            self.range.as_deref().unwrap_or(""),
            self.checksum.as_deref().unwrap_or(""),
            self.compression.as_deref().unwrap_or(""),
        )
    }

    /// Renders the parameters as a query string.
    pub fn to_query(&self) -> String {
        let mut pairs = vec![
            format!("expires={}", self.expires),
            format!("signature={}", self.signature),
        ];
        if let Some(upload_id) = &self.upload_id {
            pairs.push(format!("uploadId={}", urlencoding::encode(upload_id)));
        }
        if let Some(part) = self.part_number {
            pairs.push(format!("partNumber={}", part));
        }
        if let Some(range) = &self.range {
            pairs.push(format!("range={}", urlencoding::encode(range)));
        }
        if let Some(checksum) = &self.checksum {
            pairs.push(format!("checksum={}", urlencoding::encode(checksum)));
        }
        if let Some(compression) = &self.compression {
            pairs.push(format!("compression={}", urlencoding::encode(compression)));
        }
        pairs.join("&")
    }
}

// == URL Signer ==
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UrlSigner([REDACTED, {} bytes])", self.secret.len())
    }
}

impl UrlSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, StorageError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| StorageError::Backend(format!("signing key: {}", e)))
    }

    /// Fills in `params.signature` for the given operation.
    pub fn sign(
        &self,
        method: &str,
        key: &str,
        mut params: BlobParams,
    ) -> Result<BlobParams, StorageError> {
        let mut mac = self.mac()?;
        mac.update(params.canonical(method, key).as_bytes());
        params.signature = hex::encode(mac.finalize().into_bytes());
        Ok(params)
    }

    /// Checks signature and expiry against `now` (Unix seconds).
    pub fn verify(
        &self,
        method: &str,
        key: &str,
        params: &BlobParams,
        now: i64,
    ) -> Result<(), StorageError> {
        let signature = hex::decode(&params.signature)
            .map_err(|_| StorageError::Signature("signature is not hex".to_string()))?;

        let mut mac = self.mac()?;
        mac.update(params.canonical(method, key).as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| StorageError::Signature(format!("{} {}", method, key)))?;

        if now >= params.expires {
            return Err(StorageError::Expired);
        }
        Ok(())
    }
}
