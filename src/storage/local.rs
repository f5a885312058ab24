//! Local object store
//!
//! Keeps objects in memory and mints presigned URLs that point back at this
//! service's `/blobs` routes. Intended for development, single-node
//! deployments and tests; production deployments plug a cloud backend in
//! behind the same trait.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Bytes;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::{
    BlobParams, CompletedPart, ObjectAttributes, ObjectMeta, ObjectStore, StorageError, UrlSigner,
};
use crate::models::Offset;

#[derive(Debug)]
struct StoredObject {
    data: Bytes,
    sha256: String,
    compression: String,
    stored_at: Instant,
}

#[derive(Debug)]
struct UploadedPart {
    etag: String,
    data: Bytes,
}

#[derive(Debug)]
struct MultipartSession {
    key: String,
    attributes: ObjectAttributes,
    parts: BTreeMap<u32, UploadedPart>,
    created_at: Instant,
}

/// Bytes served for a (possibly ranged) read.
#[derive(Debug, Clone)]
pub struct ObjectRead {
    pub data: Bytes,
    pub total_size: u64,
    pub etag: String,
    /// Inclusive span served, when the read was ranged
    pub range: Option<(u64, u64)>,
}

pub struct LocalObjectStore {
    base_url: String,
    signer: UrlSigner,
    expiry: Duration,
    objects: RwLock<HashMap<String, StoredObject>>,
    uploads: RwLock<HashMap<String, MultipartSession>>,
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn etag_for(data: &[u8]) -> String {
    format!("\"{}\"", &sha256_hex(data)[..32])
}

fn normalize_etag(etag: &str) -> &str {
    etag.trim().trim_matches('"')
}

impl LocalObjectStore {
    pub fn new(base_url: impl Into<String>, signer: UrlSigner, expiry: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signer,
            expiry,
            objects: RwLock::new(HashMap::new()),
            uploads: RwLock::new(HashMap::new()),
        }
    }

    fn url(&self, method: &str, key: &str, params: BlobParams) -> Result<String, StorageError> {
        let params = BlobParams {
            expires: chrono::Utc::now().timestamp() + self.expiry.as_secs() as i64,
            ..params
        };
        let signed = self.signer.sign(method, key, params)?;
        Ok(format!(
            "{}/blobs/{}?{}",
            self.base_url,
            urlencoding::encode(key),
            signed.to_query()
        ))
    }

    /// Checks that a blob request carries a valid, unexpired signature.
    pub fn verify(&self, method: &str, key: &str, params: &BlobParams) -> Result<(), StorageError> {
        self.signer
            .verify(method, key, params, chrono::Utc::now().timestamp())
    }

    /// Stores a whole object from a single PUT.
    pub async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        expected_sha256: Option<&str>,
        compression: &str,
    ) -> Result<String, StorageError> {
        let sha256 = sha256_hex(&data);
        if let Some(expected) = expected_sha256.filter(|s| !s.is_empty()) {
            if !expected.eq_ignore_ascii_case(&sha256) {
                return Err(StorageError::ChecksumMismatch {
                    expected: expected.to_string(),
                    actual: sha256,
                });
            }
        }

        let etag = etag_for(&data);
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data,
                sha256,
                compression: compression.to_string(),
                stored_at: Instant::now(),
            },
        );
        Ok(etag)
    }

    /// Stores one part of an open multipart upload.
    pub async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part: u32,
        data: Bytes,
    ) -> Result<String, StorageError> {
        let mut uploads = self.uploads.write().await;
        let session = uploads
            .get_mut(upload_id)
            .filter(|s| s.key == key)
            .ok_or_else(|| StorageError::NoSuchUpload(upload_id.to_string()))?;

        let etag = etag_for(&data);
        session.parts.insert(
            part,
            UploadedPart {
                etag: etag.clone(),
                data,
            },
        );
        Ok(etag)
    }

    /// Reads an object, optionally restricted to an inclusive byte range.
    pub async fn read_object(
        &self,
        key: &str,
        range: Option<(u64, u64)>,
    ) -> Result<ObjectRead, StorageError> {
        let objects = self.objects.read().await;
        let object = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        let total_size = object.data.len() as u64;
        let etag = etag_for(&object.data);

        let data = match range {
            Some((start, end)) => {
                if start > end || start >= total_size {
                    return Err(StorageError::InvalidRange(format!(
                        "{}-{} of {}",
                        start, end, total_size
                    )));
                }
                let end = end.min(total_size - 1);
                object.data.slice(start as usize..=end as usize)
            }
            None => object.data.clone(),
        };

        Ok(ObjectRead {
            data,
            total_size,
            etag,
            range: range.map(|(start, end)| (start, end.min(total_size.saturating_sub(1)))),
        })
    }

    /// Number of multipart uploads still open.
    pub async fn open_uploads(&self) -> usize {
        self.uploads.read().await.len()
    }

    /// Number of stored objects.
    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Drops multipart uploads opened more than `max_age` ago, along with
    /// their parts. Returns how many were aborted.
    pub async fn abort_stale_uploads(&self, max_age: Duration) -> usize {
        let mut uploads = self.uploads.write().await;
        let before = uploads.len();
        uploads.retain(|_, session| session.created_at.elapsed() < max_age);
        before - uploads.len()
    }

    /// Drops objects last written more than `max_age` ago.
    pub async fn evict_stale_objects(&self, max_age: Duration) -> usize {
        let mut objects = self.objects.write().await;
        let before = objects.len();
        objects.retain(|_, object| object.stored_at.elapsed() < max_age);
        before - objects.len()
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn presign_put(
        &self,
        key: &str,
        attributes: &ObjectAttributes,
    ) -> Result<String, StorageError> {
        let checksum = (!attributes.sha256.is_empty()).then(|| attributes.sha256.clone());
        let compression =
            (!attributes.compression.is_empty()).then(|| attributes.compression.clone());
        self.url(
            "PUT",
            key,
            BlobParams {
                checksum,
                compression,
                ..Default::default()
            },
        )
    }

    async fn presign_get(
        &self,
        key: &str,
        range: Option<Offset>,
    ) -> Result<String, StorageError> {
        self.url(
            "GET",
            key,
            BlobParams {
                range: range.map(|o| format!("{}-{}", o.start, o.end)),
                ..Default::default()
            },
        )
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        attributes: &ObjectAttributes,
    ) -> Result<String, StorageError> {
        let upload_id = uuid::Uuid::new_v4().to_string();
        self.uploads.write().await.insert(
            upload_id.clone(),
            MultipartSession {
                key: key.to_string(),
                attributes: attributes.clone(),
                parts: BTreeMap::new(),
                created_at: Instant::now(),
            },
        );
        Ok(upload_id)
    }

    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part: u32,
    ) -> Result<String, StorageError> {
        self.url(
            "PUT",
            key,
            BlobParams {
                upload_id: Some(upload_id.to_string()),
                part_number: Some(part),
                ..Default::default()
            },
        )
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StorageError> {
        let mut uploads = self.uploads.write().await;
        let session = uploads
            .get(upload_id)
            .filter(|s| s.key == key)
            .ok_or_else(|| StorageError::NoSuchUpload(upload_id.to_string()))?;

        if parts.is_empty() {
            return Err(StorageError::InvalidPart("no parts listed".to_string()));
        }
        if parts.windows(2).any(|w| w[0].part >= w[1].part) {
            return Err(StorageError::InvalidPart(
                "parts must be in strictly ascending order".to_string(),
            ));
        }

        let mut assembled = Vec::new();
        for listed in parts {
            let stored = session.parts.get(&listed.part).ok_or_else(|| {
                StorageError::InvalidPart(format!("part {} was never uploaded", listed.part))
            })?;
            if normalize_etag(&stored.etag) != normalize_etag(&listed.etag) {
                return Err(StorageError::InvalidPart(format!(
                    "etag mismatch for part {}",
                    listed.part
                )));
            }
            assembled.extend_from_slice(&stored.data);
        }

        let sha256 = sha256_hex(&assembled);
        let expected = &session.attributes.sha256;
        if !expected.is_empty() && !expected.eq_ignore_ascii_case(&sha256) {
            return Err(StorageError::ChecksumMismatch {
                expected: expected.clone(),
                actual: sha256,
            });
        }

        let compression = session.attributes.compression.clone();
        uploads.remove(upload_id);
        drop(uploads);

        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data: Bytes::from(assembled),
                sha256,
                compression,
                stored_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).map(|object| ObjectMeta {
            size: object.data.len() as u64,
            sha256: Some(object.sha256.clone()),
            compression: Some(object.compression.clone()).filter(|c| !c.is_empty()),
        }))
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> LocalObjectStore {
        LocalObjectStore::new(
            "http://127.0.0.1:3000/",
            UrlSigner::new("test-secret"),
            Duration::from_secs(60),
        )
    }

    fn attributes(data: &[u8]) -> ObjectAttributes {
        ObjectAttributes {
            sha256: sha256_hex(data),
            compression: "zstd".to_string(),
        }
    }

    #[tokio::test]
    async fn test_presigned_put_url_shape() {
        let store = store();
        let url = store
            .presign_put("acme/gitlab/deps", &ObjectAttributes::default())
            .await
            .unwrap();

        assert!(url.starts_with("http://127.0.0.1:3000/blobs/acme%2Fgitlab%2Fdeps?expires="));
        assert!(url.contains("signature="));
        assert!(!url.contains("checksum="));
    }

    #[tokio::test]
    async fn test_put_and_head_object() {
        let store = store();
        let data = Bytes::from_static(b"archive bytes");
        let attrs = attributes(&data);

        store
            .put_object("k", data.clone(), Some(&attrs.sha256), "zstd")
            .await
            .unwrap();

        let meta = store.head_object("k").await.unwrap().unwrap();
        assert_eq!(meta.size, data.len() as u64);
        assert_eq!(meta.sha256, Some(attrs.sha256));
        assert_eq!(meta.compression.as_deref(), Some("zstd"));
        assert!(store.head_object("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_rejects_checksum_mismatch() {
        let store = store();
        let result = store
            .put_object("k", Bytes::from_static(b"abc"), Some("00ff"), "")
            .await;
        assert!(matches!(result, Err(StorageError::ChecksumMismatch { .. })));
    }

    #[tokio::test]
    async fn test_ranged_read() {
        let store = store();
        store
            .put_object("k", Bytes::from_static(b"0123456789"), None, "")
            .await
            .unwrap();

        let read = store.read_object("k", Some((2, 5))).await.unwrap();
        assert_eq!(&read.data[..], b"2345");
        assert_eq!(read.total_size, 10);

        // End past the object is clamped
        let tail = store.read_object("k", Some((8, 100))).await.unwrap();
        assert_eq!(&tail.data[..], b"89");
        assert_eq!(tail.range, Some((8, 9)));

        let bad = store.read_object("k", Some((10, 12))).await;
        assert!(matches!(bad, Err(StorageError::InvalidRange(_))));
    }

    #[tokio::test]
    async fn test_multipart_lifecycle() {
        let store = store();
        let full = b"aaaabbbbcc".to_vec();
        let upload_id = store
            .create_multipart_upload("k", &attributes(&full))
            .await
            .unwrap();

        // Upload out of order
        let e3 = store
            .upload_part("k", &upload_id, 3, Bytes::from_static(b"cc"))
            .await
            .unwrap();
        let e1 = store
            .upload_part("k", &upload_id, 1, Bytes::from_static(b"aaaa"))
            .await
            .unwrap();
        let e2 = store
            .upload_part("k", &upload_id, 2, Bytes::from_static(b"bbbb"))
            .await
            .unwrap();

        let parts = vec![
            CompletedPart { part: 1, etag: e1 },
            CompletedPart { part: 2, etag: e2 },
            CompletedPart { part: 3, etag: e3 },
        ];
        store
            .complete_multipart_upload("k", &upload_id, &parts)
            .await
            .unwrap();

        let read = store.read_object("k", None).await.unwrap();
        assert_eq!(&read.data[..], &full[..]);
        assert_eq!(store.open_uploads().await, 0);
    }

    #[tokio::test]
    async fn test_complete_rejects_unsorted_parts() {
        let store = store();
        let upload_id = store
            .create_multipart_upload("k", &ObjectAttributes::default())
            .await
            .unwrap();
        let e1 = store
            .upload_part("k", &upload_id, 1, Bytes::from_static(b"a"))
            .await
            .unwrap();
        let e2 = store
            .upload_part("k", &upload_id, 2, Bytes::from_static(b"b"))
            .await
            .unwrap();

        let parts = vec![
            CompletedPart { part: 2, etag: e2 },
            CompletedPart { part: 1, etag: e1 },
        ];
        let result = store.complete_multipart_upload("k", &upload_id, &parts).await;
        assert!(matches!(result, Err(StorageError::InvalidPart(_))));
        // Session survives a rejected completion
        assert_eq!(store.open_uploads().await, 1);
    }

    #[tokio::test]
    async fn test_complete_rejects_wrong_etag() {
        let store = store();
        let upload_id = store
            .create_multipart_upload("k", &ObjectAttributes::default())
            .await
            .unwrap();
        store
            .upload_part("k", &upload_id, 1, Bytes::from_static(b"a"))
            .await
            .unwrap();

        let parts = vec![CompletedPart {
            part: 1,
            etag: "\"bogus\"".to_string(),
        }];
        let result = store.complete_multipart_upload("k", &upload_id, &parts).await;
        assert!(matches!(result, Err(StorageError::InvalidPart(_))));
    }

    #[tokio::test]
    async fn test_part_for_unknown_upload() {
        let store = store();
        let result = store
            .upload_part("k", "missing", 1, Bytes::from_static(b"a"))
            .await;
        assert!(matches!(result, Err(StorageError::NoSuchUpload(_))));
    }

    #[tokio::test]
    async fn test_abort_stale_uploads_drops_parts() {
        let store = store();
        let stale = store
            .create_multipart_upload("k", &ObjectAttributes::default())
            .await
            .unwrap();
        store
            .upload_part("k", &stale, 1, Bytes::from_static(b"part"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        store
            .create_multipart_upload("other", &ObjectAttributes::default())
            .await
            .unwrap();

        assert_eq!(store.abort_stale_uploads(Duration::from_millis(20)).await, 1);
        assert_eq!(store.open_uploads().await, 1);
        let result = store
            .upload_part("k", &stale, 2, Bytes::from_static(b"late"))
            .await;
        assert!(matches!(result, Err(StorageError::NoSuchUpload(_))));
    }

    #[tokio::test]
    async fn test_evict_stale_objects_keeps_fresh_writes() {
        let store = store();
        store
            .put_object("old", Bytes::from_static(b"a"), None, "")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        store
            .put_object("new", Bytes::from_static(b"b"), None, "")
            .await
            .unwrap();

        assert_eq!(store.evict_stale_objects(Duration::from_millis(20)).await, 1);
        assert!(store.head_object("old").await.unwrap().is_none());
        assert!(store.head_object("new").await.unwrap().is_some());
    }
}
