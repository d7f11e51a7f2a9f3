//! In-process object store with S3 listing and multipart semantics

use super::types::{
    CompletedPart, CreateBucketOptions, DeleteObjectsOutput, LifecycleRule, ListPage, ListRequest,
    ObjectMeta, ObjectSummary, PutOptions, PutOutput, ReadStream,
};
use super::ObjectStore;
use crate::error::{FsError, FsResult};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use tracing::debug;

/// Default maximum number of keys returned in a single listing response
const DEFAULT_MAX_KEYS: usize = 1000;

/// Chunk size used when streaming an object body back
const READ_CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    etag: String,
    last_modified: DateTime<Utc>,
    content_type: Option<String>,
    metadata: HashMap<String, String>,
}

#[derive(Debug)]
struct PendingUpload {
    key: String,
    options: PutOptions,
    parts: BTreeMap<i32, (String, Bytes)>,
}

#[derive(Debug, Default)]
struct Bucket {
    objects: BTreeMap<String, StoredObject>,
    uploads: HashMap<String, PendingUpload>,
    lifecycle: Vec<LifecycleRule>,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, Bucket>,
}

/// Object store kept entirely in memory
///
/// Cloning is cheap and clones share the same contents. Listing honours
/// prefix, delimiter, marker and page size exactly like the S3 v1 listing
/// API, so pagination paths are exercised without a network.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
    page_size: usize,
    min_part_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            page_size: DEFAULT_MAX_KEYS,
            min_part_size: 0,
        }
    }

    /// Cap every listing page at `page_size` entries
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Reject completion when a non-final part is smaller than `size` bytes
    pub fn with_min_part_size(mut self, size: usize) -> Self {
        self.min_part_size = size;
        self
    }

    /// All keys currently stored in a bucket, in lexical order
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.state
            .read()
            .buckets
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Raw body of an object, if present
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.state
            .read()
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .map(|o| o.body.clone())
    }

    /// Whether a bucket exists
    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.state.read().buckets.contains_key(bucket)
    }

    /// Number of multipart sessions that were opened and not yet completed or aborted
    pub fn pending_uploads(&self, bucket: &str) -> usize {
        self.state
            .read()
            .buckets
            .get(bucket)
            .map(|b| b.uploads.len())
            .unwrap_or(0)
    }

    /// Lifecycle rules installed on a bucket
    pub fn lifecycle_rules(&self, bucket: &str) -> Vec<LifecycleRule> {
        self.state
            .read()
            .buckets
            .get(bucket)
            .map(|b| b.lifecycle.clone())
            .unwrap_or_default()
    }

    fn with_bucket<T>(&self, bucket: &str, f: impl FnOnce(&Bucket) -> FsResult<T>) -> FsResult<T> {
        let state = self.state.read();
        let b = state.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        f(b)
    }

    fn with_bucket_mut<T>(
        &self,
        bucket: &str,
        f: impl FnOnce(&mut Bucket) -> FsResult<T>,
    ) -> FsResult<T> {
        let mut state = self.state.write();
        let b = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;
        f(b)
    }
}

fn no_such_bucket(bucket: &str) -> FsError {
    FsError::Service {
        code: "NoSuchBucket".to_string(),
        message: format!("The specified bucket does not exist: {}", bucket),
    }
}

fn no_such_upload(upload_id: &str) -> FsError {
    FsError::Service {
        code: "NoSuchUpload".to_string(),
        message: format!("The specified upload does not exist: {}", upload_id),
    }
}

fn quoted_md5(data: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Md5::digest(data)))
}

impl StoredObject {
    fn new(body: Bytes, etag: String, options: &PutOptions) -> Self {
        Self {
            body,
            etag,
            last_modified: Utc::now(),
            content_type: options.content_type.clone(),
            metadata: options.metadata.clone(),
        }
    }

    fn summary(&self, key: &str) -> ObjectSummary {
        ObjectSummary {
            key: key.to_string(),
            size: self.body.len() as u64,
            last_modified: Some(self.last_modified),
            etag: Some(self.etag.clone()),
        }
    }
}

/// S3 v1 listing over a sorted map
fn list_page(objects: &BTreeMap<String, StoredObject>, request: &ListRequest, max_keys: usize) -> ListPage {
    let prefix = request.prefix.as_deref().unwrap_or("");
    let delimiter = request.delimiter.as_deref().filter(|d| !d.is_empty());
    let marker = request.marker.as_deref();

    let lower = match marker {
        Some(m) if m >= prefix => Bound::Excluded(m),
        _ => Bound::Included(prefix),
    };

    let mut page = ListPage::default();
    let mut count = 0usize;

    for (key, object) in objects.range::<str, _>((lower, Bound::Unbounded)) {
        if !key.starts_with(prefix) {
            break;
        }

        if let Some(delimiter) = delimiter {
            let after_prefix = &key[prefix.len()..];
            if let Some(pos) = after_prefix.find(delimiter) {
                let common = format!("{}{}", prefix, &after_prefix[..pos + delimiter.len()]);
                let already_returned = marker.is_some_and(|m| common.as_str() <= m)
                    || page.common_prefixes.last() == Some(&common);
                if already_returned {
                    continue;
                }
                if count >= max_keys {
                    page.is_truncated = true;
                    break;
                }
                page.common_prefixes.push(common);
                count += 1;
                continue;
            }
        }

        if count >= max_keys {
            page.is_truncated = true;
            break;
        }
        page.contents.push(object.summary(key));
        count += 1;
    }

    if page.is_truncated && delimiter.is_some() {
        let last_key = page.contents.last().map(|o| o.key.clone());
        let last_prefix = page.common_prefixes.last().cloned();
        page.next_marker = last_key.max(last_prefix);
    }

    page
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn create_bucket(&self, bucket: &str, _options: CreateBucketOptions) -> FsResult<()> {
        let mut state = self.state.write();
        if state.buckets.contains_key(bucket) {
            return Err(FsError::Service {
                code: "BucketAlreadyOwnedByYou".to_string(),
                message: format!("Bucket already exists: {}", bucket),
            });
        }
        state.buckets.insert(bucket.to_string(), Bucket::default());
        debug!(bucket, "memory bucket created");
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> FsResult<()> {
        let mut state = self.state.write();
        let b = state.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        if !b.objects.is_empty() {
            return Err(FsError::BucketNotEmpty(format!(
                "The bucket you tried to delete is not empty: {}",
                bucket
            )));
        }
        state.buckets.remove(bucket);
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        options: &PutOptions,
    ) -> FsResult<PutOutput> {
        let etag = quoted_md5(&body);
        self.with_bucket_mut(bucket, |b| {
            b.objects
                .insert(key.to_string(), StoredObject::new(body, etag.clone(), options));
            Ok(PutOutput { etag: Some(etag) })
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> FsResult<ReadStream> {
        let body = self.with_bucket(bucket, |b| {
            b.objects
                .get(key)
                .map(|o| o.body.clone())
                .ok_or_else(|| FsError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
        })?;

        let chunks: Vec<std::io::Result<Bytes>> = (0..body.len())
            .step_by(READ_CHUNK_SIZE)
            .map(|start| Ok(body.slice(start..(start + READ_CHUNK_SIZE).min(body.len()))))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> FsResult<ObjectMeta> {
        self.with_bucket(bucket, |b| {
            let object = b.objects.get(key).ok_or_else(|| FsError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
            Ok(ObjectMeta {
                size: object.body.len() as u64,
                last_modified: Some(object.last_modified),
                etag: Some(object.etag.clone()),
                content_type: object.content_type.clone(),
                metadata: object.metadata.clone(),
            })
        })
    }

    async fn list_objects(&self, bucket: &str, request: &ListRequest) -> FsResult<ListPage> {
        let max_keys = request
            .max_keys
            .and_then(|m| usize::try_from(m).ok())
            .unwrap_or(DEFAULT_MAX_KEYS)
            .min(self.page_size);
        self.with_bucket(bucket, |b| Ok(list_page(&b.objects, request, max_keys)))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> FsResult<()> {
        self.with_bucket_mut(bucket, |b| {
            b.objects.remove(key);
            Ok(())
        })
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> FsResult<DeleteObjectsOutput> {
        self.with_bucket_mut(bucket, |b| {
            for key in keys {
                b.objects.remove(key);
            }
            Ok(DeleteObjectsOutput {
                deleted: keys.to_vec(),
                errors: Vec::new(),
            })
        })
    }

    async fn copy_object(&self, bucket: &str, copy_source: &str, key: &str) -> FsResult<()> {
        let (source_bucket, source_key) = copy_source.split_once('/').ok_or_else(|| {
            FsError::InvalidArgument(format!("copy source must be bucket/key: {}", copy_source))
        })?;

        let object = self.with_bucket(source_bucket, |b| {
            b.objects.get(source_key).cloned().ok_or_else(|| FsError::NotFound {
                bucket: source_bucket.to_string(),
                key: source_key.to_string(),
            })
        })?;

        self.with_bucket_mut(bucket, |b| {
            b.objects.insert(
                key.to_string(),
                StoredObject {
                    last_modified: Utc::now(),
                    ..object
                },
            );
            Ok(())
        })
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        options: &PutOptions,
    ) -> FsResult<String> {
        let upload_id = uuid::Uuid::new_v4().simple().to_string();
        self.with_bucket_mut(bucket, |b| {
            b.uploads.insert(
                upload_id.clone(),
                PendingUpload {
                    key: key.to_string(),
                    options: options.clone(),
                    parts: BTreeMap::new(),
                },
            );
            Ok(())
        })?;
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> FsResult<String> {
        if !(1..=10_000).contains(&part_number) {
            return Err(FsError::Service {
                code: "InvalidArgument".to_string(),
                message: format!("Part number must be between 1 and 10000: {}", part_number),
            });
        }
        let etag = quoted_md5(&body);
        self.with_bucket_mut(bucket, |b| {
            let upload = b
                .uploads
                .get_mut(upload_id)
                .filter(|u| u.key == key)
                .ok_or_else(|| no_such_upload(upload_id))?;
            upload.parts.insert(part_number, (etag.clone(), body));
            Ok(etag)
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> FsResult<PutOutput> {
        let min_part_size = self.min_part_size;
        self.with_bucket_mut(bucket, |b| {
            let upload = b
                .uploads
                .get(upload_id)
                .filter(|u| u.key == key)
                .ok_or_else(|| no_such_upload(upload_id))?;

            if parts.is_empty() {
                return Err(FsError::Service {
                    code: "MalformedXML".to_string(),
                    message: "Completion requires at least one part".to_string(),
                });
            }
            if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
                return Err(FsError::Service {
                    code: "InvalidPartOrder".to_string(),
                    message: "Parts must be listed in ascending order".to_string(),
                });
            }

            let mut body = BytesMut::new();
            let mut digests = Vec::with_capacity(parts.len() * 16);
            for (index, part) in parts.iter().enumerate() {
                let (_, data) = upload
                    .parts
                    .get(&part.part_number)
                    .filter(|(etag, _)| *etag == part.etag)
                    .ok_or_else(|| FsError::Service {
                        code: "InvalidPart".to_string(),
                        message: format!("Part {} was not uploaded", part.part_number),
                    })?;
                if index + 1 < parts.len() && data.len() < min_part_size {
                    return Err(FsError::Service {
                        code: "EntityTooSmall".to_string(),
                        message: format!("Part {} is smaller than the minimum", part.part_number),
                    });
                }
                digests.extend_from_slice(&Md5::digest(data));
                body.extend_from_slice(data);
            }

            let etag = format!("\"{}-{}\"", hex::encode(Md5::digest(&digests)), parts.len());
            let options = upload.options.clone();
            b.uploads.remove(upload_id);
            b.objects.insert(
                key.to_string(),
                StoredObject::new(body.freeze(), etag.clone(), &options),
            );
            Ok(PutOutput { etag: Some(etag) })
        })
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> FsResult<()> {
        self.with_bucket_mut(bucket, |b| {
            b.uploads
                .remove(upload_id)
                .map(|_| ())
                .ok_or_else(|| no_such_upload(upload_id))
        })
    }

    async fn put_bucket_lifecycle(&self, bucket: &str, rules: &[LifecycleRule]) -> FsResult<()> {
        self.with_bucket_mut(bucket, |b| {
            b.lifecycle = rules.to_vec();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn seeded(keys: &[&str]) -> MemoryStore {
        let store = MemoryStore::new();
        store.create_bucket("b", Default::default()).await.unwrap();
        for key in keys {
            store
                .put_object("b", key, Bytes::from_static(b"{}"), &PutOptions::default())
                .await
                .unwrap();
        }
        store
    }

    fn request(prefix: &str, delimiter: Option<&str>, marker: Option<&str>) -> ListRequest {
        ListRequest {
            prefix: Some(prefix.to_string()),
            delimiter: delimiter.map(str::to_string),
            marker: marker.map(str::to_string),
            max_keys: None,
        }
    }

    #[tokio::test]
    async fn test_delimiter_listing_groups_prefixes() {
        let store = seeded(&["a/", "a/b.json", "a/c/d.json", "a/c/e.json", "z.json"]).await;
        let page = store
            .list_objects("b", &request("a/", Some("/"), None))
            .await
            .unwrap();

        let keys: Vec<_> = page.contents.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a/", "a/b.json"]);
        assert_eq!(page.common_prefixes, vec!["a/c/"]);
        assert!(!page.is_truncated);
    }

    #[tokio::test]
    async fn test_page_size_truncates_with_marker() {
        let store = seeded(&["p/1", "p/2", "p/3"]).await.with_page_size(2);
        let first = store.list_objects("b", &request("p/", None, None)).await.unwrap();
        assert_eq!(first.contents.len(), 2);
        assert!(first.is_truncated);
        assert!(first.next_marker.is_none());

        let second = store
            .list_objects("b", &request("p/", None, Some("p/2")))
            .await
            .unwrap();
        assert_eq!(second.contents[0].key, "p/3");
        assert!(!second.is_truncated);
    }

    #[tokio::test]
    async fn test_marker_skips_returned_common_prefix() {
        let store = seeded(&["a", "b/1", "b/2", "c"]).await.with_page_size(2);
        let first = store.list_objects("b", &request("", Some("/"), None)).await.unwrap();
        assert_eq!(first.common_prefixes, vec!["b/"]);
        assert_eq!(first.next_marker.as_deref(), Some("b/"));

        let second = store
            .list_objects("b", &request("", Some("/"), Some("b/")))
            .await
            .unwrap();
        let keys: Vec<_> = second.contents.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["c"]);
        assert!(second.common_prefixes.is_empty());
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let store = seeded(&[]).await;
        let err = store.head_object("b", "nope").await.unwrap_err();
        assert!(err.is_not_found());
        let err = store.get_object("b", "nope").await.err().unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_object_streams_body() {
        let store = seeded(&["x"]).await;
        let chunks: Vec<Bytes> = store.get_object("b", "x").await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"{}".to_vec());
    }

    #[tokio::test]
    async fn test_delete_non_empty_bucket() {
        let store = seeded(&["x"]).await;
        let err = store.delete_bucket("b").await.unwrap_err();
        assert!(matches!(err, FsError::BucketNotEmpty(_)));
        store.delete_object("b", "x").await.unwrap();
        store.delete_bucket("b").await.unwrap();
        assert!(!store.has_bucket("b"));
    }

    #[tokio::test]
    async fn test_multipart_roundtrip() {
        let store = seeded(&[]).await;
        let id = store
            .create_multipart_upload("b", "big", &PutOptions::default())
            .await
            .unwrap();
        let e1 = store
            .upload_part("b", "big", &id, 1, Bytes::from_static(b"hello "))
            .await
            .unwrap();
        let e2 = store
            .upload_part("b", "big", &id, 2, Bytes::from_static(b"world"))
            .await
            .unwrap();
        let out = store
            .complete_multipart_upload(
                "b",
                "big",
                &id,
                &[
                    CompletedPart { part_number: 1, etag: e1 },
                    CompletedPart { part_number: 2, etag: e2 },
                ],
            )
            .await
            .unwrap();

        assert!(out.etag.unwrap().ends_with("-2\""));
        assert_eq!(store.object("b", "big").unwrap(), Bytes::from_static(b"hello world"));
        assert_eq!(store.pending_uploads("b"), 0);
    }

    #[tokio::test]
    async fn test_min_part_size_enforced() {
        let store = seeded(&[]).await.with_min_part_size(10);
        let id = store
            .create_multipart_upload("b", "k", &PutOptions::default())
            .await
            .unwrap();
        let e1 = store.upload_part("b", "k", &id, 1, Bytes::from_static(b"tiny")).await.unwrap();
        let e2 = store.upload_part("b", "k", &id, 2, Bytes::from_static(b"last")).await.unwrap();
        let err = store
            .complete_multipart_upload(
                "b",
                "k",
                &id,
                &[
                    CompletedPart { part_number: 1, etag: e1 },
                    CompletedPart { part_number: 2, etag: e2 },
                ],
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("EntityTooSmall"));
    }

    #[tokio::test]
    async fn test_copy_object_between_keys() {
        let store = seeded(&["src/a.json"]).await;
        store.copy_object("b", "b/src/a.json", "dst/a.json").await.unwrap();
        assert_eq!(store.keys("b"), vec!["dst/a.json", "src/a.json"]);
    }
}
