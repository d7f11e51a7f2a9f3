//! Shared helpers for integration tests
//!
//! [`RecordingStore`] wraps a [`MemoryStore`], counts every call by
//! operation name and can be told to fail selected operations.

#![allow(dead_code)]

use async_trait::async_trait;
use bucketfs::store::{
    CompletedPart, CreateBucketOptions, DeleteObjectsOutput, LifecycleRule, ListPage, ListRequest,
    ObjectMeta, PutOutput, ReadStream,
};
use bucketfs::{BucketFs, FsError, FsResult, MemoryStore, ObjectStore, PutOptions, WriteOptions};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncRead;

pub const BUCKET: &str = "test-bucket";

/// Failure rule: fail `operation` when the key contains `needle` (any key if empty)
#[derive(Debug, Clone)]
struct FailRule {
    operation: &'static str,
    needle: String,
}

#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<Vec<FailRule>>,
    uploaded_parts: Mutex<Vec<i32>>,
    completions: Mutex<Vec<Vec<i32>>>,
}

impl RecordingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Number of calls made to `operation`
    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().get(operation).copied().unwrap_or(0)
    }

    /// Fail every call to `operation`
    pub fn fail(&self, operation: &'static str) {
        self.fail_matching(operation, "");
    }

    /// Fail calls to `operation` whose key contains `needle`
    pub fn fail_matching(&self, operation: &'static str, needle: &str) {
        self.failures.lock().push(FailRule {
            operation,
            needle: needle.to_string(),
        });
    }

    /// Part numbers passed to `upload_part`, in call order
    pub fn uploaded_parts(&self) -> Vec<i32> {
        self.uploaded_parts.lock().clone()
    }

    /// Part number lists passed to `complete_multipart_upload`
    pub fn completions(&self) -> Vec<Vec<i32>> {
        self.completions.lock().clone()
    }

    fn record(&self, operation: &'static str, key: &str) -> FsResult<()> {
        *self.calls.lock().entry(operation).or_insert(0) += 1;
        let failing = self
            .failures
            .lock()
            .iter()
            .any(|rule| rule.operation == operation && key.contains(&rule.needle));
        if failing {
            return Err(FsError::Service {
                code: "InjectedFailure".to_string(),
                message: format!("{} failed for {}", operation, key),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn create_bucket(&self, bucket: &str, options: CreateBucketOptions) -> FsResult<()> {
        self.record("create_bucket", bucket)?;
        self.inner.create_bucket(bucket, options).await
    }

    async fn delete_bucket(&self, bucket: &str) -> FsResult<()> {
        self.record("delete_bucket", bucket)?;
        self.inner.delete_bucket(bucket).await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        options: &PutOptions,
    ) -> FsResult<PutOutput> {
        self.record("put_object", key)?;
        self.inner.put_object(bucket, key, body, options).await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> FsResult<ReadStream> {
        self.record("get_object", key)?;
        self.inner.get_object(bucket, key).await
    }

    async fn head_object(&self, bucket: &str, key: &str) -> FsResult<ObjectMeta> {
        self.record("head_object", key)?;
        self.inner.head_object(bucket, key).await
    }

    async fn list_objects(&self, bucket: &str, request: &ListRequest) -> FsResult<ListPage> {
        self.record("list_objects", request.prefix.as_deref().unwrap_or(""))?;
        self.inner.list_objects(bucket, request).await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> FsResult<()> {
        self.record("delete_object", key)?;
        self.inner.delete_object(bucket, key).await
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> FsResult<DeleteObjectsOutput> {
        self.record("delete_objects", bucket)?;
        self.inner.delete_objects(bucket, keys).await
    }

    async fn copy_object(&self, bucket: &str, copy_source: &str, key: &str) -> FsResult<()> {
        self.record("copy_object", key)?;
        self.inner.copy_object(bucket, copy_source, key).await
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        options: &PutOptions,
    ) -> FsResult<String> {
        self.record("create_multipart_upload", key)?;
        // widen the window in which concurrent parts race for the session
        tokio::task::yield_now().await;
        self.inner.create_multipart_upload(bucket, key, options).await
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> FsResult<String> {
        self.record("upload_part", &format!("{}#{}", key, part_number))?;
        self.uploaded_parts.lock().push(part_number);
        self.inner
            .upload_part(bucket, key, upload_id, part_number, body)
            .await
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> FsResult<PutOutput> {
        self.record("complete_multipart_upload", key)?;
        self.completions
            .lock()
            .push(parts.iter().map(|p| p.part_number).collect());
        self.inner
            .complete_multipart_upload(bucket, key, upload_id, parts)
            .await
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> FsResult<()> {
        self.record("abort_multipart_upload", key)?;
        self.inner.abort_multipart_upload(bucket, key, upload_id).await
    }

    async fn put_bucket_lifecycle(&self, bucket: &str, rules: &[LifecycleRule]) -> FsResult<()> {
        self.record("put_bucket_lifecycle", bucket)?;
        self.inner.put_bucket_lifecycle(bucket, rules).await
    }
}

/// Filesystem over a fresh recording store with the test bucket created
pub async fn recording_fs(page_size: usize) -> (Arc<RecordingStore>, BucketFs) {
    bucketfs::logging::init_test_logging();
    let store = Arc::new(RecordingStore::new(
        MemoryStore::new().with_page_size(page_size),
    ));
    let fs = BucketFs::new(store.clone(), BUCKET).expect("valid bucket spec");
    fs.create(Default::default()).await.expect("bucket created");
    (store, fs)
}

/// Filesystem over a fresh memory store with the test bucket created
pub async fn memory_fs(spec: &str) -> (MemoryStore, BucketFs) {
    bucketfs::logging::init_test_logging();
    let store = MemoryStore::new();
    let fs = BucketFs::new(Arc::new(store.clone()), spec).expect("valid bucket spec");
    fs.create(Default::default()).await.expect("bucket created");
    (store, fs)
}

/// Small part sizes so multipart paths run on tiny payloads
pub fn small_parts(part_size: usize, max_parts: i32) -> WriteOptions {
    WriteOptions {
        part_size,
        max_parts,
    }
}

/// Reader producing `total` deterministic bytes in fixed-size reads
pub struct PatternReader {
    produced: u64,
    total: u64,
    chunk_size: usize,
}

impl PatternReader {
    pub fn new(total: u64, chunk_size: usize) -> Self {
        Self {
            produced: 0,
            total,
            chunk_size,
        }
    }

    /// The bytes this reader yields
    pub fn expected(total: u64) -> Vec<u8> {
        (0..total).map(pattern_byte).collect()
    }
}

fn pattern_byte(i: u64) -> u8 {
    (i % 251) as u8
}

impl AsyncRead for PatternReader {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let remaining = (self.total - self.produced) as usize;
        let n = self.chunk_size.min(remaining).min(buf.remaining());
        let start = self.produced;
        let data: Vec<u8> = (start..start + n as u64).map(pattern_byte).collect();
        buf.put_slice(&data);
        self.produced += n as u64;
        std::task::Poll::Ready(Ok(()))
    }
}
