//! Object storage client abstraction
//!
//! The filesystem layer never talks to a storage service directly. It is
//! handed an [`ObjectStore`] and issues the handful of primitive calls below;
//! everything directory-shaped is built on top of them.
//!
//! Two implementations ship with the crate:
//!
//! - [`S3Store`] (feature `s3-native`): AWS S3 and S3-compatible services
//!   through `aws-sdk-s3`
//! - [`MemoryStore`]: an in-process store with S3 listing semantics, used by
//!   the test suite and for local experiments
//!
//! # Example
//!
//! ```
//! use bucketfs::store::{MemoryStore, ObjectStore, PutOptions};
//! use bytes::Bytes;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! store.create_bucket("my-bucket", Default::default()).await?;
//! store
//!     .put_object("my-bucket", "a/b.json", Bytes::from_static(b"{}"), &PutOptions::default())
//!     .await?;
//! let meta = store.head_object("my-bucket", "a/b.json").await?;
//! assert_eq!(meta.size, 2);
//! # Ok(())
//! # }
//! ```

pub mod types;

mod memory;

#[cfg(feature = "s3-native")]
mod s3;


pub use memory::MemoryStore;
#[cfg(feature = "s3-native")]
pub use s3::S3Store;
pub use types::{
    CompletedPart, CreateBucketOptions, DeleteError, DeleteObjectsOutput, LifecycleRule,
    ListPage, ListRequest, ObjectMeta, ObjectSummary, PutOptions, PutOutput, ReadStream,
};

use crate::error::FsResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Primitive operations of an S3-compatible object store
///
/// Every call is one logical request. Implementations add no retry loop or
/// cache of their own and map errors onto [`crate::FsError`] only so far as:
/// a missing object is `NotFound`, a non-empty bucket on delete is
/// `BucketNotEmpty`, everything else is passed through.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create a bucket
    async fn create_bucket(&self, bucket: &str, options: CreateBucketOptions) -> FsResult<()>;

    /// Delete an empty bucket
    async fn delete_bucket(&self, bucket: &str) -> FsResult<()>;

    /// Store an object in one request
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        options: &PutOptions,
    ) -> FsResult<PutOutput>;

    /// Open an object body as a stream
    async fn get_object(&self, bucket: &str, key: &str) -> FsResult<ReadStream>;

    /// Fetch object metadata without the body
    async fn head_object(&self, bucket: &str, key: &str) -> FsResult<ObjectMeta>;

    /// Fetch one page of a listing
    async fn list_objects(&self, bucket: &str, request: &ListRequest) -> FsResult<ListPage>;

    /// Delete one object; deleting a missing key succeeds
    async fn delete_object(&self, bucket: &str, key: &str) -> FsResult<()>;

    /// Delete up to 1000 objects in one request
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> FsResult<DeleteObjectsOutput>;

    /// Server-side copy from a `bucket/key` locator to `key` in `bucket`
    async fn copy_object(&self, bucket: &str, copy_source: &str, key: &str) -> FsResult<()>;

    /// Open a multipart upload session, returning its upload id
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        options: &PutOptions,
    ) -> FsResult<String>;

    /// Upload one part of a session, returning the part's ETag
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> FsResult<String>;

    /// Assemble the listed parts into the final object
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> FsResult<PutOutput>;

    /// Discard a session and every part uploaded to it
    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str)
        -> FsResult<()>;

    /// Replace the bucket lifecycle configuration with the given rules
    async fn put_bucket_lifecycle(&self, bucket: &str, rules: &[LifecycleRule]) -> FsResult<()>;
}
