//! Filesystem facade over an object store
//!
//! [`BucketFs`] scopes every operation to a bucket and an optional key
//! prefix, translating caller paths into keys on the way in and back into
//! path-relative names on the way out. The [`FileSystem`] trait is the
//! fs-like surface it exposes.
//!
//! # Example
//!
//! ```
//! use bucketfs::{BucketFs, MemoryStore};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let fs = BucketFs::new(Arc::new(MemoryStore::new()), "my-bucket/base")?;
//! fs.create(Default::default()).await?;
//!
//! fs.mkdir("a/").await?;
//! fs.write_file("a/b.json", "{}", &Default::default()).await?;
//! fs.write_file("a/c/d.json", "{}", &Default::default()).await?;
//!
//! assert_eq!(fs.readdir("a/").await?, vec!["b.json", "c/"]);
//! assert_eq!(fs.readdirp("a/").await?, vec!["b.json", "c/d.json"]);
//! assert!(fs.stat("a/").await?.is_directory());
//! # Ok(())
//! # }
//! ```

mod directory;
pub mod lister;
pub mod write_stream;

pub use lister::Listing;
pub use write_stream::{MultipartWriteStream, UploadSummary};

use crate::config::{FsConfig, WriteOptions};
use crate::error::{FsError, FsResult};
use crate::path::{BucketRoot, ObjectPath};
use crate::stats::StatRecord;
use crate::store::{
    CreateBucketOptions, DeleteObjectsOutput, LifecycleRule, ObjectMeta, ObjectStore, PutOptions,
    ReadStream,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::TryStreamExt;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, info};

/// Most keys one batched delete request may carry
const DELETE_BATCH_SIZE: usize = 1000;

/// Body accepted by [`BucketFs::write_file`]
pub enum FileBody {
    /// In-memory content, stored with a single put
    Bytes(Bytes),
    /// Streamed content, piped through a multipart write stream
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl std::fmt::Debug for FileBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileBody::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            FileBody::Reader(_) => f.write_str("Reader"),
        }
    }
}

impl FileBody {
    /// Wrap any async reader
    pub fn reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        FileBody::Reader(Box::new(reader))
    }
}

impl From<Bytes> for FileBody {
    fn from(bytes: Bytes) -> Self {
        FileBody::Bytes(bytes)
    }
}

impl From<Vec<u8>> for FileBody {
    fn from(data: Vec<u8>) -> Self {
        FileBody::Bytes(Bytes::from(data))
    }
}

impl From<&[u8]> for FileBody {
    fn from(data: &[u8]) -> Self {
        FileBody::Bytes(Bytes::copy_from_slice(data))
    }
}

impl From<String> for FileBody {
    fn from(text: String) -> Self {
        FileBody::Bytes(Bytes::from(text))
    }
}

impl From<&str> for FileBody {
    fn from(text: &str) -> Self {
        FileBody::Bytes(Bytes::copy_from_slice(text.as_bytes()))
    }
}

/// The fs-like surface over object storage
///
/// Paths may be relative or absolute, in either slash style. A trailing
/// slash marks a directory.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Stat a path; directories are synthesized without a network call
    async fn stat(&self, path: &str) -> FsResult<StatRecord>;

    /// Same as `stat`: there are no symbolic links
    async fn lstat(&self, path: &str) -> FsResult<StatRecord>;

    /// Immediate children of a directory
    async fn readdir(&self, path: &str) -> FsResult<Vec<String>>;

    /// All descendants of a directory
    async fn readdirp(&self, path: &str) -> FsResult<Vec<String>>;

    /// Create a directory marker
    async fn mkdir(&self, path: &str) -> FsResult<()>;

    /// Create a directory marker; parents never need creating
    async fn mkdirp(&self, path: &str) -> FsResult<()>;

    /// Delete a directory marker, leaving any children
    async fn rmdir(&self, path: &str) -> FsResult<()>;

    /// Delete a directory and all its descendants
    async fn rmdirp(&self, path: &str) -> FsResult<()>;

    /// Read a whole object
    async fn read_file(&self, path: &str) -> FsResult<Bytes>;

    /// Write a whole object
    async fn write_file(
        &self,
        path: &str,
        body: FileBody,
        options: &PutOptions,
    ) -> FsResult<UploadSummary>;

    /// Open an object as a byte stream
    async fn create_read_stream(&self, path: &str) -> FsResult<ReadStream>;

    /// Delete an object
    async fn unlink(&self, path: &str) -> FsResult<()>;

    /// Whether a path exists; directories always do
    async fn exists(&self, path: &str) -> FsResult<bool>;

    /// Server-side copy of one object
    async fn copy_object(&self, source: &str, destination: &str) -> FsResult<()>;

    /// Recursive server-side copy of a directory
    async fn copy_directory(&self, source: &str, destination: &str) -> FsResult<()>;
}

/// Filesystem view of one bucket, optionally scoped to a key prefix
#[derive(Clone)]
pub struct BucketFs {
    store: Arc<dyn ObjectStore>,
    root: BucketRoot,
    write_options: WriteOptions,
}

impl std::fmt::Debug for BucketFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketFs")
            .field("root", &self.root)
            .field("write_options", &self.write_options)
            .finish()
    }
}

impl BucketFs {
    /// Create a facade for `bucket_spec` (`bucket` or `bucket/sub/path`)
    pub fn new(store: Arc<dyn ObjectStore>, bucket_spec: &str) -> FsResult<Self> {
        Ok(Self {
            store,
            root: BucketRoot::parse(bucket_spec)?,
            write_options: WriteOptions::default(),
        })
    }

    /// Create a facade from configuration
    pub fn from_config(store: Arc<dyn ObjectStore>, config: &FsConfig) -> FsResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            root: config.bucket_root()?,
            write_options: config.write_options(),
        })
    }

    /// Override the write stream options
    pub fn with_write_options(mut self, options: WriteOptions) -> Self {
        self.write_options = options;
        self
    }

    /// New facade sharing this store, rooted at `subpath` below this root
    pub fn clone_at(&self, subpath: &str) -> FsResult<Self> {
        Ok(Self {
            store: Arc::clone(&self.store),
            root: self.root.child(subpath)?,
            write_options: self.write_options,
        })
    }

    /// Bucket name
    pub fn bucket(&self) -> &str {
        self.root.bucket()
    }

    /// Bucket and prefix this facade is scoped to
    pub fn root(&self) -> &BucketRoot {
        &self.root
    }

    /// Underlying object store
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Write stream options in effect
    pub fn write_options(&self) -> WriteOptions {
        self.write_options
    }

    pub(crate) fn resolve(&self, path: &str) -> FsResult<ObjectPath> {
        ObjectPath::parse(path, &self.root)
    }

    /// Full key of a path that must denote an object
    fn file_key(&self, path: &str) -> FsResult<String> {
        let object = self.resolve(path)?;
        if object.is_directory() {
            return Err(FsError::InvalidArgument(format!(
                "'{}' is a directory",
                path
            )));
        }
        Ok(self.root.full_key(object.key()))
    }

    // Bucket administration

    /// Create the bucket
    pub async fn create(&self, options: CreateBucketOptions) -> FsResult<()> {
        self.store.create_bucket(self.bucket(), options).await?;
        info!(bucket = self.bucket(), "bucket created");
        Ok(())
    }

    /// Delete the bucket; fails with `BucketNotEmpty` if objects remain
    pub async fn delete(&self) -> FsResult<()> {
        self.store.delete_bucket(self.bucket()).await?;
        info!(bucket = self.bucket(), "bucket deleted");
        Ok(())
    }

    /// Remove everything under the root, then delete the bucket
    pub async fn destroy(&self) -> FsResult<()> {
        self.rmdirp("").await?;
        self.delete().await
    }

    /// Install a single expiration rule as the bucket lifecycle configuration
    ///
    /// `prefix` is bucket-absolute, not relative to this facade's root.
    pub async fn put_bucket_lifecycle(&self, name: &str, prefix: &str, days: i32) -> FsResult<()> {
        let rule = LifecycleRule {
            id: name.to_string(),
            prefix: prefix.to_string(),
            expiration_days: days,
        };
        self.store.put_bucket_lifecycle(self.bucket(), &[rule]).await?;
        info!(bucket = self.bucket(), rule = name, prefix, days, "lifecycle rule installed");
        Ok(())
    }

    // Files

    /// Stat a path
    ///
    /// Whether the record is a directory depends only on the path spelling.
    pub async fn stat(&self, path: &str) -> FsResult<StatRecord> {
        let object = self.resolve(path)?;
        if object.is_directory() {
            return Ok(StatRecord::directory(path, Utc::now()));
        }
        let meta = self
            .store
            .head_object(self.bucket(), &self.root.full_key(object.key()))
            .await?;
        Ok(StatRecord::file(path, &meta))
    }

    /// Same as [`BucketFs::stat`]
    pub async fn lstat(&self, path: &str) -> FsResult<StatRecord> {
        self.stat(path).await
    }

    /// Object metadata
    pub async fn head_object(&self, path: &str) -> FsResult<ObjectMeta> {
        let key = self.file_key(path)?;
        self.store.head_object(self.bucket(), &key).await
    }

    /// Whether a path exists
    pub async fn exists(&self, path: &str) -> FsResult<bool> {
        let object = self.resolve(path)?;
        if object.is_directory() {
            return Ok(true);
        }
        match self
            .store
            .head_object(self.bucket(), &self.root.full_key(object.key()))
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Open an object as a byte stream
    pub async fn create_read_stream(&self, path: &str) -> FsResult<ReadStream> {
        let key = self.file_key(path)?;
        self.store.get_object(self.bucket(), &key).await
    }

    /// Read a whole object into memory
    pub async fn read_file(&self, path: &str) -> FsResult<Bytes> {
        let stream = self.create_read_stream(path).await?;
        let body = stream
            .try_fold(BytesMut::new(), |mut body, chunk| async move {
                body.extend_from_slice(&chunk);
                Ok(body)
            })
            .await?;
        Ok(body.freeze())
    }

    /// Open a multipart write stream to a path
    pub fn create_write_stream(
        &self,
        path: &str,
        options: &PutOptions,
    ) -> FsResult<MultipartWriteStream> {
        let key = self.file_key(path)?;
        Ok(MultipartWriteStream::new(
            Arc::clone(&self.store),
            self.bucket(),
            key,
            options.clone(),
            self.write_options,
        ))
    }

    /// Write a whole object
    ///
    /// In-memory bodies are stored with one put; readers are streamed and
    /// become multipart uploads once they exceed the part size.
    pub async fn write_file(
        &self,
        path: &str,
        body: impl Into<FileBody>,
        options: &PutOptions,
    ) -> FsResult<UploadSummary> {
        match body.into() {
            FileBody::Bytes(data) => {
                let key = self.file_key(path)?;
                let size = data.len() as u64;
                let output = self
                    .store
                    .put_object(self.bucket(), &key, data, options)
                    .await?;
                debug!(bucket = self.bucket(), key = %key, size, "object written");
                Ok(UploadSummary {
                    key,
                    size,
                    parts: 0,
                    etag: output.etag,
                })
            }
            FileBody::Reader(mut reader) => {
                let mut stream = self.create_write_stream(path, options)?;
                stream.copy_from(&mut reader).await?;
                stream.finish().await
            }
        }
    }

    /// Delete an object
    pub async fn unlink(&self, path: &str) -> FsResult<()> {
        let key = self.file_key(path)?;
        self.store.delete_object(self.bucket(), &key).await
    }

    /// Delete many paths with batched requests
    ///
    /// Directory paths delete their marker. Keys in the result are relative
    /// to the root.
    pub async fn rm_files<S: AsRef<str>>(&self, paths: &[S]) -> FsResult<DeleteObjectsOutput> {
        let keys = paths
            .iter()
            .map(|path| -> FsResult<String> {
                let object = self.resolve(path.as_ref())?;
                Ok(if object.is_directory() {
                    self.root.full_key(&object.dir_key())
                } else {
                    self.root.full_key(object.key())
                })
            })
            .collect::<FsResult<Vec<_>>>()?;

        let mut output = DeleteObjectsOutput::default();
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            let result = self.store.delete_objects(self.bucket(), batch).await?;
            debug!(
                bucket = self.bucket(),
                requested = batch.len(),
                deleted = result.deleted.len(),
                failed = result.errors.len(),
                "batch delete"
            );
            output.merge(result);
        }

        let prefix = self.root.prefix();
        for key in output.deleted.iter_mut() {
            if let Some(relative) = key.strip_prefix(prefix) {
                *key = relative.to_string();
            }
        }
        for error in output.errors.iter_mut() {
            if let Some(relative) = error.key.strip_prefix(prefix) {
                error.key = relative.to_string();
            }
        }
        Ok(output)
    }
}

#[async_trait]
impl FileSystem for BucketFs {
    async fn stat(&self, path: &str) -> FsResult<StatRecord> {
        BucketFs::stat(self, path).await
    }

    async fn lstat(&self, path: &str) -> FsResult<StatRecord> {
        BucketFs::lstat(self, path).await
    }

    async fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        BucketFs::readdir(self, path).await
    }

    async fn readdirp(&self, path: &str) -> FsResult<Vec<String>> {
        BucketFs::readdirp(self, path).await
    }

    async fn mkdir(&self, path: &str) -> FsResult<()> {
        BucketFs::mkdir(self, path).await
    }

    async fn mkdirp(&self, path: &str) -> FsResult<()> {
        BucketFs::mkdirp(self, path).await
    }

    async fn rmdir(&self, path: &str) -> FsResult<()> {
        BucketFs::rmdir(self, path).await
    }

    async fn rmdirp(&self, path: &str) -> FsResult<()> {
        BucketFs::rmdirp(self, path).await
    }

    async fn read_file(&self, path: &str) -> FsResult<Bytes> {
        BucketFs::read_file(self, path).await
    }

    async fn write_file(
        &self,
        path: &str,
        body: FileBody,
        options: &PutOptions,
    ) -> FsResult<UploadSummary> {
        BucketFs::write_file(self, path, body, options).await
    }

    async fn create_read_stream(&self, path: &str) -> FsResult<ReadStream> {
        BucketFs::create_read_stream(self, path).await
    }

    async fn unlink(&self, path: &str) -> FsResult<()> {
        BucketFs::unlink(self, path).await
    }

    async fn exists(&self, path: &str) -> FsResult<bool> {
        BucketFs::exists(self, path).await
    }

    async fn copy_object(&self, source: &str, destination: &str) -> FsResult<()> {
        BucketFs::copy_object(self, source, destination).await
    }

    async fn copy_directory(&self, source: &str, destination: &str) -> FsResult<()> {
        BucketFs::copy_directory(self, source, destination).await
    }
}
