//! Directory emulation over a flat key space
//!
//! A directory is either a zero-byte marker object whose key ends in `/`,
//! or simply the shared prefix of the objects below it. Listings use a `/`
//! delimiter for one level and no delimiter for full recursion. Recursive
//! deletes and copies fan out one task per key.

use super::lister::{list_entries, list_filenames};
use super::BucketFs;
use crate::error::{FsError, FsResult};
use crate::path::ObjectPath;
use crate::store::{ObjectStore, ObjectSummary, PutOptions};
use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

const DELIMITER: &str = "/";

/// Run `op` for every key concurrently, failing with the first error to arrive
///
/// Siblings of a failed task are not cancelled; they run to completion in
/// the background and their results are discarded.
async fn fan_out<F, Fut>(operation: &'static str, keys: Vec<String>, op: F) -> FsResult<usize>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = FsResult<()>> + Send + 'static,
{
    let mut pending = FuturesUnordered::new();
    for key in keys {
        let handle = tokio::spawn(op(key.clone()));
        pending.push(async move { (key, handle.await) });
    }

    let total = pending.len();
    while let Some((key, joined)) = pending.next().await {
        let result = joined.unwrap_or_else(|e| Err(FsError::task(e)));
        if let Err(e) = result {
            return Err(FsError::aggregate(operation, key, e));
        }
    }
    Ok(total)
}

impl BucketFs {
    /// Full listing prefix for a resolved path
    fn listing_prefix(&self, path: &ObjectPath) -> String {
        self.root().full_key(&path.dir_key())
    }

    /// Immediate children of a directory
    ///
    /// Files are returned first, then sub-directories suffixed with `/`,
    /// each group in lexical order.
    pub async fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        let dir = self.resolve(path)?;
        let prefix = self.listing_prefix(&dir);
        list_filenames(self.store().as_ref(), self.bucket(), &prefix, Some(DELIMITER)).await
    }

    /// Every descendant key of a directory, relative to it
    pub async fn readdirp(&self, path: &str) -> FsResult<Vec<String>> {
        let dir = self.resolve(path)?;
        let prefix = self.listing_prefix(&dir);
        list_filenames(self.store().as_ref(), self.bucket(), &prefix, None).await
    }

    /// Create a directory marker; creating an existing one is a no-op overwrite
    pub async fn mkdir(&self, path: &str) -> FsResult<()> {
        let dir = self.resolve(path)?;
        let key = self.listing_prefix(&dir);
        if key.is_empty() {
            return Ok(());
        }
        self.store()
            .put_object(self.bucket(), &key, Bytes::new(), &PutOptions::default())
            .await?;
        debug!(bucket = self.bucket(), key = %key, "directory marker created");
        Ok(())
    }

    /// Same as [`BucketFs::mkdir`]: object storage has no missing-parent constraint
    pub async fn mkdirp(&self, path: &str) -> FsResult<()> {
        self.mkdir(path).await
    }

    /// Delete the directory marker only
    ///
    /// Children are left in place and emptiness is not checked.
    pub async fn rmdir(&self, path: &str) -> FsResult<()> {
        let dir = self.resolve(path)?;
        let key = self.listing_prefix(&dir);
        if key.is_empty() {
            return Ok(());
        }
        self.store().delete_object(self.bucket(), &key).await
    }

    /// Delete a directory and everything below it
    pub async fn rmdirp(&self, path: &str) -> FsResult<()> {
        let dir = self.resolve(path)?;
        let prefix = self.listing_prefix(&dir);
        let names = list_filenames(self.store().as_ref(), self.bucket(), &prefix, None).await?;

        let (markers, files): (Vec<String>, Vec<String>) = names
            .into_iter()
            .map(|name| format!("{}{}", prefix, name))
            .partition(|key| key.ends_with('/'));

        let mut keys = files;
        keys.extend(markers);
        if !prefix.is_empty() {
            keys.push(prefix.clone());
        }

        let store = Arc::clone(self.store());
        let bucket = self.bucket().to_string();
        let deleted = fan_out("rmdirp", keys, move |key| {
            let store = Arc::clone(&store);
            let bucket = bucket.clone();
            async move { store.delete_object(&bucket, &key).await }
        })
        .await?;

        debug!(bucket = self.bucket(), prefix = %prefix, deleted, "directory removed recursively");
        Ok(())
    }

    /// Server-side copy of one object
    ///
    /// Copying a directory path is a successful no-op.
    pub async fn copy_object(&self, source: &str, destination: &str) -> FsResult<()> {
        let source = self.resolve(source)?;
        if source.is_directory() {
            return Ok(());
        }
        let destination = self.resolve(destination)?;
        let copy_source = format!("{}/{}", self.bucket(), self.root().full_key(source.key()));
        self.store()
            .copy_object(
                self.bucket(),
                &copy_source,
                &self.root().full_key(destination.key()),
            )
            .await
    }

    /// Copy every object below `source` to the same relative key below `destination`
    ///
    /// Directory markers are skipped, so empty directories are not recreated.
    pub async fn copy_directory(&self, source: &str, destination: &str) -> FsResult<()> {
        let source = self.resolve(source)?;
        let destination = self.resolve(destination)?;
        let source_prefix = self.listing_prefix(&source);
        let destination_prefix = self.listing_prefix(&destination);

        let names: Vec<String> =
            list_filenames(self.store().as_ref(), self.bucket(), &source_prefix, None)
                .await?
                .into_iter()
                .filter(|name| !name.ends_with('/'))
                .collect();

        let store: Arc<dyn ObjectStore> = Arc::clone(self.store());
        let bucket = self.bucket().to_string();
        let copied = fan_out("copy_directory", names, move |name| {
            let store = Arc::clone(&store);
            let copy_source = format!("{}/{}{}", bucket, source_prefix, name);
            let target = format!("{}{}", destination_prefix, name);
            let bucket = bucket.clone();
            async move { store.copy_object(&bucket, &copy_source, &target).await }
        })
        .await?;

        debug!(bucket = self.bucket(), copied, "directory copied");
        Ok(())
    }

    /// One-level object entries of a directory, starting after `marker`
    ///
    /// `marker` is relative to the directory, like the returned keys.
    pub async fn dstat(&self, path: &str, marker: Option<&str>) -> FsResult<Vec<ObjectSummary>> {
        self.list_raw(path, Some(DELIMITER), marker).await
    }

    /// Recursive object entries of a directory, starting after `marker`
    pub async fn list_contents(
        &self,
        path: &str,
        marker: Option<&str>,
    ) -> FsResult<Vec<ObjectSummary>> {
        self.list_raw(path, None, marker).await
    }

    async fn list_raw(
        &self,
        path: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
    ) -> FsResult<Vec<ObjectSummary>> {
        let dir = self.resolve(path)?;
        let prefix = self.listing_prefix(&dir);
        let marker = marker.map(|m| format!("{}{}", prefix, m));
        let listing =
            list_entries(self.store().as_ref(), self.bucket(), &prefix, delimiter, marker).await?;
        Ok(listing.entries)
    }
}
