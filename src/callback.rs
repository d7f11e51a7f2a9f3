//! Completion-callback adapters
//!
//! Every operation in this crate is an `async fn`. Callers that prefer a
//! callback receiving the result can wrap any of those futures here instead
//! of each operation growing a second calling convention.
//!
//! ```
//! use bucketfs::callback::spawn_with_callback;
//! use bucketfs::{BucketFs, MemoryStore};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let fs = BucketFs::new(Arc::new(MemoryStore::new()), "bucket")?;
//! let task_fs = fs.clone();
//! let handle = spawn_with_callback(async move { task_fs.readdir("/").await }, |result| {
//!     assert!(result.is_err(), "bucket was never created");
//! });
//! handle.await?;
//! # Ok(())
//! # }
//! ```

use crate::error::FsResult;
use std::future::Future;
use tokio::task::JoinHandle;

/// Run `future` on the runtime and hand its result to `callback`
pub fn spawn_with_callback<F, T, C>(future: F, callback: C) -> JoinHandle<()>
where
    F: Future<Output = FsResult<T>> + Send + 'static,
    T: Send + 'static,
    C: FnOnce(FsResult<T>) + Send + 'static,
{
    tokio::spawn(async move { callback(future.await) })
}

/// Await `future` in place and hand its result to `callback`
pub async fn with_callback<F, T, C>(future: F, callback: C)
where
    F: Future<Output = FsResult<T>>,
    C: FnOnce(FsResult<T>),
{
    callback(future.await)
}
