//! Multipart write stream
//!
//! Bytes pushed into a [`MultipartWriteStream`] accumulate in a buffer.
//! Every time the buffer reaches the part size a part is cut, numbered and
//! handed to a background upload task, so buffering of the next part
//! overlaps with the network upload of the previous one. Ending the stream
//! either completes the multipart session or, when no part was ever cut,
//! stores the whole buffer with a single put and never opens a session.

use crate::config::WriteOptions;
use crate::error::{FsError, FsResult};
use crate::store::{CompletedPart, ObjectStore, PutOptions};
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Read size used when piping a reader into the stream
const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Outcome of a finished write stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    /// Full storage key written
    pub key: String,

    /// Total bytes written
    pub size: u64,

    /// Number of multipart parts; zero for a single put
    pub parts: i32,

    /// ETag of the final object
    pub etag: Option<String>,
}

/// State shared between the stream and its part upload tasks
struct Session {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
    put_options: PutOptions,
    upload_id: OnceCell<String>,
    aborted: OnceCell<()>,
}

impl Session {
    /// Upload id, opening the session on first use
    ///
    /// Concurrent callers wait on the same creation call.
    async fn upload_id(&self) -> FsResult<&str> {
        let id = self
            .upload_id
            .get_or_try_init(|| async {
                let id = self
                    .store
                    .create_multipart_upload(&self.bucket, &self.key, &self.put_options)
                    .await?;
                debug!(bucket = %self.bucket, key = %self.key, upload_id = %id, "multipart session created");
                Ok::<_, FsError>(id)
            })
            .await?;
        Ok(id.as_str())
    }

    async fn upload_part(self: Arc<Self>, part_number: i32, data: Bytes) -> FsResult<CompletedPart> {
        let upload_id = self.upload_id().await?;
        let size = data.len();
        match self
            .store
            .upload_part(&self.bucket, &self.key, upload_id, part_number, data)
            .await
        {
            Ok(etag) => {
                debug!(key = %self.key, part_number, size, "part uploaded");
                Ok(CompletedPart { part_number, etag })
            }
            Err(e) => {
                self.abort().await;
                Err(e)
            }
        }
    }

    /// Abort the session at most once; a failed abort is logged and ignored
    async fn abort(&self) {
        self.aborted
            .get_or_init(|| async {
                let upload_id = match self.upload_id().await {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(key = %self.key, error = %e, "no multipart session to abort");
                        return;
                    }
                };
                match self
                    .store
                    .abort_multipart_upload(&self.bucket, &self.key, upload_id)
                    .await
                {
                    Ok(()) => debug!(key = %self.key, upload_id, "multipart session aborted"),
                    Err(e) => {
                        warn!(key = %self.key, upload_id, error = %e, "failed to abort multipart session")
                    }
                }
            })
            .await;
    }
}

/// Push-based sink turning arbitrary writes into a multipart upload
pub struct MultipartWriteStream {
    session: Arc<Session>,
    options: WriteOptions,
    buffer: BytesMut,
    last_part: i32,
    pending: Vec<JoinHandle<FsResult<CompletedPart>>>,
    written: u64,
    failed: bool,
    settled: bool,
}

impl std::fmt::Debug for MultipartWriteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartWriteStream")
            .field("bucket", &self.session.bucket)
            .field("key", &self.session.key)
            .field("buffered", &self.buffer.len())
            .field("last_part", &self.last_part)
            .field("written", &self.written)
            .finish()
    }
}

impl MultipartWriteStream {
    /// Create a stream writing to `key` in `bucket`
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        key: impl Into<String>,
        put_options: PutOptions,
        options: WriteOptions,
    ) -> Self {
        Self {
            session: Arc::new(Session {
                store,
                bucket: bucket.into(),
                key: key.into(),
                put_options,
                upload_id: OnceCell::new(),
                aborted: OnceCell::new(),
            }),
            options: WriteOptions {
                part_size: options.part_size.max(1),
                ..options
            },
            buffer: BytesMut::new(),
            last_part: 0,
            pending: Vec::new(),
            written: 0,
            failed: false,
            settled: false,
        }
    }

    /// Storage key this stream writes to
    pub fn key(&self) -> &str {
        &self.session.key
    }

    /// Bytes accepted so far
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Number of parts cut so far
    pub fn parts_cut(&self) -> i32 {
        self.last_part
    }

    fn ensure_writable(&self) -> FsResult<()> {
        if self.failed {
            return Err(FsError::InvalidArgument(format!(
                "write stream for '{}' already failed",
                self.session.key
            )));
        }
        Ok(())
    }

    /// Append a chunk, cutting and dispatching parts as the buffer fills
    pub async fn write(&mut self, chunk: &[u8]) -> FsResult<()> {
        self.ensure_writable()?;
        self.buffer.extend_from_slice(chunk);
        self.written += chunk.len() as u64;

        while self.buffer.len() >= self.options.part_size {
            let part = self.buffer.split_to(self.options.part_size).freeze();
            self.cut_part(part).await?;
        }
        Ok(())
    }

    /// Number the part now, then upload it in the background
    async fn cut_part(&mut self, data: Bytes) -> FsResult<()> {
        let part_number = self.last_part + 1;
        if part_number > self.options.max_parts {
            self.failed = true;
            self.session.abort().await;
            return Err(FsError::MaxPartsExceeded {
                part_number,
                max_parts: self.options.max_parts,
            });
        }
        self.last_part = part_number;

        let session = Arc::clone(&self.session);
        self.pending
            .push(tokio::spawn(session.upload_part(part_number, data)));
        Ok(())
    }

    /// Pipe a reader into the stream until EOF, returning the bytes copied
    pub async fn copy_from<R>(&mut self, reader: &mut R) -> FsResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
        let mut copied = 0u64;
        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            self.write(&buffer[..n]).await?;
            copied += n as u64;
        }
        Ok(copied)
    }

    /// End the stream, optionally appending a final chunk first
    pub async fn end(mut self, chunk: Option<Bytes>) -> FsResult<UploadSummary> {
        if let Some(chunk) = chunk {
            self.write(&chunk).await?;
        }
        self.ensure_writable()?;

        if self.last_part == 0 {
            let body = self.buffer.split().freeze();
            let output = self
                .session
                .store
                .put_object(
                    &self.session.bucket,
                    &self.session.key,
                    body,
                    &self.session.put_options,
                )
                .await;
            self.settled = true;
            let output = output?;
            debug!(key = %self.session.key, size = self.written, "stored with single put");
            return Ok(UploadSummary {
                key: self.session.key.clone(),
                size: self.written,
                parts: 0,
                etag: output.etag,
            });
        }

        if !self.buffer.is_empty() {
            let last = self.buffer.split().freeze();
            self.cut_part(last).await?;
        }

        let mut parts = Vec::with_capacity(self.pending.len());
        let mut first_error = None;
        for handle in self.pending.drain(..) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(FsError::task(e)),
            };
            match result {
                Ok(part) => parts.push(part),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            self.settled = true;
            return Err(e);
        }

        parts.sort_by_key(|p| p.part_number);
        let upload_id = self.session.upload_id().await?.to_string();
        let result = self
            .session
            .store
            .complete_multipart_upload(&self.session.bucket, &self.session.key, &upload_id, &parts)
            .await;
        self.settled = true;
        let output = result?;

        info!(
            bucket = %self.session.bucket,
            key = %self.session.key,
            parts = parts.len(),
            size = self.written,
            "multipart upload completed"
        );
        Ok(UploadSummary {
            key: self.session.key.clone(),
            size: self.written,
            parts: self.last_part,
            etag: output.etag,
        })
    }

    /// End the stream without a final chunk
    pub async fn finish(self) -> FsResult<UploadSummary> {
        self.end(None).await
    }
}

impl Drop for MultipartWriteStream {
    fn drop(&mut self) {
        // uploaded parts of an unsettled session persist until aborted
        if self.settled || self.last_part == 0 {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let session = Arc::clone(&self.session);
            runtime.spawn(async move { session.abort().await });
        }
    }
}
