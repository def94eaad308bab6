use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::catalog::Catalog;
use super::naming::FilenameGenerator;
use super::EngineOptions;
use crate::db::StorageBackend;
use crate::error::{Result, StoreError};
use crate::models::{chunk_count_for, FileChunk, FileId, FileRecord};

/// A file whose chunks are being written. It has no record yet, so nothing
/// can resolve it.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub id: FileId,
    pub filename: String,
    pub original_name: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

impl PendingFile {
    pub fn new(filename: String, original_name: &str, content_type: String) -> Self {
        Self {
            id: FileId::new(),
            filename,
            original_name: original_name.to_string(),
            content_type,
            created_at: Utc::now(),
        }
    }

    fn into_record(self, length: u64, chunk_size: u32, chunk_count: u32, sha256: String) -> FileRecord {
        FileRecord {
            id: self.id,
            filename: self.filename,
            original_name: self.original_name,
            content_type: self.content_type,
            length,
            chunk_size,
            chunk_count,
            sha256,
            created_at: self.created_at,
        }
    }
}

/// Ids of uploads running in this process.
pub type InFlight = Arc<Mutex<HashSet<FileId>>>;

/// Streams a source into chunks and commits the record last.
#[derive(Clone)]
pub struct ChunkWriter {
    backend: Arc<dyn StorageBackend>,
    catalog: Catalog,
    namer: Arc<dyn FilenameGenerator>,
    options: EngineOptions,
    in_flight: InFlight,
}

impl ChunkWriter {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        namer: Arc<dyn FilenameGenerator>,
        options: EngineOptions,
        in_flight: InFlight,
    ) -> Self {
        Self {
            catalog: Catalog::new(backend.clone()),
            backend,
            namer,
            options,
            in_flight,
        }
    }

    /// Writes every chunk of `source` in order, then commits the record.
    ///
    /// On failure, and when the returned future is dropped before completion,
    /// the chunks written so far are deleted and nothing becomes visible.
    pub async fn write<R>(&self, pending: PendingFile, mut source: R) -> Result<FileRecord>
    where
        R: AsyncRead + Unpin + Send,
    {
        let file_id = pending.id;
        let _ticket = InFlightTicket::register(&self.in_flight, file_id);
        let mut guard = RollbackGuard::new(self.backend.clone(), file_id);
        let chunk_size = self.options.chunk_size;

        let mut hasher = Sha256::new();
        let mut sequence: u32 = 0;
        let mut length: u64 = 0;
        loop {
            let increment = match read_increment(&mut source, chunk_size).await {
                Ok(buf) => buf,
                Err(e) => return Err(self.abort(&mut guard, sequence, e.into()).await),
            };
            if increment.is_empty() {
                break;
            }
            if sequence == u32::MAX {
                let cause = StoreError::InvalidArgument("file has too many chunks".to_string());
                return Err(self.abort(&mut guard, sequence, cause).await);
            }
            let at_end = increment.len() < chunk_size;
            hasher.update(&increment);
            length += increment.len() as u64;

            let chunk = FileChunk::new(file_id, sequence, increment);
            if let Err(e) = self.put_with_retry(chunk).await {
                return Err(self.abort(&mut guard, sequence, e).await);
            }
            sequence += 1;
            if at_end {
                break;
            }
        }
        debug_assert_eq!(sequence, chunk_count_for(length, chunk_size as u32));

        let sha256 = format!("{:x}", hasher.finalize());
        let mut record = pending.into_record(length, chunk_size as u32, sequence, sha256);
        let mut attempt = 1;
        loop {
            match self.catalog.commit(&record).await {
                Ok(()) => {
                    guard.disarm();
                    info!(
                        "Stored {} as {} ({} bytes in {} chunk(s))",
                        record.original_name, record.filename, record.length, record.chunk_count
                    );
                    return Ok(record);
                }
                Err(StoreError::DuplicateFilename(taken)) if attempt < self.options.commit_attempts => {
                    let fresh = self.namer.generate(&record.original_name);
                    warn!("Filename {} already taken, retrying commit as {}", taken, fresh);
                    record.filename = fresh;
                    attempt += 1;
                }
                Err(e @ StoreError::DuplicateFilename(_)) => {
                    error!("Upload of {} gave up after {} filename collision(s)", file_id, attempt);
                    guard.rollback().await;
                    return Err(e);
                }
                Err(e) => return Err(self.abort(&mut guard, sequence, e).await),
            }
        }
    }

    async fn put_with_retry(&self, chunk: FileChunk) -> Result<()> {
        match self.backend.put_chunk(chunk.clone()).await {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(
                    "Writing chunk {} of {} failed, retrying once: {}",
                    chunk.sequence, chunk.file_id, first
                );
                tokio::time::sleep(self.options.retry_backoff).await;
                self.backend.put_chunk(chunk).await
            }
        }
    }

    async fn abort(&self, guard: &mut RollbackGuard, chunks_flushed: u32, cause: StoreError) -> StoreError {
        error!(
            "Upload of {} aborted after {} chunk(s): {}",
            guard.file_id, chunks_flushed, cause
        );
        guard.rollback().await;
        StoreError::write_failed(chunks_flushed, cause)
    }
}

/// Fills up to `chunk_size` bytes; a shorter result means the source is exhausted.
async fn read_increment<R>(source: &mut R, chunk_size: usize) -> std::io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size];
    let mut filled = 0;
    while filled < chunk_size {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(Bytes::from(buf))
}

struct InFlightTicket {
    in_flight: InFlight,
    file_id: FileId,
}

impl InFlightTicket {
    fn register(in_flight: &InFlight, file_id: FileId) -> Self {
        in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(file_id);
        Self {
            in_flight: in_flight.clone(),
            file_id,
        }
    }
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.file_id);
    }
}

/// Deletes the chunks of an upload that did not commit.
///
/// Cancellation cleanup races a commit the backend may still be applying;
/// see the note in `Drop`.
struct RollbackGuard {
    backend: Arc<dyn StorageBackend>,
    file_id: FileId,
    armed: bool,
}

impl RollbackGuard {
    fn new(backend: Arc<dyn StorageBackend>, file_id: FileId) -> Self {
        Self {
            backend,
            file_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    async fn rollback(&mut self) {
        match self.backend.delete_chunks_for_file(self.file_id).await {
            Ok(removed) => debug!("Rolled back {} chunk(s) of {}", removed, self.file_id),
            Err(e) => warn!(
                "Rollback of {} failed, its chunks are orphaned until the next sweep: {}",
                self.file_id, e
            ),
        }
        self.armed = false;
    }
}

impl Drop for RollbackGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let backend = self.backend.clone();
        let file_id = self.file_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Upload of {} was cancelled, removing its chunks", file_id);
                // Not airtight: an insert still in flight on the backend when the
                // upload is dropped can land after the check below, leaving a
                // committed record whose chunks were removed.
                handle.spawn(async move {
                    // The commit may have landed just before cancellation.
                    match backend.query_by_id(file_id).await {
                        Ok(Some(_)) => return,
                        Ok(None) => {}
                        Err(e) => {
                            warn!("Could not check {} before rollback, leaving its chunks: {}", file_id, e);
                            return;
                        }
                    }
                    if let Err(e) = backend.delete_chunks_for_file(file_id).await {
                        warn!("Rollback of cancelled upload {} failed: {}", file_id, e);
                    }
                });
            }
            Err(_) => warn!(
                "Upload of {} was cancelled outside a runtime, its chunks are orphaned",
                file_id
            ),
        }
    }
}
