use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, Stream};
use log::{debug, error};
use sha2::{Digest, Sha256};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use super::catalog::Catalog;
use crate::db::StorageBackend;
use crate::error::{Result, StoreError};
use crate::models::FileRecord;

/// Resolves filenames and opens ordered chunk streams.
#[derive(Clone)]
pub struct ChunkReader {
    backend: Arc<dyn StorageBackend>,
    catalog: Catalog,
}

impl ChunkReader {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            catalog: Catalog::new(backend.clone()),
            backend,
        }
    }

    pub async fn stat(&self, filename: &str) -> Result<FileRecord> {
        self.catalog.find_by_filename(filename).await
    }

    pub async fn open_stream(&self, filename: &str) -> Result<ChunkStream> {
        let record = self.stat(filename).await?;
        Ok(self.stream_record(record))
    }

    /// Streams an already resolved record.
    pub fn stream_record(&self, record: FileRecord) -> ChunkStream {
        ChunkStream::new(self.backend.clone(), record)
    }
}

type ChunkFetch = BoxFuture<'static, Result<Option<Bytes>>>;

/// Lazy, ordered sequence of a file's chunk payloads.
///
/// At most one chunk fetch is in flight. Dropping the stream drops that
/// fetch and the backend handle. The stream can be rewound with
/// [`ChunkStream::restart`] but not positioned mid-file.
///
/// Any inconsistency between the record and stored chunks yields a single
/// `CorruptObject` error, after which the stream ends.
pub struct ChunkStream {
    backend: Arc<dyn StorageBackend>,
    record: FileRecord,
    next: u32,
    received: u64,
    hasher: Sha256,
    in_flight: Option<ChunkFetch>,
    layout_checked: bool,
    done: bool,
}

impl fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkStream")
            .field("record", &self.record)
            .field("next", &self.next)
            .field("done", &self.done)
            .finish()
    }
}

impl ChunkStream {
    fn new(backend: Arc<dyn StorageBackend>, record: FileRecord) -> Self {
        Self {
            backend,
            record,
            next: 0,
            received: 0,
            hasher: Sha256::new(),
            in_flight: None,
            layout_checked: false,
            done: false,
        }
    }

    pub fn record(&self) -> &FileRecord {
        &self.record
    }

    pub fn content_type(&self) -> &str {
        &self.record.content_type
    }

    /// Rewinds to the first chunk, abandoning any fetch in progress.
    pub fn restart(&mut self) {
        self.next = 0;
        self.received = 0;
        self.hasher = Sha256::new();
        self.in_flight = None;
        self.layout_checked = false;
        self.done = false;
    }

    fn corrupt(&mut self, reason: String) -> StoreError {
        self.done = true;
        error!(
            "File {} ({}) is corrupt at chunk {}: {}",
            self.record.id, self.record.filename, self.next, reason
        );
        StoreError::CorruptObject {
            file_id: self.record.id,
            sequence: self.next,
            reason,
        }
    }

    fn accept(&mut self, payload: Bytes) -> Result<Bytes> {
        let expected = match self.record.expected_chunk_len(self.next) {
            Some(expected) => expected,
            None => return Err(self.corrupt("chunk lies past the recorded length".to_string())),
        };
        if payload.len() as u64 != expected {
            return Err(self.corrupt(format!(
                "expected {} bytes, found {}",
                expected,
                payload.len()
            )));
        }
        self.hasher.update(&payload);
        self.received += payload.len() as u64;
        self.next += 1;

        if self.next == self.record.chunk_count {
            let digest = format!("{:x}", self.hasher.finalize_reset());
            if self.received != self.record.length {
                self.next -= 1;
                return Err(self.corrupt(format!(
                    "reassembled {} bytes, record says {}",
                    self.received, self.record.length
                )));
            }
            if !self.record.sha256.is_empty() && digest != self.record.sha256 {
                self.next -= 1;
                return Err(self.corrupt("content digest does not match".to_string()));
            }
            debug!("Streamed {} ({} bytes)", self.record.filename, self.received);
        }
        Ok(payload)
    }
}

impl Stream for ChunkStream {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if !this.done && !this.layout_checked {
            this.layout_checked = true;
            if let Some(reason) = this.record.layout_error() {
                return Poll::Ready(Some(Err(this.corrupt(reason))));
            }
        }
        if this.done || this.next >= this.record.chunk_count {
            this.done = true;
            return Poll::Ready(None);
        }

        if this.in_flight.is_none() {
            let backend = this.backend.clone();
            let file_id = this.record.id;
            let sequence = this.next;
            this.in_flight = Some(Box::pin(async move { backend.get_chunk(file_id, sequence).await }));
        }
        let fetch = match this.in_flight.as_mut() {
            Some(fetch) => fetch,
            None => return Poll::Ready(None),
        };
        let fetched = ready!(fetch.poll_unpin(cx));
        this.in_flight = None;

        let item = match fetched {
            Ok(Some(payload)) => this.accept(payload),
            Ok(None) => Err(this.corrupt("chunk is missing".to_string())),
            Err(e) => {
                this.done = true;
                Err(e)
            }
        };
        Poll::Ready(Some(item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let remaining = self.record.chunk_count.saturating_sub(self.next) as usize;
        (0, Some(remaining))
    }
}
