use log::info;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncRead;

use crate::config::{DEFAULT_CHUNK_SIZE, DEFAULT_COMMIT_ATTEMPTS, DEFAULT_RETRY_BACKOFF_MS};
use crate::db::StorageBackend;
use crate::error::{Result, StoreError};
use crate::models::{FileId, FileRecord};

pub mod catalog;
pub mod naming;
pub mod policy;
pub mod reader;
pub mod writer;

pub use catalog::{Catalog, SweepReport};
pub use naming::{FilenameGenerator, RandomFilenames};
pub use reader::{ChunkReader, ChunkStream};
pub use writer::{ChunkWriter, InFlight, PendingFile};

/// Upper bound on a single chunk payload.
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub chunk_size: usize,
    /// Total commit attempts, counting retries after filename collisions.
    pub commit_attempts: u32,
    /// Pause before the single retry of a failed chunk write.
    pub retry_backoff: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

impl EngineOptions {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(StoreError::InvalidArgument(format!(
                "chunk size must be between 1 and {} bytes, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if self.commit_attempts == 0 {
            return Err(StoreError::InvalidArgument(
                "commit attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Boundary of the storage engine used by the surrounding service.
pub struct FileService {
    catalog: Catalog,
    reader: ChunkReader,
    writer: ChunkWriter,
    namer: Arc<dyn FilenameGenerator>,
    in_flight: InFlight,
}

impl FileService {
    /// Builds a ready engine over an already connected backend.
    pub fn new(backend: Arc<dyn StorageBackend>, options: EngineOptions) -> Result<Self> {
        Self::with_namer(backend, options, Arc::new(RandomFilenames))
    }

    pub fn with_namer(
        backend: Arc<dyn StorageBackend>,
        options: EngineOptions,
        namer: Arc<dyn FilenameGenerator>,
    ) -> Result<Self> {
        options.validate()?;
        let in_flight: InFlight = Arc::new(Mutex::new(HashSet::new()));
        Ok(Self {
            catalog: Catalog::new(backend.clone()),
            reader: ChunkReader::new(backend.clone()),
            writer: ChunkWriter::new(backend, namer.clone(), options, in_flight.clone()),
            namer,
            in_flight,
        })
    }

    /// Stores `source` under a freshly generated filename and returns the committed record.
    pub async fn upload<R>(&self, filename_hint: &str, content_type: &str, source: R) -> Result<FileRecord>
    where
        R: AsyncRead + Unpin + Send,
    {
        let filename = self.namer.generate(filename_hint);
        let pending = PendingFile::new(filename, filename_hint, policy::normalize_content_type(content_type));
        info!(
            "Uploading {} as {} ({})",
            filename_hint, pending.filename, pending.content_type
        );
        self.writer.write(pending, source).await
    }

    pub async fn list(&self) -> Result<Vec<FileRecord>> {
        self.catalog.list_all().await
    }

    pub async fn get_metadata(&self, filename: &str) -> Result<FileRecord> {
        self.reader.stat(filename).await
    }

    pub async fn get_metadata_by_id(&self, id: FileId) -> Result<FileRecord> {
        self.catalog.find_by_id(id).await
    }

    /// Content type plus the lazy chunk stream of `filename`.
    pub async fn stream_content(&self, filename: &str) -> Result<(String, ChunkStream)> {
        let stream = self.reader.open_stream(filename).await?;
        Ok((stream.content_type().to_string(), stream))
    }

    /// Like [`FileService::stream_content`], but only for renderable images.
    /// The content type is checked before any chunk is fetched.
    pub async fn render_image(&self, filename: &str) -> Result<(String, ChunkStream)> {
        let record = self.reader.stat(filename).await?;
        policy::ensure_renderable_image(&record)?;
        let stream = self.reader.stream_record(record);
        Ok((stream.content_type().to_string(), stream))
    }

    pub async fn delete(&self, id: FileId) -> Result<()> {
        self.catalog.delete(id).await
    }

    /// Removes chunks no committed record owns, sparing this process's running uploads.
    pub async fn sweep_orphans(&self) -> Result<SweepReport> {
        let skip = self
            .in_flight
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone());
        let report = self.catalog.sweep_orphans(&skip).await?;
        info!(
            "Sweep removed {} chunk(s) from {} orphaned file(s)",
            report.chunks_removed, report.files_swept
        );
        Ok(report)
    }
}
