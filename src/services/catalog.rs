use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;

use crate::db::StorageBackend;
use crate::error::{Result, StoreError};
use crate::models::{FileId, FileRecord};

/// Outcome of an orphan sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub files_swept: u64,
    pub chunks_removed: u64,
}

/// Sole authority over which files exist. Chunks are reachable only through
/// a record this catalog resolves.
#[derive(Clone)]
pub struct Catalog {
    backend: Arc<dyn StorageBackend>,
}

impl Catalog {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Makes a fully written file visible.
    pub async fn commit(&self, record: &FileRecord) -> Result<()> {
        self.backend.insert_record(record).await?;
        debug!(
            "Committed {} ({} bytes, {} chunks) as {}",
            record.id, record.length, record.chunk_count, record.filename
        );
        Ok(())
    }

    pub async fn find_by_filename(&self, filename: &str) -> Result<FileRecord> {
        self.backend
            .query_by_filename(filename)
            .await?
            .ok_or_else(|| StoreError::NotFound(filename.to_string()))
    }

    pub async fn find_by_id(&self, id: FileId) -> Result<FileRecord> {
        self.backend
            .query_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("file {}", id)))
    }

    pub async fn list_all(&self) -> Result<Vec<FileRecord>> {
        self.backend.query_all().await
    }

    /// Removes the record, then its chunks.
    ///
    /// Once the record is gone the call succeeds even if chunk cleanup fails;
    /// leftovers are reported in the log and removed by [`Catalog::sweep_orphans`].
    pub async fn delete(&self, id: FileId) -> Result<()> {
        if !self.backend.delete_record(id).await? {
            return Err(StoreError::NotFound(format!("file {}", id)));
        }
        match self.backend.delete_chunks_for_file(id).await {
            Ok(removed) => info!("Deleted file {} and {} chunk(s)", id, removed),
            Err(e) => warn!("Deleted file {} but its chunks were left behind: {}", id, e),
        }
        Ok(())
    }

    /// Deletes chunks owned by no committed record, except for ids in `skip`.
    ///
    /// Chunks of uploads still being written elsewhere look exactly like
    /// orphans; callers pass the uploads they know to be in flight.
    pub async fn sweep_orphans(&self, skip: &HashSet<FileId>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for id in self.backend.chunk_file_ids().await? {
            if skip.contains(&id) || self.backend.query_by_id(id).await?.is_some() {
                continue;
            }
            match self.backend.delete_chunks_for_file(id).await {
                Ok(removed) => {
                    info!("Deleting orphaned chunks for file: {} ({} chunk(s))", id, removed);
                    report.files_swept += 1;
                    report.chunks_removed += removed;
                }
                Err(e) => warn!("Failed to delete orphaned chunks for file {}: {}", id, e),
            }
        }
        Ok(report)
    }
}
