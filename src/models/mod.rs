use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;

pub mod file;
pub mod file_chunk;

pub use file::{chunk_count_for, FileId, FileRecord, RENDERABLE_IMAGE_TYPES};
pub use file_chunk::FileChunk;

/// Row shape of the `files` table.
#[derive(sqlx::FromRow, Debug)]
pub struct FileRow {
    pub file_id: Uuid,
    pub filename: String,
    pub original_name: String,
    pub content_type: String,
    pub length: i64,
    pub chunk_size: i32,
    pub chunk_count: i32,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<FileRow> for FileRecord {
    type Error = StoreError;

    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        let malformed = |field: &str| {
            StoreError::MalformedRecord(format!("file {} has negative {}", row.file_id, field))
        };
        let length = u64::try_from(row.length).map_err(|_| malformed("length"))?;
        let chunk_size = u32::try_from(row.chunk_size).map_err(|_| malformed("chunk_size"))?;
        let chunk_count = u32::try_from(row.chunk_count).map_err(|_| malformed("chunk_count"))?;
        let record = FileRecord {
            id: FileId::from(row.file_id),
            filename: row.filename,
            original_name: row.original_name,
            content_type: row.content_type,
            length,
            chunk_size,
            chunk_count,
            sha256: row.sha256,
            created_at: row.created_at,
        };
        if let Some(reason) = record.layout_error() {
            return Err(StoreError::MalformedRecord(format!("file {}: {}", record.id, reason)));
        }
        Ok(record)
    }
}
