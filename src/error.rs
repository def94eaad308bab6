use thiserror::Error;

use crate::models::FileId;

/// Every failure the storage engine surfaces to its callers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} does not exist")]
    NotFound(String),

    /// Collision on commit. The writer regenerates the filename and retries.
    #[error("filename {0} is already taken")]
    DuplicateFilename(String),

    /// The upload was aborted and every chunk written for it was removed.
    #[error("upload failed after {chunks_flushed} chunk(s) were flushed: {source}")]
    WriteFailed {
        chunks_flushed: u32,
        #[source]
        source: Box<StoreError>,
    },

    /// Metadata and chunk data disagree. May be transient when a delete races a read.
    #[error("file {file_id} is corrupt at chunk {sequence}: {reason}")]
    CorruptObject {
        file_id: FileId,
        sequence: u32,
        reason: String,
    },

    #[error("content type {0} is not renderable as an image")]
    InvalidContentType(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn write_failed(chunks_flushed: u32, source: StoreError) -> Self {
        StoreError::WriteFailed {
            chunks_flushed,
            source: Box::new(source),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
