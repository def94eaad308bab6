use async_trait::async_trait;
use bytes::Bytes;
use log::info;
use sqlx::{Pool, Postgres};
use std::sync::Arc;

use crate::config::{BackendKind, Config};
use crate::error::{Result, StoreError};
use crate::models::{FileChunk, FileId, FileRecord};

pub mod file_chunks;
pub mod files;
pub mod localfs;
pub mod memory;
pub mod postgres;

pub use localfs::LocalFsBackend;
pub use memory::MemoryBackend;
pub use postgres::PgBackend;

/// Ordered-key substrate the engine stores records and chunks in.
///
/// Implementations only need per-key atomicity; the engine never asks for a
/// transaction spanning several calls.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Stores a chunk. Writing the same `(file_id, sequence)` twice overwrites it.
    async fn put_chunk(&self, chunk: FileChunk) -> Result<()>;

    async fn get_chunk(&self, file_id: FileId, sequence: u32) -> Result<Option<Bytes>>;

    /// Returns the number of chunks removed.
    async fn delete_chunks_for_file(&self, file_id: FileId) -> Result<u64>;

    /// Every file id that owns at least one chunk, committed or not.
    async fn chunk_file_ids(&self) -> Result<Vec<FileId>>;

    /// Fails with `DuplicateFilename` when the filename is taken.
    async fn insert_record(&self, record: &FileRecord) -> Result<()>;

    async fn query_by_filename(&self, filename: &str) -> Result<Option<FileRecord>>;

    async fn query_by_id(&self, id: FileId) -> Result<Option<FileRecord>>;

    /// Ordered by creation time, oldest first.
    async fn query_all(&self) -> Result<Vec<FileRecord>>;

    /// Returns whether a record was removed.
    async fn delete_record(&self, id: FileId) -> Result<bool>;
}

pub async fn init_db(database_url: &str) -> std::result::Result<Pool<Postgres>, sqlx::Error> {
    let pool = Pool::<Postgres>::connect(database_url).await?;
    Ok(pool)
}

/// Builds the backend selected by `config`, ready to use.
pub async fn connect(config: &Config) -> Result<Arc<dyn StorageBackend>> {
    match config.backend {
        BackendKind::Memory => {
            info!("Using in-memory storage; nothing survives this process");
            Ok(Arc::new(MemoryBackend::new()))
        }
        BackendKind::Local => {
            info!("Using local storage under {}", config.data_dir.display());
            let backend = LocalFsBackend::open(&config.data_dir).await?;
            Ok(Arc::new(backend))
        }
        BackendKind::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                StoreError::InvalidArgument("DATABASE_URL is required for postgres".to_string())
            })?;
            let pool = init_db(url).await?;
            let backend = PgBackend::new(pool);
            backend.migrate().await?;
            backend.health_check().await?;
            info!("Database OK.");
            Ok(Arc::new(backend))
        }
    }
}
