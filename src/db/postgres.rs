use async_trait::async_trait;
use bytes::Bytes;
use sqlx::{Pool, Postgres};

use super::{file_chunks, files, StorageBackend};
use crate::error::{Result, StoreError};
use crate::models::{FileChunk, FileId, FileRecord};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS files (
        file_id UUID PRIMARY KEY,
        filename TEXT NOT NULL UNIQUE,
        original_name TEXT NOT NULL,
        content_type TEXT NOT NULL,
        length BIGINT NOT NULL,
        chunk_size INTEGER NOT NULL,
        chunk_count INTEGER NOT NULL,
        sha256 TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS file_chunks (
        file_id UUID NOT NULL,
        chunk_index INTEGER NOT NULL,
        data BYTEA NOT NULL,
        PRIMARY KEY (file_id, chunk_index)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_files_created_at ON files (created_at)",
];

/// PostgreSQL backend. Chunks live in `file_chunks` without a foreign key so
/// they can be written before their record is committed.
#[derive(Clone)]
pub struct PgBackend {
    pool: Pool<Postgres>,
}

impl PgBackend {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn sequence_column(sequence: u32) -> Result<i32> {
    i32::try_from(sequence)
        .map_err(|_| StoreError::InvalidArgument(format!("chunk sequence {} out of range", sequence)))
}

#[async_trait]
impl StorageBackend for PgBackend {
    async fn put_chunk(&self, chunk: FileChunk) -> Result<()> {
        let index = sequence_column(chunk.sequence)?;
        file_chunks::upsert_file_chunk(&self.pool, chunk.file_id.as_uuid(), index, &chunk.payload).await?;
        Ok(())
    }

    async fn get_chunk(&self, file_id: FileId, sequence: u32) -> Result<Option<Bytes>> {
        let index = sequence_column(sequence)?;
        let data = file_chunks::get_chunk_data(&self.pool, file_id.as_uuid(), index).await?;
        Ok(data.map(Bytes::from))
    }

    async fn delete_chunks_for_file(&self, file_id: FileId) -> Result<u64> {
        Ok(file_chunks::delete_chunks_by_file_id(&self.pool, file_id.as_uuid()).await?)
    }

    async fn chunk_file_ids(&self) -> Result<Vec<FileId>> {
        let ids = file_chunks::list_chunk_owners(&self.pool).await?;
        Ok(ids.into_iter().map(FileId::from).collect())
    }

    async fn insert_record(&self, record: &FileRecord) -> Result<()> {
        match files::create_file(&self.pool, record).await {
            Ok(()) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::DuplicateFilename(record.filename.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn query_by_filename(&self, filename: &str) -> Result<Option<FileRecord>> {
        files::get_file_by_name(&self.pool, filename)
            .await?
            .map(FileRecord::try_from)
            .transpose()
    }

    async fn query_by_id(&self, id: FileId) -> Result<Option<FileRecord>> {
        files::get_file_by_id(&self.pool, id.as_uuid())
            .await?
            .map(FileRecord::try_from)
            .transpose()
    }

    async fn query_all(&self) -> Result<Vec<FileRecord>> {
        files::list_all_files(&self.pool)
            .await?
            .into_iter()
            .map(FileRecord::try_from)
            .collect()
    }

    async fn delete_record(&self, id: FileId) -> Result<bool> {
        let rows = files::delete_file(&self.pool, id.as_uuid()).await?;
        Ok(rows > 0)
    }
}
