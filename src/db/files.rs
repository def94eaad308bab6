use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::models::{FileRecord, FileRow};

pub async fn create_file(pool: &Pool<Postgres>, record: &FileRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO files (file_id, filename, original_name, content_type, length, chunk_size, chunk_count, sha256, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(record.id.as_uuid())
    .bind(&record.filename)
    .bind(&record.original_name)
    .bind(&record.content_type)
    .bind(record.length as i64)
    .bind(record.chunk_size as i32)
    .bind(record.chunk_count as i32)
    .bind(&record.sha256)
    .bind(record.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_file_by_id(pool: &Pool<Postgres>, file_id: Uuid) -> Result<Option<FileRow>, sqlx::Error> {
    let record = sqlx::query_as::<_, FileRow>(
        r#"
        SELECT file_id, filename, original_name, content_type, length, chunk_size, chunk_count, sha256, created_at
        FROM files
        WHERE file_id = $1
        "#,
    )
    .bind(file_id)
    .fetch_optional(pool)
    .await?;
    Ok(record)
}

pub async fn get_file_by_name(pool: &Pool<Postgres>, filename: &str) -> Result<Option<FileRow>, sqlx::Error> {
    let record = sqlx::query_as::<_, FileRow>(
        r#"
        SELECT file_id, filename, original_name, content_type, length, chunk_size, chunk_count, sha256, created_at
        FROM files
        WHERE filename = $1
        "#,
    )
    .bind(filename)
    .fetch_optional(pool)
    .await?;
    Ok(record)
}

pub async fn list_all_files(pool: &Pool<Postgres>) -> Result<Vec<FileRow>, sqlx::Error> {
    let records = sqlx::query_as::<_, FileRow>(
        r#"
        SELECT file_id, filename, original_name, content_type, length, chunk_size, chunk_count, sha256, created_at
        FROM files
        ORDER BY created_at ASC, file_id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(records)
}

pub async fn delete_file(pool: &Pool<Postgres>, file_id: Uuid) -> Result<u64, sqlx::Error> {
    let rows = sqlx::query("DELETE FROM files WHERE file_id = $1")
        .bind(file_id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(rows)
}
