use sqlx::{Pool, Postgres};
use uuid::Uuid;

pub async fn upsert_file_chunk(
    pool: &Pool<Postgres>,
    file_id: Uuid,
    chunk_index: i32,
    data: &[u8],
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO file_chunks (file_id, chunk_index, data)
        VALUES ($1, $2, $3)
        ON CONFLICT (file_id, chunk_index) DO UPDATE SET data = EXCLUDED.data
        "#,
    )
    .bind(file_id)
    .bind(chunk_index)
    .bind(data)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_chunk_data(
    pool: &Pool<Postgres>,
    file_id: Uuid,
    chunk_index: i32,
) -> Result<Option<Vec<u8>>, sqlx::Error> {
    let data = sqlx::query_scalar::<_, Vec<u8>>(
        "SELECT data FROM file_chunks WHERE file_id = $1 AND chunk_index = $2",
    )
    .bind(file_id)
    .bind(chunk_index)
    .fetch_optional(pool)
    .await?;
    Ok(data)
}

pub async fn delete_chunks_by_file_id(pool: &Pool<Postgres>, file_id: Uuid) -> Result<u64, sqlx::Error> {
    let rows = sqlx::query("DELETE FROM file_chunks WHERE file_id = $1")
        .bind(file_id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(rows)
}

pub async fn list_chunk_owners(pool: &Pool<Postgres>) -> Result<Vec<Uuid>, sqlx::Error> {
    let ids = sqlx::query_scalar::<_, Uuid>("SELECT DISTINCT file_id FROM file_chunks")
        .fetch_all(pool)
        .await?;
    Ok(ids)
}
