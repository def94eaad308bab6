//! Runs against a live PostgreSQL only when CHUNKSTORE_TEST_DATABASE_URL is set.

use futures::TryStreamExt;
use std::sync::Arc;
use std::time::Duration;

use chunkstore::db::{init_db, PgBackend};
use chunkstore::{EngineOptions, FileService, StoreError};

async fn pg_service() -> Option<FileService> {
    let url = std::env::var("CHUNKSTORE_TEST_DATABASE_URL").ok()?;
    let pool = init_db(&url).await.expect("connect to test database");
    let backend = PgBackend::new(pool);
    backend.migrate().await.expect("migrate");
    let options = EngineOptions {
        chunk_size: 4096,
        commit_attempts: 3,
        retry_backoff: Duration::from_millis(1),
    };
    Some(FileService::new(Arc::new(backend), options).expect("service"))
}

#[tokio::test]
async fn postgres_round_trip_and_delete() {
    let Some(service) = pg_service().await else {
        eprintln!("CHUNKSTORE_TEST_DATABASE_URL not set, skipping");
        return;
    };

    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let record = service
        .upload("sample.bin", "application/octet-stream", &data[..])
        .await
        .unwrap();
    assert_eq!(record.chunk_count, 3);

    let (_, stream) = service.stream_content(&record.filename).await.unwrap();
    let chunks: Vec<_> = stream.try_collect().await.unwrap();
    assert_eq!(chunks.concat(), data);

    let listed = service.list().await.unwrap();
    assert!(listed.iter().any(|r| r.id == record.id));

    service.delete(record.id).await.unwrap();
    assert!(matches!(
        service.get_metadata(&record.filename).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        service.delete(record.id).await,
        Err(StoreError::NotFound(_))
    ));
}
