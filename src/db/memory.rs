use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::StorageBackend;
use crate::error::{Result, StoreError};
use crate::models::{FileChunk, FileId, FileRecord};

#[derive(Default)]
struct State {
    records: HashMap<FileId, FileRecord>,
    by_filename: HashMap<String, FileId>,
    chunks: BTreeMap<(FileId, u32), Bytes>,
}

/// Process-local backend for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops a single chunk behind the catalog's back.
    pub async fn remove_chunk(&self, file_id: FileId, sequence: u32) -> bool {
        self.state.write().await.chunks.remove(&(file_id, sequence)).is_some()
    }

    pub async fn chunk_count(&self) -> usize {
        self.state.read().await.chunks.len()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn put_chunk(&self, chunk: FileChunk) -> Result<()> {
        let mut state = self.state.write().await;
        state.chunks.insert((chunk.file_id, chunk.sequence), chunk.payload);
        Ok(())
    }

    async fn get_chunk(&self, file_id: FileId, sequence: u32) -> Result<Option<Bytes>> {
        let state = self.state.read().await;
        Ok(state.chunks.get(&(file_id, sequence)).cloned())
    }

    async fn delete_chunks_for_file(&self, file_id: FileId) -> Result<u64> {
        let mut state = self.state.write().await;
        let keys: Vec<(FileId, u32)> = state
            .chunks
            .range((file_id, 0)..=(file_id, u32::MAX))
            .map(|(key, _)| *key)
            .collect();
        for key in &keys {
            state.chunks.remove(key);
        }
        Ok(keys.len() as u64)
    }

    async fn chunk_file_ids(&self) -> Result<Vec<FileId>> {
        let state = self.state.read().await;
        let mut ids: Vec<FileId> = state.chunks.keys().map(|(id, _)| *id).collect();
        ids.dedup();
        Ok(ids)
    }

    async fn insert_record(&self, record: &FileRecord) -> Result<()> {
        let mut state = self.state.write().await;
        if state.by_filename.contains_key(&record.filename) || state.records.contains_key(&record.id) {
            return Err(StoreError::DuplicateFilename(record.filename.clone()));
        }
        state.by_filename.insert(record.filename.clone(), record.id);
        state.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn query_by_filename(&self, filename: &str) -> Result<Option<FileRecord>> {
        let state = self.state.read().await;
        Ok(state
            .by_filename
            .get(filename)
            .and_then(|id| state.records.get(id))
            .cloned())
    }

    async fn query_by_id(&self, id: FileId) -> Result<Option<FileRecord>> {
        Ok(self.state.read().await.records.get(&id).cloned())
    }

    async fn query_all(&self) -> Result<Vec<FileRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<FileRecord> = state.records.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn delete_record(&self, id: FileId) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.records.remove(&id) {
            Some(record) => {
                state.by_filename.remove(&record.filename);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
