//! Embedded file store: chunks, records and the filename index as plain files.
//!
//! Layout under the root directory:
//!
//! ```text
//! chunks/<file_id>/chunk_<seq>   raw chunk payloads
//! records/<file_id>.json         committed FileRecords
//! names/<filename>               file id owning the filename
//! ```
//!
//! Payloads and records are written to a temporary file and renamed into
//! place, so readers never observe a half-written key. The filename index is
//! claimed with `create_new`, which is what makes filenames unique.

use async_trait::async_trait;
use bytes::Bytes;
use log::warn;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::StorageBackend;
use crate::error::{Result, StoreError};
use crate::models::{FileChunk, FileId, FileRecord};

pub struct LocalFsBackend {
    root: PathBuf,
}

impl LocalFsBackend {
    /// Opens (creating if needed) a store rooted at `root`.
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in ["chunks", "records", "names"] {
            fs::create_dir_all(root.join(dir)).await?;
        }
        Ok(Self { root })
    }

    fn chunk_dir(&self, file_id: FileId) -> PathBuf {
        self.root.join("chunks").join(file_id.to_string())
    }

    fn chunk_path(&self, file_id: FileId, sequence: u32) -> PathBuf {
        self.chunk_dir(file_id).join(format!("chunk_{:06}", sequence))
    }

    fn record_path(&self, id: FileId) -> PathBuf {
        self.root.join("records").join(format!("{}.json", id))
    }

    /// `None` for names that could escape the index directory.
    fn name_path(&self, filename: &str) -> Option<PathBuf> {
        let acceptable = !filename.is_empty()
            && filename != "."
            && filename != ".."
            && !filename.contains(['/', '\\', '\0']);
        acceptable.then(|| self.root.join("names").join(filename))
    }

    async fn read_record(&self, id: FileId) -> Result<Option<FileRecord>> {
        match fs::read(self.record_path(id)).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

async fn write_atomically(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
    let result = async {
        let mut f = fs::File::create(&tmp).await?;
        f.write_all(data).await?;
        f.sync_all().await?;
        fs::rename(&tmp, path).await
    }
    .await;
    if result.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    result
}

#[async_trait]
impl StorageBackend for LocalFsBackend {
    async fn put_chunk(&self, chunk: FileChunk) -> Result<()> {
        fs::create_dir_all(self.chunk_dir(chunk.file_id)).await?;
        let path = self.chunk_path(chunk.file_id, chunk.sequence);
        write_atomically(&path, &chunk.payload).await?;
        Ok(())
    }

    async fn get_chunk(&self, file_id: FileId, sequence: u32) -> Result<Option<Bytes>> {
        match fs::read(self.chunk_path(file_id, sequence)).await {
            Ok(buf) => Ok(Some(Bytes::from(buf))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_chunks_for_file(&self, file_id: FileId) -> Result<u64> {
        let dir = self.chunk_dir(file_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let is_chunk = entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with("chunk_") && !name.contains(".tmp-"))
                .unwrap_or(false);
            fs::remove_file(entry.path()).await?;
            if is_chunk {
                removed += 1;
            }
        }
        fs::remove_dir(&dir).await?;
        Ok(removed)
    }

    async fn chunk_file_ids(&self) -> Result<Vec<FileId>> {
        let mut entries = fs::read_dir(self.root.join("chunks")).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().and_then(|s| Uuid::parse_str(s).ok()) {
                Some(id) => ids.push(FileId::from(id)),
                None => warn!("Ignoring unexpected entry {:?} in chunk directory", name),
            }
        }
        Ok(ids)
    }

    async fn insert_record(&self, record: &FileRecord) -> Result<()> {
        let name_path = self
            .name_path(&record.filename)
            .ok_or_else(|| StoreError::InvalidArgument(format!("unusable filename {:?}", record.filename)))?;
        let claim = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&name_path)
            .await;
        let mut name_file = match claim {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::DuplicateFilename(record.filename.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let committed = async {
            name_file.write_all(record.id.to_string().as_bytes()).await?;
            name_file.sync_all().await?;
            let body = serde_json::to_vec_pretty(record)?;
            write_atomically(&self.record_path(record.id), &body).await?;
            Ok::<(), StoreError>(())
        }
        .await;

        if let Err(e) = committed {
            let _ = fs::remove_file(&name_path).await;
            return Err(e);
        }
        Ok(())
    }

    async fn query_by_filename(&self, filename: &str) -> Result<Option<FileRecord>> {
        let Some(name_path) = self.name_path(filename) else {
            return Ok(None);
        };
        let raw = match fs::read_to_string(&name_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let id = Uuid::parse_str(raw.trim())
            .map_err(|e| StoreError::MalformedRecord(format!("name index for {}: {}", filename, e)))?;
        // The record is written after the name is claimed; until then the file is not visible.
        Ok(self
            .read_record(FileId::from(id))
            .await?
            .filter(|record| record.filename == filename))
    }

    async fn query_by_id(&self, id: FileId) -> Result<Option<FileRecord>> {
        self.read_record(id).await
    }

    async fn query_all(&self) -> Result<Vec<FileRecord>> {
        let mut entries = fs::read_dir(self.root.join("records")).await?;
        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read(&path).await {
                Ok(raw) => records.push(serde_json::from_slice::<FileRecord>(&raw)?),
                // deleted between read_dir and read
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn delete_record(&self, id: FileId) -> Result<bool> {
        let Some(record) = self.read_record(id).await? else {
            return Ok(false);
        };
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        if let Some(name_path) = self.name_path(&record.filename) {
            if let Err(e) = fs::remove_file(&name_path).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!("Failed to release filename {}: {}", record.filename, e);
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(filename: &str) -> FileRecord {
        FileRecord {
            id: FileId::new(),
            filename: filename.to_string(),
            original_name: filename.to_string(),
            content_type: "text/plain".to_string(),
            length: 3,
            chunk_size: 16,
            chunk_count: 1,
            sha256: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn chunks_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let id = FileId::new();
        {
            let store = LocalFsBackend::open(tmp.path()).await.unwrap();
            store
                .put_chunk(FileChunk::new(id, 0, Bytes::from_static(b"abc")))
                .await
                .unwrap();
            store
                .put_chunk(FileChunk::new(id, 0, Bytes::from_static(b"xyz")))
                .await
                .unwrap();
        }
        let store = LocalFsBackend::open(tmp.path()).await.unwrap();
        assert_eq!(store.get_chunk(id, 0).await.unwrap(), Some(Bytes::from_static(b"xyz")));
        assert_eq!(store.get_chunk(id, 1).await.unwrap(), None);
        assert_eq!(store.chunk_file_ids().await.unwrap(), vec![id]);
        assert_eq!(store.delete_chunks_for_file(id).await.unwrap(), 1);
        assert!(store.chunk_file_ids().await.unwrap().is_empty());
        assert_eq!(store.delete_chunks_for_file(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn filename_index_is_unique() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalFsBackend::open(tmp.path()).await.unwrap();
        let first = record("same.txt");
        store.insert_record(&first).await.unwrap();
        let err = store.insert_record(&record("same.txt")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateFilename(name) if name == "same.txt"));

        let found = store.query_by_filename("same.txt").await.unwrap().unwrap();
        assert_eq!(found, first);
        assert_eq!(store.query_all().await.unwrap(), vec![first.clone()]);

        assert!(store.delete_record(first.id).await.unwrap());
        assert!(!store.delete_record(first.id).await.unwrap());
        assert!(store.query_by_filename("same.txt").await.unwrap().is_none());
        // the name is free again
        store.insert_record(&record("same.txt")).await.unwrap();
    }

    #[tokio::test]
    async fn path_like_names_never_resolve() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalFsBackend::open(tmp.path()).await.unwrap();
        assert!(store.query_by_filename("../records").await.unwrap().is_none());
        assert!(store.query_by_filename("..").await.unwrap().is_none());
        assert!(matches!(
            store.insert_record(&record("a/b")).await,
            Err(StoreError::InvalidArgument(_))
        ));
    }
}
