use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Content types the image view is allowed to render.
pub const RENDERABLE_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// Opaque identifier of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
    pub fn new() -> Self {
        FileId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for FileId {
    fn from(id: Uuid) -> Self {
        FileId(id)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for FileId {
    type Err = StoreError;

    /// Ids coming from outside are validated here and never handed to storage unchecked.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(StoreError::InvalidArgument("file id is empty".to_string()));
        }
        Uuid::parse_str(trimmed)
            .map(FileId)
            .map_err(|e| StoreError::InvalidArgument(format!("malformed file id {:?}: {}", s, e)))
    }
}

/// Metadata of a committed file. Only committed files ever have a record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: FileId,
    pub filename: String,
    pub original_name: String,
    pub content_type: String,
    pub length: u64,
    pub chunk_size: u32,
    pub chunk_count: u32,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn is_image(&self) -> bool {
        RENDERABLE_IMAGE_TYPES.contains(&self.content_type.as_str())
    }

    /// Expected payload length of chunk `sequence`, or `None` past the end
    /// of either the chunk count or the byte length.
    pub fn expected_chunk_len(&self, sequence: u32) -> Option<u64> {
        if sequence >= self.chunk_count {
            return None;
        }
        let start = sequence as u64 * self.chunk_size as u64;
        match self.length.checked_sub(start) {
            Some(remaining) if remaining > 0 => Some(remaining.min(self.chunk_size as u64)),
            _ => None,
        }
    }

    /// Describes why `length`, `chunk_size` and `chunk_count` cannot belong
    /// to the same file, if they cannot.
    pub fn layout_error(&self) -> Option<String> {
        if self.length > 0 && self.chunk_size == 0 {
            return Some(format!("{} bytes recorded with a zero chunk size", self.length));
        }
        let expected = chunk_count_for(self.length, self.chunk_size);
        if expected != self.chunk_count {
            return Some(format!(
                "{} bytes in {}-byte chunks need {} chunk(s), record says {}",
                self.length, self.chunk_size, expected, self.chunk_count
            ));
        }
        None
    }
}

/// Number of chunks needed to hold `length` bytes.
pub fn chunk_count_for(length: u64, chunk_size: u32) -> u32 {
    if chunk_size == 0 {
        return 0;
    }
    length.div_ceil(chunk_size as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(length: u64, chunk_size: u32) -> FileRecord {
        FileRecord {
            id: FileId::new(),
            filename: "a.bin".to_string(),
            original_name: "a.bin".to_string(),
            content_type: "application/octet-stream".to_string(),
            length,
            chunk_size,
            chunk_count: chunk_count_for(length, chunk_size),
            sha256: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(chunk_count_for(0, 10), 0);
        assert_eq!(chunk_count_for(1, 10), 1);
        assert_eq!(chunk_count_for(10, 10), 1);
        assert_eq!(chunk_count_for(11, 10), 2);
        assert_eq!(chunk_count_for(600 * 1024, 255 * 1024), 3);
    }

    #[test]
    fn last_chunk_is_the_remainder() {
        let rec = record(600 * 1024, 255 * 1024);
        assert_eq!(rec.expected_chunk_len(0), Some(255 * 1024));
        assert_eq!(rec.expected_chunk_len(1), Some(255 * 1024));
        assert_eq!(rec.expected_chunk_len(2), Some(90 * 1024));
        assert_eq!(rec.expected_chunk_len(3), None);
    }

    #[test]
    fn inconsistent_layout_is_detected() {
        let mut rec = record(10, 4);
        assert_eq!(rec.layout_error(), None);
        rec.chunk_count = 5;
        assert!(rec.layout_error().is_some());
        assert_eq!(rec.expected_chunk_len(2), Some(2));
        assert_eq!(rec.expected_chunk_len(3), None);
        assert_eq!(rec.expected_chunk_len(4), None);

        let mut rec = record(10, 4);
        rec.chunk_size = 0;
        rec.chunk_count = 0;
        assert!(rec.layout_error().is_some());
        assert_eq!(record(0, 4).layout_error(), None);
    }

    #[test]
    fn file_id_rejects_garbage() {
        assert!(matches!("".parse::<FileId>(), Err(StoreError::InvalidArgument(_))));
        assert!(matches!(
            "../../etc/passwd".parse::<FileId>(),
            Err(StoreError::InvalidArgument(_))
        ));
        let id = FileId::new();
        assert_eq!(id.to_string().parse::<FileId>().unwrap(), id);
    }

    #[test]
    fn image_policy_on_records() {
        let mut rec = record(1, 1);
        rec.content_type = "image/png".to_string();
        assert!(rec.is_image());
        rec.content_type = "image/gif".to_string();
        assert!(!rec.is_image());
    }
}
