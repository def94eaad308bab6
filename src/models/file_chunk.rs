use bytes::Bytes;

use super::file::FileId;

/// One stored piece of a file, addressed by `(file_id, sequence)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunk {
    pub file_id: FileId,
    pub sequence: u32,
    pub payload: Bytes,
}

impl FileChunk {
    pub fn new(file_id: FileId, sequence: u32, payload: Bytes) -> Self {
        Self {
            file_id,
            sequence,
            payload,
        }
    }
}
