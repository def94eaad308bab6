//! Chunked object storage: files are split into fixed-size chunks, committed
//! behind a single metadata record, and streamed back lazily in order.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;
pub use db::StorageBackend;
pub use error::{Result, StoreError};
pub use models::{FileId, FileRecord};
pub use services::{ChunkStream, EngineOptions, FileService};
