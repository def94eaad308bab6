use anyhow::{anyhow, Context, Result};
use dotenv::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::services::EngineOptions;

/// 255 KiB, the classic grid-store chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;
pub const DEFAULT_COMMIT_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Local,
    Postgres,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(BackendKind::Memory),
            "local" | "localfs" | "fs" => Ok(BackendKind::Local),
            "postgres" | "postgresql" | "pg" => Ok(BackendKind::Postgres),
            other => Err(anyhow!("unknown storage backend {:?}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendKind,
    pub database_url: Option<String>,
    pub data_dir: PathBuf,
    pub chunk_size: usize,
    pub commit_attempts: u32,
    pub retry_backoff: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let backend = match env::var("CHUNKSTORE_BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) => BackendKind::Local,
        };
        let database_url = env::var("DATABASE_URL").ok();
        if backend == BackendKind::Postgres && database_url.is_none() {
            return Err(anyhow!("DATABASE_URL not set but the postgres backend was selected"));
        }
        let data_dir = env::var("CHUNKSTORE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        let chunk_size = parse_var("CHUNKSTORE_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let commit_attempts = parse_var("CHUNKSTORE_COMMIT_ATTEMPTS", DEFAULT_COMMIT_ATTEMPTS)?;
        let backoff_ms = parse_var("CHUNKSTORE_RETRY_BACKOFF_MS", DEFAULT_RETRY_BACKOFF_MS)?;
        Ok(Self {
            backend,
            database_url,
            data_dir,
            chunk_size,
            commit_attempts,
            retry_backoff: Duration::from_millis(backoff_ms),
        })
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            chunk_size: self.chunk_size,
            commit_attempts: self.commit_attempts,
            retry_backoff: self.retry_backoff,
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}
