use anyhow::{Context, Result};
use clap::Parser;
use log::info;

mod cli;

use chunkstore::{db, Config, FileService};
use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = Config::from_env()?;
    info!("Starting with {:?} storage, chunk size {} bytes", cfg.backend, cfg.chunk_size);

    let backend = db::connect(&cfg).await.context("connect to storage")?;
    let service = FileService::new(backend, cfg.engine_options()).context("initialize engine")?;

    cli::commands::handle_cli(&service, cli.command, cli.json).await
}
