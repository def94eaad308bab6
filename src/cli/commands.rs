use anyhow::{Context, Result};
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::Commands;
use chunkstore::services::policy::guess_content_type;
use chunkstore::{ChunkStream, FileId, FileRecord, FileService};

fn print_record(record: &FileRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
    } else {
        println!(
            "{}  {}  {} bytes  {} chunk(s)  {}{}  {}",
            record.id,
            record.filename,
            record.length,
            record.chunk_count,
            record.content_type,
            if record.is_image() { " [image]" } else { "" },
            record.created_at.to_rfc3339(),
        );
    }
    Ok(())
}

async fn pipe<W>(mut stream: ChunkStream, sink: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(chunk) = stream.try_next().await? {
        sink.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    sink.flush().await?;
    Ok(written)
}

async fn write_out(stream: ChunkStream, output: Option<PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            let mut file = fs::File::create(&path)
                .await
                .with_context(|| format!("create {}", path.display()))?;
            let written = pipe(stream, &mut file).await?;
            eprintln!("Wrote {} bytes to {}", written, path.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            pipe(stream, &mut stdout).await?;
        }
    }
    Ok(())
}

fn hint_for(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub async fn handle_cli(service: &FileService, cmd: Commands, json: bool) -> Result<()> {
    match cmd {
        Commands::Upload { file_path, content_type } => {
            let hint = hint_for(&file_path);
            let content_type = content_type.unwrap_or_else(|| guess_content_type(&hint));
            let file = fs::File::open(&file_path)
                .await
                .with_context(|| format!("open {}", file_path.display()))?;
            let record = service
                .upload(&hint, &content_type, file)
                .await
                .context("upload failed")?;
            print_record(&record, json)?;
        }
        Commands::List {} => {
            let files = service.list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else if files.is_empty() {
                println!("No files found");
            } else {
                for f in &files {
                    print_record(f, false)?;
                }
            }
        }
        Commands::Meta { filename } => {
            let record = service.get_metadata(&filename).await?;
            print_record(&record, json)?;
        }
        Commands::MetaId { file_id } => {
            let id: FileId = file_id.parse()?;
            let record = service.get_metadata_by_id(id).await?;
            print_record(&record, json)?;
        }
        Commands::Cat { filename, output } => {
            let (_, stream) = service.stream_content(&filename).await?;
            write_out(stream, output).await?;
        }
        Commands::Image { filename, output } => {
            let (_, stream) = service.render_image(&filename).await?;
            write_out(stream, output).await?;
        }
        Commands::Delete { file_id } => {
            let id: FileId = file_id.parse()?;
            service.delete(id).await?;
            println!("File {} deleted", id);
        }
        Commands::Sweep {} => {
            let report = service.sweep_orphans().await?;
            println!(
                "Removed {} chunk(s) from {} orphaned file(s)",
                report.chunks_removed, report.files_swept
            );
        }
    }
    Ok(())
}
