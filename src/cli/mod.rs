use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chunkstore")]
#[command(about = "Store files as ordered chunks and stream them back", long_about = None)]
pub struct Cli {
    /// Print records as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload a local file
    Upload {
        file_path: PathBuf,
        /// Declared content type; guessed from the extension when omitted
        #[arg(short, long)]
        content_type: Option<String>,
    },
    /// List stored files, oldest first
    List {},
    /// Show the record of a stored filename
    Meta { filename: String },
    /// Show the record of a file id
    MetaId { file_id: String },
    /// Stream a file's content
    Cat {
        filename: String,
        /// Write to this path instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Stream a file only if it is a renderable image
    Image {
        filename: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a file and all of its chunks
    Delete { file_id: String },
    /// Remove chunks that belong to no stored file
    Sweep {},
}

pub mod commands;
