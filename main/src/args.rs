use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "main",
    about = "Ingest legal documents and retrieve passages with hybrid search"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Chunk, embed and store a UTF-8 text file as a new document
    Ingest(IngestArgs),
    /// Replace every chunk of an existing document with the contents of a file
    Reingest(ReingestArgs),
    /// Retrieve ranked passages for a question
    Query(QueryArgs),
}

#[derive(Debug, Clone, Args)]
pub struct IngestArgs {
    /// Document title; defaults to the file name
    #[arg(long)]
    pub title: Option<String>,

    /// Tag attached to the document and its chunks (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Citation label for the chunks; defaults to the title
    #[arg(long)]
    pub citation: Option<String>,

    #[arg(long)]
    pub category: Option<String>,

    /// Project the document belongs to
    #[arg(long)]
    pub project: Option<String>,

    pub file: PathBuf,
}

impl IngestArgs {
    pub fn resolved_title(&self) -> String {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map_or_else(|| title_from_path(&self.file), str::to_string)
    }
}

#[derive(Debug, Clone, Args)]
pub struct ReingestArgs {
    #[arg(long)]
    pub document_id: String,

    pub file: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct QueryArgs {
    /// Passages to return; defaults to `rag_top_k` from the configuration
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Only search documents carrying one of these tags (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    #[arg(long)]
    pub project: Option<String>,

    /// Print per-stage diagnostics alongside the results
    #[arg(long, default_value_t = false)]
    pub diagnostics: bool,

    pub text: String,
}

/// `ETA_3193_2012.txt` becomes `ETA 3193 2012`.
fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().replace('_', " "))
        .unwrap_or_default()
}
