//! Command-line surface, built on `clap`-derive in the same style as
//! `CliOptions` elsewhere in this codebase: a flat struct plus
//! `try_parse_from`-based unit tests.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Signature-based file carving engine")]
pub struct CliOptions {
    /// Source: a file, an image, or a raw device address
    #[arg(long)]
    pub source: PathBuf,

    /// Output directory for carved files and metadata
    #[arg(long)]
    pub out: PathBuf,

    /// Optional path to a YAML config file; falls back to the built-in default
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Minimum size in bytes, suffix-aware (k|m|g)
    #[arg(long)]
    pub min_size: Option<String>,

    /// Chunk size in bytes, suffix-aware (k|m|g)
    #[arg(long)]
    pub chunk_size: Option<String>,

    /// Chunk overlap in bytes, suffix-aware (k|m|g)
    #[arg(long)]
    pub overlap: Option<String>,

    /// Maximum number of files to carve
    #[arg(long)]
    pub max_files: Option<u64>,

    /// Maximum bytes to scan, suffix-aware (k|m|g)
    #[arg(long)]
    pub max_bytes: Option<String>,

    /// Byte offset to begin scanning at, suffix-aware (k|m|g)
    #[arg(long)]
    pub start_offset: Option<String>,

    /// Deduplicate identical carved files by content hash
    #[arg(long)]
    pub dedup: bool,

    /// Comma-separated signature names to restrict carving to; empty means all
    #[arg(long, value_delimiter = ',')]
    pub types: Option<Vec<String>>,

    /// Compute and hash results without writing carved files to disk
    #[arg(long)]
    pub dry_run: bool,

    /// Log verbosity
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}
