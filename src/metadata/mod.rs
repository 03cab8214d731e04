//! Metadata sidecar: durable, append-only records a GUI front end or a
//! later analysis pass can read back. String artefacts, browser history,
//! cookies, downloads, and entropy regions are out of scope here (see
//! DESIGN.md), leaving just the carved-file and run-summary records.

pub mod jsonl;

use std::path::Path;

use thiserror::Error;

use crate::carve::CarveResult;

#[derive(Debug, Clone, serde::Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub source: String,
    pub output_dir: String,
    pub config_hash: String,
    pub bytes_scanned: u64,
    pub hits_found: u64,
    pub files_carved: u64,
    pub files_skipped: u64,
    pub duplicates_skipped: u64,
    pub errors: u64,
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub trait MetadataSink: Send + Sync {
    fn record_file(&self, run_id: &str, result: &CarveResult) -> Result<(), MetadataError>;
    fn record_run_summary(&self, summary: &RunSummary) -> Result<(), MetadataError>;
    fn flush(&self) -> Result<(), MetadataError>;
}

/// A no-op sink for `--dry-run`: results are still computed and hashed,
/// just never persisted.
pub struct DryRunSink;

impl MetadataSink for DryRunSink {
    fn record_file(&self, _run_id: &str, _result: &CarveResult) -> Result<(), MetadataError> {
        Ok(())
    }
    fn record_run_summary(&self, _summary: &RunSummary) -> Result<(), MetadataError> {
        Ok(())
    }
    fn flush(&self) -> Result<(), MetadataError> {
        Ok(())
    }
}

pub fn build_sink(
    run_output_dir: &Path,
    tool_version: &str,
    config_hash: &str,
    evidence_path: &Path,
) -> Result<Box<dyn MetadataSink>, MetadataError> {
    Ok(Box::new(jsonl::JsonlSink::new(
        tool_version,
        config_hash,
        evidence_path,
        run_output_dir,
    )?))
}

pub fn build_dry_run_sink() -> Box<dyn MetadataSink> {
    Box::new(DryRunSink)
}
