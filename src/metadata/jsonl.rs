//! JSON-Lines metadata sink: one record per line, with a
//! `#[serde(flatten)]` envelope of run-identifying fields wrapped around
//! each payload. Two streams: carved files and the run summary.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

use crate::carve::CarveResult;
use crate::metadata::{MetadataError, MetadataSink, RunSummary};

pub struct JsonlSink {
    tool_version: String,
    config_hash: String,
    evidence_path: String,
    files_writer: Mutex<BufWriter<File>>,
    run_writer: Mutex<BufWriter<File>>,
}

#[derive(Serialize)]
struct CarvedFilePayload<'a> {
    run_id: &'a str,
    signature_name: &'a str,
    start_offset: u64,
    end_offset: u64,
    length: u64,
    out_path: Option<&'a Path>,
    ok: bool,
    note: &'a str,
    sha256: Option<&'a str>,
}

#[derive(Serialize)]
struct CarvedFileRecord<'a> {
    #[serde(flatten)]
    file: CarvedFilePayload<'a>,
    tool_version: &'a str,
    config_hash: &'a str,
    evidence_path: &'a str,
}

#[derive(Serialize)]
struct RunSummaryRecord<'a> {
    #[serde(flatten)]
    summary: &'a RunSummary,
    tool_version: &'a str,
    config_hash: &'a str,
    evidence_path: &'a str,
}

impl JsonlSink {
    pub fn new(
        tool_version: &str,
        config_hash: &str,
        evidence_path: &Path,
        run_output_dir: &Path,
    ) -> Result<Self, MetadataError> {
        let meta_dir = run_output_dir.join("metadata");
        std::fs::create_dir_all(&meta_dir)?;
        let files_file = File::create(meta_dir.join("carved_files.jsonl"))?;
        let run_file = File::create(meta_dir.join("run_summary.jsonl"))?;
        Ok(Self {
            tool_version: tool_version.to_string(),
            config_hash: config_hash.to_string(),
            evidence_path: evidence_path.to_string_lossy().to_string(),
            files_writer: Mutex::new(BufWriter::new(files_file)),
            run_writer: Mutex::new(BufWriter::new(run_file)),
        })
    }
}

impl MetadataSink for JsonlSink {
    fn record_file(&self, run_id: &str, result: &CarveResult) -> Result<(), MetadataError> {
        let record = CarvedFileRecord {
            file: CarvedFilePayload {
                run_id,
                signature_name: &result.signature_name,
                start_offset: result.start_offset,
                end_offset: result.end_offset,
                length: result.end_offset.saturating_sub(result.start_offset),
                out_path: result.out_path.as_deref(),
                ok: result.ok,
                note: &result.note,
                sha256: result.sha256.as_deref(),
            },
            tool_version: &self.tool_version,
            config_hash: &self.config_hash,
            evidence_path: &self.evidence_path,
        };
        let mut guard = self.files_writer.lock().unwrap();
        serde_json::to_writer(&mut *guard, &record)?;
        guard.write_all(b"\n")?;
        Ok(())
    }

    fn record_run_summary(&self, summary: &RunSummary) -> Result<(), MetadataError> {
        let record = RunSummaryRecord {
            summary,
            tool_version: &self.tool_version,
            config_hash: &self.config_hash,
            evidence_path: &self.evidence_path,
        };
        let mut guard = self.run_writer.lock().unwrap();
        serde_json::to_writer(&mut *guard, &record)?;
        guard.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&self) -> Result<(), MetadataError> {
        self.files_writer.lock().unwrap().flush()?;
        self.run_writer.lock().unwrap().flush()?;
        Ok(())
    }
}
