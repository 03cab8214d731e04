//! The main sweep: chunked-with-overlap scanning, extent resolution,
//! filtering/deduplication, and output writing, wired together into a
//! pull-based iterator.
//!
//! The output path/sanitisation helpers are ported from `carve::mod`'s
//! `output_path`/`sanitize_component`; the scan loop itself is ported
//! from `original_source/openrecover/carver.py`'s `FileCarver.scan`,
//! with one fix: the original advances the cursor by
//! `len(buf) - overlap` unconditionally, which can retreat it on a
//! short final chunk, so the overlap is clamped to half the buffer
//! length instead.

use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::evidence::RawReader;
use crate::extent::resolve;
use crate::signature::Signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Running,
    Paused,
    Completed,
    Stopped,
    Failed,
}

#[derive(Debug, Clone)]
pub struct CarveOptions {
    pub chunk_size: u64,
    pub overlap: u64,
    pub max_files: Option<u64>,
    pub max_bytes: Option<u64>,
    pub min_size: u64,
    pub start_offset: u64,
    pub deduplicate: bool,
    pub write_output: bool,
}

impl Default for CarveOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            overlap: 4096,
            max_files: None,
            max_bytes: None,
            min_size: 256,
            start_offset: 0,
            deduplicate: false,
            write_output: true,
        }
    }
}

impl CarveOptions {
    /// Clamps `chunk_size` to a 4 KiB floor and `overlap` to half the
    /// chunk size; logged rather than rejected, since a front end
    /// passing an oversized overlap is a mistake worth tolerating, not a
    /// fatal error.
    pub fn normalized(mut self) -> Self {
        if self.chunk_size < 4096 {
            warn!(requested = self.chunk_size, "chunk_size below 4096, clamping");
            self.chunk_size = 4096;
        }
        let max_overlap = self.chunk_size / 2;
        if self.overlap > max_overlap {
            warn!(requested = self.overlap, max_overlap, "overlap exceeds chunk_size/2, clamping");
            self.overlap = max_overlap;
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct CarveResult {
    pub signature_name: String,
    pub start_offset: u64,
    pub end_offset: u64,
    pub out_path: Option<PathBuf>,
    pub ok: bool,
    pub note: String,
    pub sha256: Option<String>,
    pub data: Option<Vec<u8>>,
}

/// `(current_bytes, total_bytes)`, invoked at least once per chunk and
/// once at termination. Must be non-blocking and reentrant-safe: it runs
/// synchronously on the scanning thread.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send + Sync>;

pub struct Carver {
    reader: Box<dyn RawReader>,
    output_dir: PathBuf,
    signatures: Vec<Signature>,
    options: CarveOptions,
    progress: ProgressFn,
    stop: Arc<AtomicBool>,
    pause: Arc<AtomicBool>,
}

impl Carver {
    pub fn new(
        reader: Box<dyn RawReader>,
        output_dir: PathBuf,
        signatures: Vec<Signature>,
        options: CarveOptions,
        progress: ProgressFn,
        stop: Arc<AtomicBool>,
        pause: Arc<AtomicBool>,
    ) -> Self {
        Self {
            reader,
            output_dir,
            signatures,
            options: options.normalized(),
            progress,
            stop,
            pause,
        }
    }

    /// Consumes the carver and begins the sweep. The Carver (and
    /// everything it owns) is torn down exactly once, when the returned
    /// iterator is dropped or exhausted.
    pub fn scan(self) -> CarveScan {
        let total = self.reader.length().min(
            self.options
                .start_offset
                .saturating_add(self.options.max_bytes.unwrap_or(u64::MAX)),
        );
        CarveScan {
            reader: self.reader,
            output_dir: self.output_dir,
            signatures: self.signatures,
            options: self.options.clone(),
            progress: self.progress,
            stop: self.stop,
            pause: self.pause,
            total,
            cur: self.options.start_offset,
            dedup: HashSet::new(),
            pending: VecDeque::new(),
            files_emitted: 0,
            rejected: 0,
            duplicates: 0,
            state: ScanState::Running,
        }
    }
}

pub struct CarveScan {
    reader: Box<dyn RawReader>,
    output_dir: PathBuf,
    signatures: Vec<Signature>,
    options: CarveOptions,
    progress: ProgressFn,
    stop: Arc<AtomicBool>,
    pause: Arc<AtomicBool>,
    total: u64,
    cur: u64,
    dedup: HashSet<[u8; 32]>,
    pending: VecDeque<CarveResult>,
    files_emitted: u64,
    rejected: u64,
    duplicates: u64,
    state: ScanState,
}

impl CarveScan {
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Bytes actually swept so far, clamped to the bounded region and
    /// measured from `start_offset` rather than from zero. Reflects a
    /// run cut short by `max_files`, `max_bytes`, or the stop flag.
    pub fn bytes_scanned(&self) -> u64 {
        self.cur.min(self.total).saturating_sub(self.options.start_offset)
    }

    /// Candidates rejected before ever becoming a `CarveResult`: unresolved
    /// extent, under `min_size`, or failing a format sanity check.
    pub fn files_skipped(&self) -> u64 {
        self.rejected
    }

    /// Candidates dropped by deduplication.
    pub fn duplicates_skipped(&self) -> u64 {
        self.duplicates
    }

    fn emit_progress(&self) {
        (self.progress)(self.cur.min(self.total), self.total);
    }

    fn hit_limit_reached(&self) -> bool {
        matches!(self.options.max_files, Some(max) if self.files_emitted >= max)
    }

    fn process_hit(&mut self, sig_index: usize, global_pos: u64) -> Option<CarveResult> {
        let sig = self.signatures[sig_index];
        let Some(extent) = resolve(self.reader.as_ref(), &sig, global_pos) else {
            self.rejected += 1;
            return None;
        };
        let end_offset = extent.end();
        let length = end_offset.saturating_sub(global_pos);

        if length < self.options.min_size {
            self.rejected += 1;
            return None;
        }

        let Some(data) = read_range(self.reader.as_ref(), global_pos, end_offset) else {
            self.rejected += 1;
            return None;
        };

        if matches!(sig.name, "jpeg" | "png" | "gif") && !format_sanity_check(sig.name, &data) {
            self.rejected += 1;
            return None;
        }

        let digest: [u8; 32] = Sha256::digest(&data).into();
        if self.options.deduplicate {
            if self.dedup.contains(&digest) {
                self.duplicates += 1;
                return None;
            }
            self.dedup.insert(digest);
        }

        let sha256_hex = hex::encode(digest);

        if !self.options.write_output {
            return Some(CarveResult {
                signature_name: sig.name.to_string(),
                start_offset: global_pos,
                end_offset,
                out_path: None,
                ok: true,
                note: String::new(),
                sha256: Some(sha256_hex),
                data: Some(data),
            });
        }

        match write_output(&self.output_dir, sig.name, sig.extension, global_pos, &data) {
            Ok(path) => Some(CarveResult {
                signature_name: sig.name.to_string(),
                start_offset: global_pos,
                end_offset,
                out_path: Some(path),
                ok: true,
                note: String::new(),
                sha256: Some(sha256_hex),
                data: None,
            }),
            Err(e) => Some(CarveResult {
                signature_name: sig.name.to_string(),
                start_offset: global_pos,
                end_offset,
                out_path: None,
                ok: false,
                note: format!("write error: {e}"),
                sha256: Some(sha256_hex),
                data: None,
            }),
        }
    }

    fn scan_chunk(&mut self) {
        let chunk_start = self.cur;
        let want = ((self.total - self.cur).min(self.options.chunk_size)) as usize;
        let mut buf = vec![0u8; want];

        let n = match self.reader.read_at(chunk_start, &mut buf) {
            Ok(n) => n,
            Err(e) => {
                debug!(offset = chunk_start, error = %e, "read failed, advancing one sector");
                self.cur = self.cur.saturating_add(4096);
                return;
            }
        };

        if n == 0 {
            self.cur = self.total;
            return;
        }
        buf.truncate(n);

        for sig_index in 0..self.signatures.len() {
            let header = self.signatures[sig_index].header;
            let header_adjust = self.signatures[sig_index].header_adjust;
            let mut i = 0usize;
            while i < buf.len() {
                let Some(rel) = memchr::memmem::find(&buf[i..], header) else {
                    break;
                };
                let idx = i + rel;
                let global_pos = (chunk_start + idx as u64) as i64 - header_adjust;
                if global_pos >= 0 {
                    if let Some(result) = self.process_hit(sig_index, global_pos as u64) {
                        self.files_emitted += 1;
                        self.pending.push_back(result);
                    }
                }
                i = idx + 1;
                if self.hit_limit_reached() {
                    break;
                }
            }
            if self.hit_limit_reached() {
                break;
            }
        }

        let effective_overlap = self.options.overlap.min(buf.len() as u64 / 2);
        self.cur = chunk_start + (buf.len() as u64 - effective_overlap);
    }
}

impl Iterator for CarveScan {
    type Item = CarveResult;

    fn next(&mut self) -> Option<CarveResult> {
        loop {
            if let Some(result) = self.pending.pop_front() {
                return Some(result);
            }

            while self.pause.load(Ordering::Relaxed) {
                self.state = ScanState::Paused;
                self.emit_progress();
                std::thread::yield_now();
                if self.stop.load(Ordering::Relaxed) {
                    break;
                }
            }
            self.state = ScanState::Running;

            if self.stop.load(Ordering::Relaxed) {
                self.state = ScanState::Stopped;
                self.emit_progress();
                return None;
            }
            if self.cur >= self.total || self.hit_limit_reached() {
                self.state = ScanState::Completed;
                self.emit_progress();
                return None;
            }

            self.scan_chunk();
            self.emit_progress();
        }
    }
}

fn read_range(reader: &dyn RawReader, start: u64, end: u64) -> Option<Vec<u8>> {
    let len = end.saturating_sub(start) as usize;
    let mut buf = vec![0u8; len];
    let n = reader.read_at(start, &mut buf).ok()?;
    buf.truncate(n);
    if buf.is_empty() {
        None
    } else {
        Some(buf)
    }
}

fn format_sanity_check(name: &str, data: &[u8]) -> bool {
    match name {
        "jpeg" => data.starts_with(&[0xFF, 0xD8, 0xFF]) && data.ends_with(&[0xFF, 0xD9]),
        "png" => {
            data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
                && data.len() >= 8
                && data[data.len() - 8..data.len() - 4] == *b"IEND"
        }
        "gif" => data.starts_with(b"GIF8") && data.last() == Some(&0x3B),
        _ => true,
    }
}

fn write_output(
    output_dir: &Path,
    signature_name: &str,
    extension: &str,
    global_pos: u64,
    data: &[u8],
) -> std::io::Result<PathBuf> {
    let dir = output_dir.join(sanitize_component(signature_name));
    std::fs::create_dir_all(&dir)?;
    let filename = sanitize_filename(&format!(
        "{}_{}_len{}.{}",
        sanitize_component(signature_name),
        global_pos,
        data.len(),
        sanitize_component(extension)
    ));
    let path = apply_long_path_prefix(&dir.join(filename));
    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(data)?;
    writer.flush()?;
    Ok(path)
}

fn sanitize_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.len() <= 180 {
        return cleaned;
    }
    match cleaned.rfind('.') {
        Some(dot) if cleaned.len() - dot <= 16 => {
            let ext = &cleaned[dot..];
            let keep = 180 - ext.len();
            format!("{}{}", &cleaned[..keep], ext)
        }
        _ => cleaned[..180].to_string(),
    }
}

#[cfg(windows)]
fn apply_long_path_prefix(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s.starts_with(r"\\?\") || s.len() < 240 {
        path.to_path_buf()
    } else {
        PathBuf::from(format!(r"\\?\{}", s))
    }
}

#[cfg(not(windows))]
fn apply_long_path_prefix(path: &Path) -> PathBuf {
    path.to_path_buf()
}
