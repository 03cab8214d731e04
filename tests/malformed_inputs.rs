use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use swiftbeaver::carve::{CarveOptions, CarveResult, Carver};
use swiftbeaver::evidence;
use swiftbeaver::signature;

fn insert_bytes(target: &mut Vec<u8>, offset: usize, data: &[u8]) {
    let end = offset + data.len();
    if end > target.len() {
        target.resize(end, 0u8);
    }
    target[offset..end].copy_from_slice(data);
}

fn run_scan(bytes: Vec<u8>) -> Vec<CarveResult> {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let input_path = temp_dir.path().join("input.bin");
    fs::write(&input_path, bytes).expect("write input");
    let out_dir = temp_dir.path().join("out");

    let reader = evidence::open_source(&input_path.to_string_lossy()).expect("evidence");
    let signatures = signature::default_signatures();
    let options = CarveOptions {
        chunk_size: 4096,
        overlap: 256,
        min_size: 0,
        ..CarveOptions::default()
    };

    let carver = Carver::new(
        reader,
        out_dir,
        signatures,
        options,
        Box::new(|_, _| {}),
        Arc::new(AtomicBool::new(false)),
        Arc::new(AtomicBool::new(false)),
    );
    carver.scan().collect()
}

/// A header with no trailing footer anywhere in the evidence resolves to
/// no extent at all, rather than a best-effort guess.
#[test]
fn truncated_jpeg_without_footer_is_skipped() {
    let mut data = vec![0u8; 4096];
    let mut jpeg = vec![0u8; 32];
    jpeg[0..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
    jpeg[4..9].copy_from_slice(b"JFIF\0");
    insert_bytes(&mut data, 0, &jpeg);

    let results = run_scan(data);
    assert!(!results.iter().any(|r| r.signature_name == "jpeg"));
}

#[test]
fn truncated_gif_without_trailer_is_skipped() {
    let mut data = vec![0u8; 2048];
    let mut gif = Vec::new();
    gif.extend_from_slice(b"GIF89a");
    gif.extend_from_slice(&[0x01, 0x00]);
    insert_bytes(&mut data, 512, &gif);

    let results = run_scan(data);
    assert!(!results.iter().any(|r| r.signature_name == "gif"));
}

/// An invalid SQLite page size fails the resolver's own sanity check, so
/// no candidate is ever produced for it.
#[test]
fn sqlite_with_invalid_page_size_is_skipped() {
    let mut data = vec![0u8; 2048];
    let mut sqlite = vec![0u8; 100];
    sqlite[0..16].copy_from_slice(b"SQLite format 3\0");
    sqlite[16] = 0x03;
    sqlite[17] = 0xE8; // 1000, not a power of two
    insert_bytes(&mut data, 1536, &sqlite);

    let results = run_scan(data);
    assert!(!results.iter().any(|r| r.signature_name == "sqlite"));
}

/// A ZIP header with no End Of Central Directory record anywhere in the
/// evidence is never resolved, since ZIP has no literal footer either.
#[test]
fn zip_without_eocd_is_skipped() {
    let mut data = vec![0u8; 2048];
    let zip = vec![0x50, 0x4B, 0x03, 0x04, 0x00, 0x00, 0x00, 0x00];
    insert_bytes(&mut data, 1024, &zip);

    let results = run_scan(data);
    assert!(!results.iter().any(|r| r.signature_name == "zip"));
}

#[test]
fn valid_jpeg_alongside_malformed_siblings_is_still_carved() {
    let mut data = vec![0u8; 4096];

    let mut jpeg = vec![0u8; 32];
    jpeg[0..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
    jpeg[4..9].copy_from_slice(b"JFIF\0");
    jpeg[30..32].copy_from_slice(&[0xFF, 0xD9]);
    insert_bytes(&mut data, 0, &jpeg);

    let mut png = Vec::new();
    png.extend_from_slice(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    png.extend_from_slice(&0x00001000u32.to_be_bytes());
    png.extend_from_slice(b"IHDR");
    insert_bytes(&mut data, 512, &png);

    let results = run_scan(data);
    let jpeg_hit = results
        .iter()
        .find(|r| r.signature_name == "jpeg")
        .expect("jpeg carved");
    assert!(jpeg_hit.ok);
    assert!(!results.iter().any(|r| r.signature_name == "png"));
}
