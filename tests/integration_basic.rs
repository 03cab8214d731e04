use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use swiftbeaver::carve::{CarveOptions, Carver};
use swiftbeaver::evidence;
use swiftbeaver::signature;

fn insert_bytes(target: &mut Vec<u8>, offset: usize, data: &[u8]) {
    let end = offset + data.len();
    if end > target.len() {
        target.resize(end, 0u8);
    }
    target[offset..end].copy_from_slice(data);
}

fn sample_jpeg() -> Vec<u8> {
    let mut data = vec![0u8; 32];
    data[0..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
    data[4..9].copy_from_slice(b"JFIF\0");
    data[30..32].copy_from_slice(&[0xFF, 0xD9]);
    data
}

fn sample_png() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    data.extend_from_slice(&[0x00, 0x00, 0x00, 0x0D]);
    data.extend_from_slice(b"IHDR");
    data.extend_from_slice(&[
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00,
    ]);
    data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    data.extend_from_slice(b"IEND");
    data.extend_from_slice(&[0xAE, 0x42, 0x60, 0x82]);
    data
}

fn sample_gif() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"GIF89a");
    data.extend_from_slice(&[0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
    data.extend_from_slice(&[0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00]);
    data.push(0x3B);
    data
}

fn sample_sqlite() -> Vec<u8> {
    let mut data = vec![0u8; 1024];
    data[0..16].copy_from_slice(b"SQLite format 3\0");
    data[16..18].copy_from_slice(&[0x04, 0x00]); // page size 1024
    data[28..32].copy_from_slice(&[0x00, 0x00, 0x00, 0x01]); // page count 1
    data
}

fn run_scan(image: Vec<u8>, out_dir: &std::path::Path) -> Vec<swiftbeaver::carve::CarveResult> {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let input_path = temp_dir.path().join("image.bin");
    fs::write(&input_path, &image).expect("write input");

    let reader = evidence::open_source(&input_path.to_string_lossy()).expect("evidence");
    let signatures = signature::default_signatures();
    let options = CarveOptions {
        min_size: 0,
        ..CarveOptions::default()
    };

    let carver = Carver::new(
        reader,
        out_dir.to_path_buf(),
        signatures,
        options,
        Box::new(|_, _| {}),
        Arc::new(AtomicBool::new(false)),
        Arc::new(AtomicBool::new(false)),
    );

    carver.scan().collect()
}

#[test]
fn integration_carves_basic_formats() {
    let out_dir = tempfile::tempdir().expect("tempdir");

    let mut image = vec![0u8; 200_000];
    insert_bytes(&mut image, 1024, &sample_jpeg());
    insert_bytes(&mut image, 65_536, &sample_png());
    insert_bytes(&mut image, 131_072, &sample_gif());
    insert_bytes(&mut image, 150_000, &sample_sqlite());

    let results = run_scan(image, out_dir.path());
    let names: Vec<&str> = results.iter().map(|r| r.signature_name.as_str()).collect();

    assert!(names.contains(&"jpeg"));
    assert!(names.contains(&"png"));
    assert!(names.contains(&"gif"));
    assert!(names.contains(&"sqlite"));

    for result in &results {
        assert!(result.ok, "carve should have succeeded: {}", result.note);
        let path = result.out_path.as_ref().expect("out path");
        assert!(path.exists());
    }

    assert!(out_dir.path().join("jpeg").exists());
    assert!(out_dir.path().join("png").exists());
    assert!(out_dir.path().join("gif").exists());
    assert!(out_dir.path().join("sqlite").exists());
}

#[test]
fn deduplication_drops_identical_content() {
    let out_dir = tempfile::tempdir().expect("tempdir");
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let input_path = temp_dir.path().join("image.bin");

    let mut image = vec![0u8; 4096];
    insert_bytes(&mut image, 0, &sample_jpeg());
    insert_bytes(&mut image, 2048, &sample_jpeg());
    fs::write(&input_path, &image).expect("write input");

    let reader = evidence::open_source(&input_path.to_string_lossy()).expect("evidence");
    let signatures = signature::default_signatures();
    let options = CarveOptions {
        min_size: 0,
        deduplicate: true,
        ..CarveOptions::default()
    };

    let carver = Carver::new(
        reader,
        out_dir.path().to_path_buf(),
        signatures,
        options,
        Box::new(|_, _| {}),
        Arc::new(AtomicBool::new(false)),
        Arc::new(AtomicBool::new(false)),
    );

    let results: Vec<_> = carver.scan().collect();
    assert_eq!(results.iter().filter(|r| r.signature_name == "jpeg").count(), 1);
}
