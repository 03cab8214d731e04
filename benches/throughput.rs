use std::fs::File;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use swiftbeaver::carve::{CarveOptions, Carver};
use swiftbeaver::evidence;
use swiftbeaver::signature;

fn minimal_jpeg() -> Vec<u8> {
    let mut jpeg = vec![0u8; 32];
    jpeg[0..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
    jpeg[4..9].copy_from_slice(b"JFIF\0");
    jpeg[30..32].copy_from_slice(&[0xFF, 0xD9]);
    jpeg
}

fn run_scan(input_path: &std::path::Path, max_files: Option<u64>) -> usize {
    let out_dir = tempfile::tempdir().expect("tempdir");
    let reader = evidence::open_source(&input_path.to_string_lossy()).expect("evidence");
    let signatures = signature::default_signatures();

    let options = CarveOptions {
        chunk_size: 4 * 1024 * 1024,
        overlap: 64 * 1024,
        max_files,
        write_output: false,
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

    carver.scan().count()
}

fn bench_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    for size in [8 * 1024 * 1024usize, 32 * 1024 * 1024usize] {
        group.bench_with_input(BenchmarkId::new("scan_only", size), &size, |b, &size| {
            b.iter(|| {
                let temp_dir = tempfile::tempdir().expect("tempdir");
                let input_path = temp_dir.path().join("image.bin");
                let file = File::create(&input_path).expect("create");
                file.set_len(size as u64).expect("set len");
                run_scan(&input_path, None);
            });
        });
    }

    group.bench_function("jpeg_dense", |b| {
        b.iter(|| {
            let temp_dir = tempfile::tempdir().expect("tempdir");
            let input_path = temp_dir.path().join("dense.bin");
            let mut file = File::create(&input_path).expect("create");
            let jpeg = minimal_jpeg();
            let padding = vec![0u8; 32];
            for _ in 0..500 {
                file.write_all(&jpeg).expect("write");
                file.write_all(&padding).expect("write");
            }
            file.flush().expect("flush");
            run_scan(&input_path, Some(200));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_throughput);
criterion_main!(benches);
