use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use swiftbeaver::carve::{CarveOptions, CarveResult, Carver};
use swiftbeaver::cli::{self, LogFormat};
use swiftbeaver::config::{self, parse_byte_size};
use swiftbeaver::evidence::{self, RawReader};
use swiftbeaver::logging;
use swiftbeaver::metadata::{self, MetadataSink, RunSummary};
use swiftbeaver::signature;

fn main() -> Result<()> {
    let cli_opts = cli::parse();

    let loaded = config::load_config(cli_opts.config.as_deref())
        .context("loading configuration")?;
    let mut cfg = loaded.config;

    if let Some(raw) = &cli_opts.min_size {
        if let Some(v) = parse_byte_size(raw)? {
            cfg.min_size = v;
        }
    }
    if let Some(raw) = &cli_opts.chunk_size {
        if let Some(v) = parse_byte_size(raw)? {
            cfg.chunk_size = v;
        }
    }
    if let Some(raw) = &cli_opts.overlap {
        if let Some(v) = parse_byte_size(raw)? {
            cfg.overlap = v;
        }
    }
    if cli_opts.max_files.is_some() {
        cfg.max_files = cli_opts.max_files;
    }
    if let Some(raw) = &cli_opts.max_bytes {
        cfg.max_bytes = parse_byte_size(raw)?;
    }
    let start_offset = match &cli_opts.start_offset {
        Some(raw) => parse_byte_size(raw)?.unwrap_or(0),
        None => 0,
    };
    if cli_opts.dedup {
        cfg.dedup = true;
    }
    if let Some(types) = &cli_opts.types {
        cfg.types = types.clone();
    }
    let log_level = cli_opts.log_level.clone().unwrap_or(cfg.log_level.clone());
    let log_format = cli_opts.log_format.unwrap_or(match cfg.log_format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Pretty,
    });

    logging::init(&log_level, log_format);

    let run_id = generate_run_id();
    let run_output_dir = cli_opts.out.join(&run_id);
    std::fs::create_dir_all(&run_output_dir)
        .map_err(|source| swiftbeaver::error::EngineError::OutputUnavailable {
            path: run_output_dir.clone(),
            source,
        })
        .context("preparing output directory")?;

    let tool_version = env!("CARGO_PKG_VERSION");
    let evidence_addr = cli_opts.source.to_string_lossy().to_string();

    info!(
        run_id = %run_id,
        source = %evidence_addr,
        output = %run_output_dir.display(),
        chunk_size = cfg.chunk_size,
        overlap = cfg.overlap,
        "starting carve run"
    );

    let reader = evidence::open_source(&evidence_addr)
        .map_err(|e| swiftbeaver::error::EngineError::OpenFailed(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
        .context("opening evidence source")?;
    let evidence_len = reader.length();
    info!(evidence_len, "opened evidence source");

    let sink: Box<dyn MetadataSink> = if cli_opts.dry_run {
        metadata::build_dry_run_sink()
    } else {
        metadata::build_sink(&run_output_dir, tool_version, &loaded.config_hash, &cli_opts.source)
            .context("initializing metadata sink")?
    };

    let all_signatures = signature::default_signatures();
    let selected: Vec<_> = signature::select(&all_signatures, &cfg.types)
        .into_iter()
        .copied()
        .collect();

    let stop = Arc::new(AtomicBool::new(false));
    let pause = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .context("installing Ctrl-C handler")?;
    }

    let options = CarveOptions {
        chunk_size: cfg.chunk_size,
        overlap: cfg.overlap,
        max_files: cfg.max_files,
        max_bytes: cfg.max_bytes,
        min_size: cfg.min_size,
        start_offset,
        deduplicate: cfg.dedup,
        write_output: !cli_opts.dry_run,
    };

    let progress: swiftbeaver::carve::ProgressFn = Box::new(|current, total| {
        tracing::debug!(current, total, "progress");
    });

    let carver = Carver::new(
        reader,
        run_output_dir.join("carved"),
        selected,
        options,
        progress,
        stop,
        pause,
    );

    let mut summary = RunSummary {
        run_id: run_id.clone(),
        source: evidence_addr.clone(),
        output_dir: run_output_dir.to_string_lossy().to_string(),
        config_hash: loaded.config_hash.clone(),
        bytes_scanned: 0,
        hits_found: 0,
        files_carved: 0,
        files_skipped: 0,
        duplicates_skipped: 0,
        errors: 0,
    };

    let mut scan = carver.scan();
    while let Some(result) = scan.next() {
        record_result(&mut summary, &result);
        sink.record_file(&run_id, &result)
            .context("writing carved-file record")?;
    }
    summary.bytes_scanned = scan.bytes_scanned();
    summary.files_skipped = scan.files_skipped();
    summary.duplicates_skipped = scan.duplicates_skipped();

    sink.record_run_summary(&summary)
        .context("writing run summary")?;
    sink.flush().context("flushing metadata sink")?;

    info!(
        files_carved = summary.files_carved,
        errors = summary.errors,
        "carve run finished"
    );

    Ok(())
}

fn record_result(summary: &mut RunSummary, result: &CarveResult) {
    summary.hits_found += 1;
    if result.ok {
        summary.files_carved += 1;
    } else {
        summary.errors += 1;
    }
}

fn generate_run_id() -> String {
    let now = chrono::Utc::now();
    format!("{}_{}", now.format("%Y%m%dT%H%M%SZ"), rand_suffix())
}

fn rand_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("{nanos:08x}")
}
