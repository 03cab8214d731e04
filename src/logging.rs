//! `tracing-subscriber` initialisation, using the `fmt`, `env-filter`,
//! and `json` features already pulled in by `Cargo.toml`.

use tracing_subscriber::EnvFilter;

use crate::cli::LogFormat;

/// `RUST_LOG` always wins if set; otherwise falls back to `level`
/// (`--log-level` / config `log_level`).
pub fn init(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => {
            subscriber.json().init();
        }
        LogFormat::Pretty => {
            subscriber.init();
        }
    }
}
