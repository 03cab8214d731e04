use thiserror::Error;

/// Errors that abort a run before or outside of the per-hit carving loop.
///
/// Maps to the `OpenFailed` / `Fatal` kinds: anything else (a rejected
/// candidate, a transient read, a per-file write failure) is handled inline
/// and never reaches this type.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to open source: {0}")]
    OpenFailed(#[source] std::io::Error),
    #[error("failed to open output directory {path}: {source}")]
    OutputUnavailable {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config error: {0}")]
    Config(String),
    #[error("{0}")]
    Fatal(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
