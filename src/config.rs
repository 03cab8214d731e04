//! YAML-backed configuration with a built-in default and CLI-override
//! merge: an `include_bytes!`-embedded default, a SHA-256 config hash for
//! provenance, and `serde_yaml` for parsing.

use std::path::Path;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::EngineError;

fn default_chunk_size() -> u64 {
    1024 * 1024
}
fn default_overlap() -> u64 {
    4096
}
fn default_min_size() -> u64 {
    256
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default = "default_overlap")]
    pub overlap: u64,
    #[serde(default = "default_min_size")]
    pub min_size: u64,
    #[serde(default)]
    pub max_files: Option<u64>,
    #[serde(default)]
    pub max_bytes: Option<u64>,
    #[serde(default)]
    pub dedup: bool,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            min_size: default_min_size(),
            max_files: None,
            max_bytes: None,
            dedup: false,
            types: Vec::new(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig, EngineError> {
    let bytes: Vec<u8> = match path {
        Some(p) => std::fs::read(p).map_err(EngineError::Io)?,
        None => include_bytes!("../config/default.yml").to_vec(),
    };

    let config: Config = serde_yaml::from_slice(&bytes)
        .map_err(|e| EngineError::Config(format!("invalid config: {e}")))?;

    Ok(LoadedConfig {
        config,
        config_hash: hash_bytes(&bytes),
    })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Parse a byte-size CLI value with optional `k|m|g` suffix (case
/// insensitive); `""`, `"0"`, and `"none"` mean "no limit".
pub fn parse_byte_size(raw: &str) -> Result<Option<u64>, EngineError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") || trimmed == "0" {
        return Ok(None);
    }
    let lower = trimmed.to_ascii_lowercase();
    let (digits, multiplier) = match lower.chars().last() {
        Some('k') => (&lower[..lower.len() - 1], 1024u64),
        Some('m') => (&lower[..lower.len() - 1], 1024 * 1024),
        Some('g') => (&lower[..lower.len() - 1], 1024 * 1024 * 1024),
        _ => (lower.as_str(), 1),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| EngineError::Config(format!("invalid byte size: {raw}")))?;
    Ok(Some(value.saturating_mul(multiplier)))
}
