//! CLI configuration from environment.

use std::env;
use std::path::PathBuf;

/// Default tracing directive when `ACPERF_LOG` is unset.
pub const DEFAULT_LOG_DIRECTIVE: &str = "acperf=info,acperf_core=info";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base directory for relative `--dataset` paths, and the dataset
    /// location when none is given
    pub dataset_dir: Option<PathBuf>,
    /// Comma-separated tracing directives added on top of `RUST_LOG`
    pub log_directive: String,
    /// Evaluate metrics concurrently
    pub parallel: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            dataset_dir: lookup("ACPERF_DATASET_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            log_directive: lookup("ACPERF_LOG")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LOG_DIRECTIVE.to_string()),
            parallel: lookup("ACPERF_PARALLEL")
                .and_then(|s| parse_flag(&s))
                .unwrap_or(true),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
