//! Error types for flowlens.
//!
//! Nothing here is fatal to a whole analysis run. `ParseSkipped` excludes a
//! single file, `NotFound` and `AmbiguousTarget` are surfaced to whoever asked
//! for an impact report or journey. Unresolved calls are not errors at all;
//! they become external edges in the call graph.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("skipped {path}: {reason}")]
    ParseSkipped { path: PathBuf, reason: String },

    #[error("unsupported language for {0}")]
    UnsupportedLanguage(PathBuf),

    #[error("declaration not found: {0}")]
    NotFound(String),

    #[error("'{query}' matches several declarations: {}", candidates.join(", "))]
    AmbiguousTarget {
        query: String,
        candidates: Vec<String>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid feature pattern '{pattern}': {source}")]
    FeaturePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlowError {
    pub fn skipped(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        FlowError::ParseSkipped {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_lists_candidates() {
        let err = FlowError::AmbiguousTarget {
            query: "init".to_string(),
            candidates: vec!["a.ts:init".to_string(), "b.ts:init".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "'init' matches several declarations: a.ts:init, b.ts:init"
        );
    }

    #[test]
    fn test_skipped_message() {
        let err = FlowError::skipped("src/big.ts", "file too large");
        assert_eq!(err.to_string(), "skipped src/big.ts: file too large");
    }
}
