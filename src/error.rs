//! Typed configuration errors
//!
//! Everything in here is fatal and surfaces before the first job is dispatched,
//! so a bad configuration can never leave a half-submitted batch behind.
//! Per-job failures are logged and recorded instead, never raised.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A cross comparison group was declared with a side count other than two.
    #[error("comparison group {index} has {sides} sides; cross groups take exactly two")]
    MalformedGroup { index: usize, sides: usize },

    /// The per-sample read-length table has no entry for a selected sample.
    #[error("read length for sample '{sample}' not found in per-sample table")]
    ReadLengthNotFound { sample: String },

    /// A file or directory referenced by the settings does not exist.
    #[error("required path missing: {path}")]
    MissingInput { path: PathBuf },

    /// A settings value that cannot be used as given.
    #[error("invalid settings: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self::MissingInput { path: path.into() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}
