use std::path::PathBuf;

use arrow::error::ArrowError;
use thiserror::Error;

/// Errors raised while building or loading a user's dataset. Every variant
/// is terminal for that user's run.
#[derive(Debug, Error)]
pub enum Error {
    /// A timestamp string did not match the format expected for its source.
    #[error("cannot parse timestamp {value:?} with format {format:?}")]
    Parse {
        value: String,
        format: String,
        #[source]
        source: chrono::ParseError,
    },

    /// A record row is malformed (event field, duration, interval bounds).
    #[error("malformed record: {0}")]
    Format(String),

    /// Fewer than two glucose readings survived loading.
    #[error("need at least 2 glucose readings to resample, got {0}")]
    InsufficientData(usize),

    /// A cache artifact exists but could not be decoded.
    #[error("cache artifact {} is corrupt: {reason}", .path.display())]
    CacheCorruption { path: PathBuf, reason: String },

    #[error("failed to encode cache artifact {}: {reason}", .path.display())]
    Encode { path: PathBuf, reason: String },

    #[error("no user named {0:?} in the pipeline configuration")]
    UnknownUser(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("CSV error")]
    Csv(#[from] csv::Error),

    #[error("Arrow operation failed")]
    Arrow(#[from] ArrowError),
}

pub type Result<T> = std::result::Result<T, Error>;
