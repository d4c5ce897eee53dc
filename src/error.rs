//! Error types for the library.
//!
//! `thiserror` for the parser and stream layers, `anyhow` in the processor
//! and in main.rs.

use thiserror::Error;

/// Reasons a single trace line could not be tokenized
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line too short for the timestamp field ({0} bytes)")]
    TooShort(usize),

    #[error("timestamp field end (byte {0}) is not a char boundary")]
    NotCharBoundary(usize),

    #[error("timestamp field has no microsecond part: {0:?}")]
    MissingMicros(String),

    #[error("invalid microsecond offset: {0:?}")]
    InvalidMicros(String),

    #[error("invalid date/time: {0:?}")]
    InvalidDateTime(String),
}

/// Errors raised while reading a trace or fork map source
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("trace source lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, TraceError>;

/// Errors raised while writing the JSON report
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Failed to replay process calls: {0}")]
    Replay(#[from] TraceError),
}
