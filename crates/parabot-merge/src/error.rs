//! Error types for the result merger.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MergeError>;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed output xml at {path}: {reason}")]
    MalformedXml { path: String, reason: String },

    #[error("no per-item outputs to merge")]
    NoInputs,
}
