//! Error types for the execution item data model and plan grammar.

use thiserror::Error;

/// Result type for `parabot-items` operations.
pub type Result<T> = std::result::Result<T, ItemsError>;

#[derive(Error, Debug)]
pub enum ItemsError {
    #[error("ordering : group can not contain #WAIT")]
    WaitInGroup,

    #[error("ordering : group can contain only test or suite elements, not both")]
    MixedGroupKind,

    #[error("unrecognized plan line: {0}")]
    UnrecognizedLine(String),

    #[error("plan cache is missing header {0}")]
    MissingHeader(&'static str),

    #[error("plan cache file hash mismatch")]
    HashMismatch,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dependency error: {0}")]
    Dependency(String),
}
