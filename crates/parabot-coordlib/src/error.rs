//! Error types for the coordination library server and client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoordError>;

#[derive(Error, Debug)]
pub enum CoordError {
    #[error("lock {0:?} is owned by another caller")]
    LockHeldByOther(String),

    #[error("caller {0:?} does not own lock {1:?}")]
    NotLockOwner(String, String),

    #[error("no value set matching given tags exists")]
    NoMatchingValueSet,

    #[error("caller {0:?} has already reserved a value set")]
    AlreadyReservedValueSet(String),

    #[error("value set was never imported; use a resource file")]
    NoValueSetsImported,

    #[error("no value set reserved for caller {0:?}")]
    NoValueSetReserved(String),

    #[error("no value for key {0:?} in the leased set")]
    NoSuchValueSetKey(String),

    #[error("unknown value set {0:?}")]
    UnknownValueSet(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unknown RPC method {0:?}")]
    UnknownMethod(String),
}
