//! Error types for the scheduler and subprocess driver.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExecError>;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("coordination error: {0}")]
    Coord(#[from] parabot_coordlib::CoordError),

    #[error("missing per-item output for index {0}")]
    MissingOutput(u64),

    #[error("internal scheduler error: {0}")]
    Internal(String),
}
