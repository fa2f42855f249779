//! Model parsing errors.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Invalid grade: {0}")]
    InvalidGrade(String),

    #[error("Invalid orientation: {0}")]
    InvalidOrientation(String),

    #[error("Invalid clip length: {0}")]
    InvalidClipLength(String),

    #[error("Invalid clip window: {0}")]
    InvalidClipWindow(String),
}
