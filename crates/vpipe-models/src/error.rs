//! Model error types.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Unknown processing status: {0}")]
    UnknownStatus(String),

    #[error("Unknown upload method: {0}")]
    UnknownUploadMethod(String),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

impl ModelError {
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
