use thiserror::Error;

/// `Validation` is caller input that was rejected; `Invariant` is stored
/// data that no longer forms a valid flag.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid flag input: {message}")]
    Validation { message: String },
    #[error("stored flag is inconsistent: {message}")]
    Invariant { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }
}
