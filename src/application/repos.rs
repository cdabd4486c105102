//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::error::DomainError;
use crate::domain::flags::FeatureFlag;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("record not found")]
    NotFound,
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Stored rows that no longer form a valid aggregate.
impl From<DomainError> for RepoError {
    fn from(err: DomainError) -> Self {
        Self::Integrity {
            message: err.to_string(),
        }
    }
}

/// Durable storage for flag aggregates, keyed by flag name.
///
/// Every method reads or writes the whole aggregate (the flag plus all of
/// its overrides). `add` on an existing name is left to the adapter;
/// `update` on an absent name returns [`RepoError::NotFound`]; `delete` on
/// an absent name is a no-op.
#[async_trait]
pub trait FlagsRepo: Send + Sync {
    async fn get_by_name(&self, name: &str) -> Result<Option<FeatureFlag>, RepoError>;

    /// All flags ordered by name.
    async fn get_all(&self) -> Result<Vec<FeatureFlag>, RepoError>;

    async fn add(&self, flag: &FeatureFlag) -> Result<(), RepoError>;

    /// Replace the stored aggregate named `flag.name()`.
    async fn update(&self, flag: &FeatureFlag) -> Result<(), RepoError>;

    async fn delete(&self, name: &str) -> Result<(), RepoError>;

    async fn exists(&self, name: &str) -> Result<bool, RepoError>;

    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}
