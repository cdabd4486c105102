//! Flag operations exposed over HTTP.
//!
//! Each operation is a single load, validate, mutate/compute, persist
//! sequence over [`FlagsRepo`]. Validation always runs before anything is
//! written.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::application::repos::{FlagsRepo, RepoError};
use crate::domain::error::DomainError;
use crate::domain::evaluation::{EvaluationContext, explain};
use crate::domain::flags::{FeatureFlag, OverrideKind, ensure_target};

#[derive(Debug, Error)]
pub enum FlagError {
    #[error("feature flag `{name}` does not exist")]
    FlagNotFound { name: String },
    #[error("no {kind} override for `{target_id}` on feature flag `{name}`")]
    OverrideNotFound {
        kind: OverrideKind,
        name: String,
        target_id: String,
    },
    #[error("feature flag `{name}` already exists")]
    AlreadyExists { name: String },
    #[error("{message}")]
    InvalidArgument { message: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl FlagError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::FlagNotFound { .. } | Self::OverrideNotFound { .. }
        )
    }

    fn flag_not_found(name: &str) -> Self {
        Self::FlagNotFound {
            name: name.to_string(),
        }
    }
}

impl From<DomainError> for FlagError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { message } => Self::InvalidArgument { message },
            DomainError::Invariant { message } => Self::Repo(RepoError::Integrity { message }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateFlagCommand {
    pub name: String,
    pub is_enabled: bool,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct FlagService {
    repo: Arc<dyn FlagsRepo>,
}

impl FlagService {
    pub fn new(repo: Arc<dyn FlagsRepo>) -> Self {
        Self { repo }
    }

    #[instrument(skip_all, fields(flag = %command.name))]
    pub async fn create(&self, command: CreateFlagCommand) -> Result<FeatureFlag, FlagError> {
        let CreateFlagCommand {
            name,
            is_enabled,
            description,
        } = command;

        let flag = FeatureFlag::new(&name, is_enabled, description)?;

        if self.repo.exists(flag.name()).await? {
            return Err(FlagError::AlreadyExists {
                name: flag.name().to_string(),
            });
        }

        match self.repo.add(&flag).await {
            Ok(()) => {}
            // Lost a create race; the store's unique key caught it.
            Err(RepoError::Duplicate { .. }) => {
                return Err(FlagError::AlreadyExists {
                    name: flag.name().to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        }

        info!(flag = flag.name(), is_enabled, "feature flag created");
        Ok(flag)
    }

    pub async fn get(&self, name: &str) -> Result<FeatureFlag, FlagError> {
        self.repo
            .get_by_name(name)
            .await?
            .ok_or_else(|| FlagError::flag_not_found(name))
    }

    pub async fn list(&self) -> Result<Vec<FeatureFlag>, FlagError> {
        self.repo.get_all().await.map_err(FlagError::from)
    }

    #[instrument(skip(self))]
    pub async fn update_global_state(&self, name: &str, is_enabled: bool) -> Result<(), FlagError> {
        let mut flag = self.get(name).await?;
        flag.set_enabled(is_enabled);
        self.persist(&flag).await?;

        info!(flag = name, is_enabled, "global state updated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_override(
        &self,
        kind: OverrideKind,
        name: &str,
        target_id: &str,
        is_enabled: bool,
    ) -> Result<(), FlagError> {
        ensure_target(kind, target_id)?;

        let mut flag = self.get(name).await?;
        flag.set_override(kind, target_id, is_enabled)?;
        self.persist(&flag).await?;

        info!(
            flag = name,
            kind = kind.as_str(),
            target_id,
            is_enabled,
            "override set"
        );
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove_override(
        &self,
        kind: OverrideKind,
        name: &str,
        target_id: &str,
    ) -> Result<(), FlagError> {
        ensure_target(kind, target_id)?;

        let mut flag = self.get(name).await?;
        if !flag.remove_override(kind, target_id) {
            return Err(FlagError::OverrideNotFound {
                kind,
                name: name.to_string(),
                target_id: target_id.to_string(),
            });
        }
        self.persist(&flag).await?;

        info!(
            flag = name,
            kind = kind.as_str(),
            target_id,
            "override removed"
        );
        Ok(())
    }

    pub async fn evaluate(
        &self,
        name: &str,
        context: &EvaluationContext,
    ) -> Result<bool, FlagError> {
        let flag = self.get(name).await?;
        let evaluation = explain(&flag, context);

        debug!(
            flag = name,
            enabled = evaluation.enabled,
            source = evaluation.source.as_str(),
            "flag evaluated"
        );
        Ok(evaluation.enabled)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<(), FlagError> {
        if !self.repo.exists(name).await? {
            return Err(FlagError::flag_not_found(name));
        }
        self.repo.delete(name).await?;

        info!(flag = name, "feature flag deleted");
        Ok(())
    }

    /// A flag deleted between load and write surfaces as not found.
    async fn persist(&self, flag: &FeatureFlag) -> Result<(), FlagError> {
        match self.repo.update(flag).await {
            Ok(()) => Ok(()),
            Err(RepoError::NotFound) => Err(FlagError::flag_not_found(flag.name())),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn health_check(&self) -> Result<(), FlagError> {
        self.repo.health_check().await.map_err(FlagError::from)
    }
}
