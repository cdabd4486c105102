//! Read-through, write-invalidate decorator over any [`FlagsRepo`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::application::repos::{FlagsRepo, RepoError};
use crate::domain::flags::FeatureFlag;

use super::store::FlagCache;

/// Serves reads from [`FlagCache`] and drops the affected entries after
/// every successful write. Store failures leave the cache untouched.
pub struct CachedFlagsRepo<R: ?Sized> {
    inner: Arc<R>,
    cache: Arc<FlagCache>,
}

impl<R: FlagsRepo + ?Sized> CachedFlagsRepo<R> {
    pub fn new(inner: Arc<R>, cache: Arc<FlagCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<FlagCache> {
        &self.cache
    }
}

#[async_trait]
impl<R: FlagsRepo + ?Sized> FlagsRepo for CachedFlagsRepo<R> {
    async fn get_by_name(&self, name: &str) -> Result<Option<FeatureFlag>, RepoError> {
        if let Some(flag) = self.cache.get_flag(name) {
            trace!(flag = name, "flag served from cache");
            return Ok(Some(flag));
        }

        let seen = self.cache.epoch();
        let loaded = self.inner.get_by_name(name).await?;
        if let Some(flag) = loaded.as_ref() {
            if !self.cache.put_flag(flag.clone(), seen) {
                trace!(flag = name, "cache fill skipped after concurrent write");
            }
        }
        Ok(loaded)
    }

    async fn get_all(&self) -> Result<Vec<FeatureFlag>, RepoError> {
        if let Some(flags) = self.cache.get_all() {
            return Ok(flags);
        }

        let seen = self.cache.epoch();
        let flags = self.inner.get_all().await?;
        if !self.cache.put_all(flags.clone(), seen) {
            trace!("flag listing fill skipped after concurrent write");
        }
        Ok(flags)
    }

    async fn add(&self, flag: &FeatureFlag) -> Result<(), RepoError> {
        self.inner.add(flag).await?;
        self.cache.invalidate_flag(flag.name());
        Ok(())
    }

    async fn update(&self, flag: &FeatureFlag) -> Result<(), RepoError> {
        self.inner.update(flag).await?;
        self.cache.invalidate_flag(flag.name());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), RepoError> {
        self.inner.delete(name).await?;
        self.cache.invalidate_flag(name);
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, RepoError> {
        self.inner.exists(name).await
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        self.inner.health_check().await
    }
}
