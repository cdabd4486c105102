//! Process-local flag store, used when no database is configured.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::application::repos::{FlagsRepo, RepoError};
use crate::domain::flags::{FeatureFlag, FlagRecord};

/// Keeps the persisted shape of each flag, so reads hand out fresh
/// aggregates the same way the Postgres adapter does.
#[derive(Default)]
pub struct InMemoryFlagStore {
    records: RwLock<BTreeMap<String, FlagRecord>>,
}

impl InMemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn rebuild(record: &FlagRecord) -> Result<FeatureFlag, RepoError> {
    FeatureFlag::from_record(record.clone()).map_err(RepoError::from)
}

#[async_trait]
impl FlagsRepo for InMemoryFlagStore {
    async fn get_by_name(&self, name: &str) -> Result<Option<FeatureFlag>, RepoError> {
        let records = self.records.read().await;
        records.get(name).map(rebuild).transpose()
    }

    async fn get_all(&self) -> Result<Vec<FeatureFlag>, RepoError> {
        let records = self.records.read().await;
        records.values().map(rebuild).collect()
    }

    async fn add(&self, flag: &FeatureFlag) -> Result<(), RepoError> {
        let mut records = self.records.write().await;
        if records.contains_key(flag.name()) {
            return Err(RepoError::Duplicate {
                constraint: "feature_flags_pkey".to_string(),
            });
        }
        records.insert(flag.name().to_string(), flag.to_record());
        Ok(())
    }

    async fn update(&self, flag: &FeatureFlag) -> Result<(), RepoError> {
        let mut records = self.records.write().await;
        let slot = records.get_mut(flag.name()).ok_or(RepoError::NotFound)?;
        *slot = flag.to_record();
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), RepoError> {
        self.records.write().await.remove(name);
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, RepoError> {
        Ok(self.records.read().await.contains_key(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flags::OverrideKind;

    fn flag(name: &str) -> FeatureFlag {
        FeatureFlag::new(name, false, None).expect("valid flag")
    }

    #[tokio::test]
    async fn add_rejects_existing_name() {
        let store = InMemoryFlagStore::new();
        store.add(&flag("beta")).await.expect("first add");

        let err = store.add(&flag("beta")).await.expect_err("duplicate");
        assert!(matches!(err, RepoError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn get_all_is_ordered_by_name() {
        let store = InMemoryFlagStore::new();
        for name in ["zeta", "alpha", "mu"] {
            store.add(&flag(name)).await.expect("add");
        }

        let names: Vec<_> = store
            .get_all()
            .await
            .expect("list")
            .iter()
            .map(|flag| flag.name().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "mu", "zeta"]);
    }

    #[tokio::test]
    async fn update_replaces_whole_aggregate() {
        let store = InMemoryFlagStore::new();
        let mut stored = flag("beta");
        stored
            .set_override(OverrideKind::User, "alice", true)
            .expect("set");
        store.add(&stored).await.expect("add");

        let mut replacement = flag("beta");
        replacement.set_enabled(true);
        replacement
            .set_override(OverrideKind::Region, "eu", false)
            .expect("set");
        store.update(&replacement).await.expect("update");

        let loaded = store.get_by_name("beta").await.expect("get").expect("present");
        assert_eq!(loaded, replacement);
        assert!(loaded.overrides(OverrideKind::User).is_empty());
    }

    #[tokio::test]
    async fn update_of_missing_flag_is_not_found() {
        let store = InMemoryFlagStore::new();
        let err = store.update(&flag("ghost")).await.expect_err("missing");
        assert!(matches!(err, RepoError::NotFound));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryFlagStore::new();
        store.add(&flag("beta")).await.expect("add");

        store.delete("beta").await.expect("delete");
        store.delete("beta").await.expect("delete again");
        assert!(!store.exists("beta").await.expect("exists"));
    }
}
