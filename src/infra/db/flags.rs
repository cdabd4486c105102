use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::{
    application::repos::{FlagsRepo, RepoError},
    domain::flags::{FeatureFlag, FlagRecord, OverrideKind, OverrideRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

const OVERRIDES_SELECT: &str = r#"
    SELECT flag_name, 'user'::text AS kind, user_id AS target_id, is_enabled
    FROM user_overrides
    UNION ALL
    SELECT flag_name, 'group'::text AS kind, group_id AS target_id, is_enabled
    FROM group_overrides
    UNION ALL
    SELECT flag_name, 'region'::text AS kind, region_id AS target_id, is_enabled
    FROM region_overrides
"#;

#[derive(sqlx::FromRow)]
struct FlagRow {
    name: String,
    is_enabled: bool,
    description: Option<String>,
}

#[derive(sqlx::FromRow)]
struct OverrideRow {
    flag_name: String,
    kind: String,
    target_id: String,
    is_enabled: bool,
}

impl TryFrom<OverrideRow> for OverrideRecord {
    type Error = RepoError;

    fn try_from(row: OverrideRow) -> Result<Self, Self::Error> {
        let kind = match row.kind.as_str() {
            "user" => OverrideKind::User,
            "group" => OverrideKind::Group,
            "region" => OverrideKind::Region,
            other => {
                return Err(RepoError::Integrity {
                    message: format!("unknown override kind `{other}`"),
                });
            }
        };

        Ok(Self {
            kind,
            target_id: row.target_id,
            is_enabled: row.is_enabled,
        })
    }
}

fn assemble(row: FlagRow, overrides: Vec<OverrideRecord>) -> Result<FeatureFlag, RepoError> {
    let record = FlagRecord {
        name: row.name,
        is_enabled: row.is_enabled,
        description: row.description,
        overrides,
    };
    FeatureFlag::from_record(record).map_err(RepoError::from)
}

fn insert_overrides_sql(kind: OverrideKind) -> &'static str {
    match kind {
        OverrideKind::User => {
            "INSERT INTO user_overrides (flag_name, user_id, is_enabled) \
             SELECT $1, target_id, is_enabled FROM UNNEST($2::text[], $3::bool[]) AS t(target_id, is_enabled)"
        }
        OverrideKind::Group => {
            "INSERT INTO group_overrides (flag_name, group_id, is_enabled) \
             SELECT $1, target_id, is_enabled FROM UNNEST($2::text[], $3::bool[]) AS t(target_id, is_enabled)"
        }
        OverrideKind::Region => {
            "INSERT INTO region_overrides (flag_name, region_id, is_enabled) \
             SELECT $1, target_id, is_enabled FROM UNNEST($2::text[], $3::bool[]) AS t(target_id, is_enabled)"
        }
    }
}

fn delete_overrides_sql(kind: OverrideKind) -> &'static str {
    match kind {
        OverrideKind::User => "DELETE FROM user_overrides WHERE flag_name = $1",
        OverrideKind::Group => "DELETE FROM group_overrides WHERE flag_name = $1",
        OverrideKind::Region => "DELETE FROM region_overrides WHERE flag_name = $1",
    }
}

async fn write_overrides(
    tx: &mut Transaction<'_, Postgres>,
    flag: &FeatureFlag,
) -> Result<(), RepoError> {
    for kind in OverrideKind::ALL {
        let overrides = flag.overrides(kind);
        if overrides.is_empty() {
            continue;
        }

        let (targets, values): (Vec<String>, Vec<bool>) = overrides
            .iter()
            .map(|(target_id, is_enabled)| (target_id.clone(), *is_enabled))
            .unzip();

        sqlx::query(insert_overrides_sql(kind))
            .bind(flag.name())
            .bind(targets)
            .bind(values)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
    }

    Ok(())
}

#[async_trait]
impl FlagsRepo for PostgresRepositories {
    async fn get_by_name(&self, name: &str) -> Result<Option<FeatureFlag>, RepoError> {
        let mut tx = self.begin_snapshot().await.map_err(map_sqlx_error)?;

        let Some(row) = sqlx::query_as::<_, FlagRow>(
            r#"
            SELECT name, is_enabled, description
            FROM feature_flags
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        else {
            return Ok(None);
        };

        let sql = format!("SELECT * FROM ({OVERRIDES_SELECT}) o WHERE o.flag_name = $1");
        let overrides = sqlx::query_as::<_, OverrideRow>(&sql)
            .bind(name)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(OverrideRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        tx.commit().await.map_err(map_sqlx_error)?;
        assemble(row, overrides).map(Some)
    }

    async fn get_all(&self) -> Result<Vec<FeatureFlag>, RepoError> {
        let mut tx = self.begin_snapshot().await.map_err(map_sqlx_error)?;

        let rows = sqlx::query_as::<_, FlagRow>(
            r#"
            SELECT name, is_enabled, description
            FROM feature_flags
            ORDER BY name
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let override_rows = sqlx::query_as::<_, OverrideRow>(OVERRIDES_SELECT)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        let mut by_flag: HashMap<String, Vec<OverrideRecord>> = HashMap::new();
        for row in override_rows {
            let flag_name = row.flag_name.clone();
            by_flag
                .entry(flag_name)
                .or_default()
                .push(OverrideRecord::try_from(row)?);
        }

        rows.into_iter()
            .map(|row| {
                let overrides = by_flag.remove(&row.name).unwrap_or_default();
                assemble(row, overrides)
            })
            .collect()
    }

    async fn add(&self, flag: &FeatureFlag) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO feature_flags (name, is_enabled, description)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(flag.name())
        .bind(flag.is_enabled())
        .bind(flag.description())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        write_overrides(&mut tx, flag).await?;

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn update(&self, flag: &FeatureFlag) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let updated = sqlx::query(
            r#"
            UPDATE feature_flags
            SET is_enabled = $2, description = $3, updated_at = now()
            WHERE name = $1
            "#,
        )
        .bind(flag.name())
        .bind(flag.is_enabled())
        .bind(flag.description())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        for kind in OverrideKind::ALL {
            sqlx::query(delete_overrides_sql(kind))
                .bind(flag.name())
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        write_overrides(&mut tx, flag).await?;

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn delete(&self, name: &str) -> Result<(), RepoError> {
        // Override rows go with the ON DELETE CASCADE foreign keys.
        sqlx::query("DELETE FROM feature_flags WHERE name = $1")
            .bind(name)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM feature_flags WHERE name = $1)",
        )
        .bind(name)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        self.ping().await.map_err(map_sqlx_error)
    }
}
