//! The feature flag aggregate and its override collections.

use std::collections::BTreeMap;
use std::fmt;

use super::error::DomainError;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 1024;

/// Audience tier an override applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverrideKind {
    User,
    Group,
    Region,
}

impl OverrideKind {
    pub const ALL: [OverrideKind; 3] = [Self::User, Self::Group, Self::Region];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Region => "region",
        }
    }

    fn target_label(self) -> &'static str {
        match self {
            Self::User => "user id",
            Self::Group => "group id",
            Self::Region => "region id",
        }
    }
}

impl fmt::Display for OverrideKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named boolean toggle with a global default and three override tiers.
///
/// Overrides are keyed by target id per kind, so a target can only ever
/// hold one override of each kind. A `FeatureFlag` always has a non-empty,
/// trimmed name; storage adapters go through [`FlagRecord`] and
/// [`FeatureFlag::from_record`] to get one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureFlag {
    name: String,
    is_enabled: bool,
    description: Option<String>,
    user_overrides: BTreeMap<String, bool>,
    group_overrides: BTreeMap<String, bool>,
    region_overrides: BTreeMap<String, bool>,
}

impl FeatureFlag {
    pub fn new(
        name: &str,
        is_enabled: bool,
        description: Option<String>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            name: normalize_name(name)?,
            is_enabled,
            description: normalize_description(description)?,
            user_overrides: BTreeMap::new(),
            group_overrides: BTreeMap::new(),
            region_overrides: BTreeMap::new(),
        })
    }

    /// Rebuild an aggregate from its persisted shape.
    pub fn from_record(record: FlagRecord) -> Result<Self, DomainError> {
        let FlagRecord {
            name,
            is_enabled,
            description,
            overrides,
        } = record;

        let mut flag = Self::new(&name, is_enabled, description)?;
        for entry in overrides {
            ensure_target(entry.kind, &entry.target_id)?;
            let previous = flag
                .overrides_mut(entry.kind)
                .insert(entry.target_id, entry.is_enabled);
            if previous.is_some() {
                return Err(DomainError::invariant(format!(
                    "flag `{}` has duplicate {} overrides",
                    flag.name, entry.kind
                )));
            }
        }

        Ok(flag)
    }

    pub fn to_record(&self) -> FlagRecord {
        let overrides = OverrideKind::ALL
            .into_iter()
            .flat_map(|kind| {
                self.overrides(kind)
                    .iter()
                    .map(move |(target_id, is_enabled)| OverrideRecord {
                        kind,
                        target_id: target_id.clone(),
                        is_enabled: *is_enabled,
                    })
            })
            .collect();

        FlagRecord {
            name: self.name.clone(),
            is_enabled: self.is_enabled,
            description: self.description.clone(),
            overrides,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    pub fn set_enabled(&mut self, is_enabled: bool) {
        self.is_enabled = is_enabled;
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Overrides of one kind, ordered by target id.
    pub fn overrides(&self, kind: OverrideKind) -> &BTreeMap<String, bool> {
        match kind {
            OverrideKind::User => &self.user_overrides,
            OverrideKind::Group => &self.group_overrides,
            OverrideKind::Region => &self.region_overrides,
        }
    }

    fn overrides_mut(&mut self, kind: OverrideKind) -> &mut BTreeMap<String, bool> {
        match kind {
            OverrideKind::User => &mut self.user_overrides,
            OverrideKind::Group => &mut self.group_overrides,
            OverrideKind::Region => &mut self.region_overrides,
        }
    }

    pub fn override_for(&self, kind: OverrideKind, target_id: &str) -> Option<bool> {
        self.overrides(kind).get(target_id).copied()
    }

    /// Insert or replace the override for `target_id`.
    pub fn set_override(
        &mut self,
        kind: OverrideKind,
        target_id: &str,
        is_enabled: bool,
    ) -> Result<(), DomainError> {
        ensure_target(kind, target_id)?;
        self.overrides_mut(kind)
            .insert(target_id.to_string(), is_enabled);
        Ok(())
    }

    /// Returns `false` when no override existed for `target_id`.
    pub fn remove_override(&mut self, kind: OverrideKind, target_id: &str) -> bool {
        self.overrides_mut(kind).remove(target_id).is_some()
    }
}

/// Persisted shape of a flag, used by storage adapters only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagRecord {
    pub name: String,
    pub is_enabled: bool,
    pub description: Option<String>,
    pub overrides: Vec<OverrideRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideRecord {
    pub kind: OverrideKind,
    pub target_id: String,
    pub is_enabled: bool,
}

pub fn normalize_name(name: &str) -> Result<String, DomainError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("feature flag name cannot be empty"));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::validation(format!(
            "feature flag name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(DomainError::validation(
            "feature flag name cannot contain control characters",
        ));
    }
    Ok(trimmed.to_string())
}

fn normalize_description(description: Option<String>) -> Result<Option<String>, DomainError> {
    let Some(value) = description else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(DomainError::validation(format!(
            "description exceeds {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    // Line breaks are fine; NUL cannot be stored in a text column.
    if trimmed.contains('\0') {
        return Err(DomainError::validation(
            "description cannot contain NUL characters",
        ));
    }
    Ok(Some(trimmed.to_string()))
}

pub fn ensure_target(kind: OverrideKind, target_id: &str) -> Result<(), DomainError> {
    if target_id.trim().is_empty() {
        return Err(DomainError::validation(format!(
            "{} cannot be empty",
            kind.target_label()
        )));
    }
    if target_id.chars().any(char::is_control) {
        return Err(DomainError::validation(format!(
            "{} cannot contain control characters",
            kind.target_label()
        )));
    }
    Ok(())
}
