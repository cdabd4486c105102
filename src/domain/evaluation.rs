//! Override precedence resolution.
//!
//! Tiers are consulted in a fixed order (user, groups in caller order,
//! region) and the first override found decides. The global default
//! applies when no tier matches. Evaluation never fails.

use super::flags::{FeatureFlag, OverrideKind};

/// Who is asking. Blank and missing fields both skip their tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationContext {
    pub user_id: Option<String>,
    pub group_ids: Vec<String>,
    pub region_id: Option<String>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_groups<I, S>(mut self, group_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_ids = group_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_region(mut self, region_id: impl Into<String>) -> Self {
        self.region_id = Some(region_id.into());
        self
    }
}

/// Tier that produced an evaluation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationSource {
    User,
    Group,
    Region,
    Default,
}

impl EvaluationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Region => "region",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub enabled: bool,
    pub source: EvaluationSource,
}

pub fn evaluate(flag: &FeatureFlag, context: &EvaluationContext) -> bool {
    explain(flag, context).enabled
}

pub fn explain(flag: &FeatureFlag, context: &EvaluationContext) -> Evaluation {
    let user_match = present(context.user_id.as_deref())
        .and_then(|user_id| flag.override_for(OverrideKind::User, user_id));
    if let Some(enabled) = user_match {
        return Evaluation {
            enabled,
            source: EvaluationSource::User,
        };
    }

    let group_match = context
        .group_ids
        .iter()
        .find_map(|group_id| flag.override_for(OverrideKind::Group, group_id));
    if let Some(enabled) = group_match {
        return Evaluation {
            enabled,
            source: EvaluationSource::Group,
        };
    }

    let region_match = present(context.region_id.as_deref())
        .and_then(|region_id| flag.override_for(OverrideKind::Region, region_id));
    if let Some(enabled) = region_match {
        return Evaluation {
            enabled,
            source: EvaluationSource::Region,
        };
    }

    Evaluation {
        enabled: flag.is_enabled(),
        source: EvaluationSource::Default,
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}
