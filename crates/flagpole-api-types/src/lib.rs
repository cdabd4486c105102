//! Wire types for the Flagpole HTTP API.
//!
//! Field names are camelCase on the wire (`isEnabled`, `groupIds`, ...).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagView {
    pub name: String,
    pub is_enabled: bool,
    pub description: Option<String>,
    pub user_overrides: Vec<UserOverrideView>,
    pub group_overrides: Vec<GroupOverrideView>,
    pub region_overrides: Vec<RegionOverrideView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOverrideView {
    pub user_id: String,
    pub is_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupOverrideView {
    pub group_id: String,
    pub is_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionOverrideView {
    pub region_id: String,
    pub is_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFlagRequest {
    pub name: String,
    pub is_enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFlagRequest {
    pub is_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRequest {
    pub is_enabled: bool,
}

/// Request context for an evaluation. Every field is optional.
///
/// `group_ids` is ordered: the first group with an override decides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluateRequest {
    pub user_id: Option<String>,
    pub group_ids: Option<Vec<String>>,
    pub region_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    pub flag_name: String,
    pub is_enabled: bool,
}
