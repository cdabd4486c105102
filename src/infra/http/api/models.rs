//! Mapping between domain aggregates and the wire types in `flagpole-api-types`.

pub use flagpole_api_types::*;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::domain::evaluation::EvaluationContext;
use crate::domain::flags::{FeatureFlag, OverrideKind};

pub fn flag_view(flag: &FeatureFlag) -> FlagView {
    FlagView {
        name: flag.name().to_string(),
        is_enabled: flag.is_enabled(),
        description: flag.description().map(str::to_string),
        user_overrides: flag
            .overrides(OverrideKind::User)
            .iter()
            .map(|(user_id, is_enabled)| UserOverrideView {
                user_id: user_id.clone(),
                is_enabled: *is_enabled,
            })
            .collect(),
        group_overrides: flag
            .overrides(OverrideKind::Group)
            .iter()
            .map(|(group_id, is_enabled)| GroupOverrideView {
                group_id: group_id.clone(),
                is_enabled: *is_enabled,
            })
            .collect(),
        region_overrides: flag
            .overrides(OverrideKind::Region)
            .iter()
            .map(|(region_id, is_enabled)| RegionOverrideView {
                region_id: region_id.clone(),
                is_enabled: *is_enabled,
            })
            .collect(),
    }
}

impl From<EvaluateRequest> for EvaluationContext {
    fn from(request: EvaluateRequest) -> Self {
        Self {
            user_id: request.user_id,
            group_ids: request.group_ids.unwrap_or_default(),
            region_id: request.region_id,
        }
    }
}

/// Unreserved characters (RFC 3986) pass through; everything else is escaped,
/// `/` included, so a name always stays one segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub fn encode_path_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}
