use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::application::flags::{CreateFlagCommand, FlagError};
use crate::application::repos::RepoError;
use crate::domain::evaluation::EvaluationContext;
use crate::domain::flags::OverrideKind;

use super::error::{ApiError, codes};
use super::extract::ApiJson;
use super::models::*;
use super::state::ApiState;

pub async fn list_flags(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let flags = state.flags.list().await.map_err(flag_to_api)?;
    Ok(Json(flags.iter().map(flag_view).collect::<Vec<_>>()))
}

pub async fn get_flag(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let flag = state.flags.get(&name).await.map_err(flag_to_api)?;
    Ok(Json(flag_view(&flag)))
}

pub async fn create_flag(
    State(state): State<ApiState>,
    ApiJson(payload): ApiJson<CreateFlagRequest>,
) -> Result<Response, ApiError> {
    let command = CreateFlagCommand {
        name: payload.name,
        is_enabled: payload.is_enabled,
        description: payload.description,
    };

    let flag = state.flags.create(command).await.map_err(flag_to_api)?;

    let mut response = (StatusCode::CREATED, Json(flag_view(&flag))).into_response();
    let location = format!("/flags/{}", encode_path_segment(flag.name()));
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    Ok(response)
}

pub async fn update_flag(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    ApiJson(payload): ApiJson<UpdateFlagRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .flags
        .update_global_state(&name, payload.is_enabled)
        .await
        .map_err(flag_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_flag(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.flags.delete(&name).await.map_err(flag_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

/// An empty body or JSON `null` is an empty context; anything else must be
/// an `EvaluateRequest` JSON object.
pub async fn evaluate_flag(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<EvaluateResponse>, ApiError> {
    let context = EvaluationContext::from(parse_evaluate_request(&body)?);

    let is_enabled = state
        .flags
        .evaluate(&name, &context)
        .await
        .map_err(flag_to_api)?;

    Ok(Json(EvaluateResponse {
        flag_name: name,
        is_enabled,
    }))
}

fn parse_evaluate_request(body: &[u8]) -> Result<EvaluateRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(EvaluateRequest::default());
    }
    serde_json::from_slice::<Option<EvaluateRequest>>(body)
        .map(Option::unwrap_or_default)
        .map_err(|err| {
            ApiError::bad_request("Invalid evaluation context", Some(err.to_string()))
        })
}

pub async fn set_user_override(
    state: State<ApiState>,
    Path((name, target_id)): Path<(String, String)>,
    payload: ApiJson<OverrideRequest>,
) -> Result<StatusCode, ApiError> {
    set_override(state, OverrideKind::User, name, target_id, payload).await
}

pub async fn remove_user_override(
    state: State<ApiState>,
    Path((name, target_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    remove_override(state, OverrideKind::User, name, target_id).await
}

pub async fn set_group_override(
    state: State<ApiState>,
    Path((name, target_id)): Path<(String, String)>,
    payload: ApiJson<OverrideRequest>,
) -> Result<StatusCode, ApiError> {
    set_override(state, OverrideKind::Group, name, target_id, payload).await
}

pub async fn remove_group_override(
    state: State<ApiState>,
    Path((name, target_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    remove_override(state, OverrideKind::Group, name, target_id).await
}

pub async fn set_region_override(
    state: State<ApiState>,
    Path((name, target_id)): Path<(String, String)>,
    payload: ApiJson<OverrideRequest>,
) -> Result<StatusCode, ApiError> {
    set_override(state, OverrideKind::Region, name, target_id, payload).await
}

pub async fn remove_region_override(
    state: State<ApiState>,
    Path((name, target_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    remove_override(state, OverrideKind::Region, name, target_id).await
}

async fn set_override(
    State(state): State<ApiState>,
    kind: OverrideKind,
    name: String,
    target_id: String,
    ApiJson(payload): ApiJson<OverrideRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .flags
        .set_override(kind, &name, &target_id, payload.is_enabled)
        .await
        .map_err(flag_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_override(
    State(state): State<ApiState>,
    kind: OverrideKind,
    name: String,
    target_id: String,
) -> Result<StatusCode, ApiError> {
    state
        .flags
        .remove_override(kind, &name, &target_id)
        .await
        .map_err(flag_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn health(State(state): State<ApiState>) -> Result<StatusCode, ApiError> {
    state.flags.health_check().await.map_err(|err| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::UNAVAILABLE,
            "Flag store unavailable",
            None,
        )
        .with_source(&err)
    })?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn flag_to_api(err: FlagError) -> ApiError {
    match err {
        FlagError::FlagNotFound { .. } => {
            ApiError::not_found("Feature flag not found", Some(err.to_string()))
        }
        FlagError::OverrideNotFound { .. } => {
            ApiError::not_found("Override not found", Some(err.to_string()))
        }
        FlagError::AlreadyExists { .. } => ApiError::new(
            StatusCode::CONFLICT,
            codes::ALREADY_EXISTS,
            "Feature flag already exists",
            Some(err.to_string()),
        ),
        FlagError::InvalidArgument { message } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_ARGUMENT,
            "Invalid argument",
            Some(message),
        ),
        FlagError::Repo(repo) => repo_to_api(repo),
    }
}

pub(crate) fn repo_to_api(err: RepoError) -> ApiError {
    let api = match &err {
        RepoError::Duplicate { constraint } => ApiError::new(
            StatusCode::CONFLICT,
            codes::ALREADY_EXISTS,
            "Duplicate record",
            Some(constraint.clone()),
        ),
        RepoError::NotFound => ApiError::not_found("Resource not found", None),
        RepoError::InvalidInput { message } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid input",
            Some(message.clone()),
        ),
        RepoError::Integrity { .. } => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTEGRITY,
            "Stored flag is inconsistent",
            None,
        ),
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timeout",
            None,
        ),
        RepoError::Persistence(_) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Persistence error",
            None,
        ),
    };
    api.with_source(&err)
}
