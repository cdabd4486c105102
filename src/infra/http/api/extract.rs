use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};

use super::error::{ApiError, codes};

/// `Json<T>` whose rejections use the API error body.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(rejection_to_api(rejection)),
        }
    }
}

fn rejection_to_api(rejection: JsonRejection) -> ApiError {
    let (code, message) = match &rejection {
        JsonRejection::JsonDataError(_) => {
            (codes::INVALID_BODY, "Request body has the wrong shape")
        }
        JsonRejection::MissingJsonContentType(_) => {
            (codes::BAD_REQUEST, "Expected a JSON request body")
        }
        _ => (codes::BAD_REQUEST, "Request body is not valid JSON"),
    };

    ApiError::new(rejection.status(), code, message, Some(rejection.body_text()))
        .with_source(&rejection)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{StatusCode, header};
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Toggle {
        #[serde(rename = "isEnabled")]
        is_enabled: bool,
    }

    fn json_request(body: &'static str) -> Request {
        Request::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .expect("request should build")
    }

    #[tokio::test]
    async fn valid_body_is_extracted() {
        let request = json_request(r#"{"isEnabled":true}"#);
        let ApiJson(toggle) = ApiJson::<Toggle>::from_request(request, &())
            .await
            .expect("valid body");
        assert!(toggle.is_enabled);
    }

    #[tokio::test]
    async fn syntax_error_is_bad_request() {
        let err = ApiJson::<Toggle>::from_request(json_request("{oops"), &())
            .await
            .expect_err("malformed");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_field_is_unprocessable() {
        let err = ApiJson::<Toggle>::from_request(json_request("{}"), &())
            .await
            .expect_err("missing field");
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
