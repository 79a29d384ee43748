//! Mapping of pipeline errors to HTTP responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use monita_data::DataError;
use serde_json::json;
use tracing::error;

/// Error returned by every handler; rendered as `{"detail": "..."}`
#[derive(Debug)]
pub struct ApiError(pub DataError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DataError::InvalidReference(_)
            | DataError::InvalidRequest(_)
            | DataError::BadResource(_)
            | DataError::EmptyResource => StatusCode::BAD_REQUEST,
            DataError::NotFound(_) => StatusCode::NOT_FOUND,
            DataError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DataError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<DataError> for ApiError {
    fn from(error: DataError) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, error = %self.0, "request failed");
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (DataError::InvalidReference("x".into()), StatusCode::BAD_REQUEST),
            (DataError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (DataError::BadResource("x".into()), StatusCode::BAD_REQUEST),
            (DataError::EmptyResource, StatusCode::BAD_REQUEST),
            (DataError::NotFound("resource 'x'".into()), StatusCode::NOT_FOUND),
            (DataError::PayloadTooLarge { size: 2, limit: 1 }, StatusCode::PAYLOAD_TOO_LARGE),
            (DataError::UpstreamUnavailable("x".into()), StatusCode::BAD_GATEWAY),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError(error).status(), expected);
        }
    }

    #[tokio::test]
    async fn test_body_carries_detail() {
        let response = ApiError(DataError::NotFound("resource 'r9'".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"detail": "resource 'r9' not found"}));
    }
}
