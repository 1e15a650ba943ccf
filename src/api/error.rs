//! API error handling.
//!
//! Every failure is rendered in the same `{message, data}` envelope as a
//! success, with a 400 or 404 status.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use super::dto::ApiResponse;
use crate::infrastructure::{QueryError, RepositoryError};

const BAD_REQUEST: &str = "Bad Request";

/// API error response containing status code and envelope contents.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiErrorResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Envelope `message`.
    pub message: String,
    /// Envelope `data`: error text, or an empty array.
    pub data: Value,
}

impl ApiErrorResponse {
    /// Creates a new API error response.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, data: Value) -> Self {
        Self {
            status,
            message: message.into(),
            data,
        }
    }

    /// Creates a 400 `Bad Request` response carrying the error text.
    #[must_use]
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            BAD_REQUEST,
            Value::String(detail.into()),
        )
    }

    /// Creates a 404 response such as `Task not found`.
    #[must_use]
    pub fn not_found(resource: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} not found"),
            json!([]),
        )
    }

    /// Creates the 400 response for an `assignedUser` that does not resolve.
    #[must_use]
    pub fn invalid_assigned_user() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "Invalid assignedUser",
            json!([]),
        )
    }

    /// Creates the 400 response for a path id that is not an identifier.
    #[must_use]
    pub fn invalid_id(resource: &str, raw: &str) -> Self {
        Self::bad_request(format!(
            "Cast to UUID failed for value \"{raw}\" (type string) at path \"_id\" for model \"{resource}\""
        ))
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::new(self.message, self.data))).into_response()
    }
}

impl From<RepositoryError> for ApiErrorResponse {
    fn from(error: RepositoryError) -> Self {
        tracing::error!(%error, "store operation failed");
        Self::bad_request(error.to_string())
    }
}

impl From<QueryError> for ApiErrorResponse {
    fn from(error: QueryError) -> Self {
        Self::bad_request(error.to_string())
    }
}

impl From<JsonRejection> for ApiErrorResponse {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use rstest::rstest;

    async fn render(error: ApiErrorResponse) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[rstest]
    #[tokio::test]
    async fn test_not_found_envelope() {
        let (status, body) = render(ApiErrorResponse::not_found("Task")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"message": "Task not found", "data": []}));
    }

    #[rstest]
    #[tokio::test]
    async fn test_repository_error_is_bad_request() {
        let error = RepositoryError::DatabaseError("connection refused".to_string());
        let (status, body) = render(ApiErrorResponse::from(error)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"message": "Bad Request", "data": "Database error: connection refused"})
        );
    }

    #[rstest]
    fn test_query_error_carries_text() {
        let error = ApiErrorResponse::from(QueryError::UnsupportedOperator("$regex".to_string()));
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.data, json!("unknown operator: $regex"));
    }

    #[rstest]
    #[case("Task")]
    #[case("User")]
    fn test_invalid_id_names_model(#[case] resource: &str) {
        let error = ApiErrorResponse::invalid_id(resource, "abc");
        let text = error.data.as_str().unwrap();
        assert!(text.contains("\"abc\""));
        assert!(text.contains(resource));
    }

    #[rstest]
    fn test_invalid_assigned_user() {
        let error = ApiErrorResponse::invalid_assigned_user();
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.message, "Invalid assignedUser");
        assert_eq!(error.data, json!([]));
    }
}
