//! HTTP error response handling for the API
//!
//! Conversions from domain errors to HTTP responses with status codes and JSON error
//! bodies.

use crate::error::{ApiError, Error, ToHttpStatus};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Implement IntoResponse for Error to automatically convert errors to HTTP responses
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let api_error: ApiError = self.into();

        (status_code, Json(api_error)).into_response()
    }
}

/// Implement IntoResponse for ApiError for explicit error responses
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Handlers that know a better status pair the body with it themselves
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use std::path::PathBuf;
    use std::time::Duration;

    async fn body_of(response: Response) -> ApiError {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_not_found_into_response() {
        let response = Error::NotFound("job 7".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let api_error = body_of(response).await;
        assert_eq!(api_error.error.code, "not_found");
        assert!(api_error.error.message.contains("job 7"));
    }

    #[tokio::test]
    async fn test_bot_challenge_is_too_many_requests() {
        let response = Error::BotChallenge("Sign in to confirm".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_of(response).await.error.code, "bot_challenge");
    }

    #[tokio::test]
    async fn test_timeout_carries_budget_in_details() {
        let response = Error::Timeout {
            after: Duration::from_secs(600),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let api_error = body_of(response).await;
        assert_eq!(api_error.error.code, "timeout");
        assert_eq!(api_error.error.details.unwrap()["timeout_secs"], 600);
    }

    #[tokio::test]
    async fn test_storage_error_into_response() {
        let response = Error::Storage(StorageError::ArchiveFailed {
            path: PathBuf::from("/store/job.zip"),
            reason: "disk full".to_string(),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let api_error = body_of(response).await;
        assert_eq!(api_error.error.code, "archive_failed");
        assert!(
            api_error.error.details.unwrap()["path"]
                .as_str()
                .unwrap()
                .ends_with("job.zip")
        );
    }

    #[tokio::test]
    async fn test_api_error_defaults_to_internal() {
        let response = ApiError::internal("boom").into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(response).await.error.code, "internal_error");
    }
}
