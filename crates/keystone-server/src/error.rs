//! HTTP error type for handlers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use keystone_auth::middleware::error_body;
use keystone_auth::{AuthError, ResponseCode};
use keystone_db_postgres::DbError;

/// Errors returned by handlers.
///
/// Auth errors keep their own status and code. Everything that is not a
/// domain error renders as 500 with the generic code and a fixed message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Auth(err) => {
                if err.is_server_error() {
                    tracing::error!(error = %err, "Request failed");
                }
                err.into_response()
            }
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(error_body(ResponseCode::UndefinedError, &message)),
            )
                .into_response(),
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(error_body(ResponseCode::UndefinedError, &message)),
            )
                .into_response(),
            other => {
                tracing::error!(error = %other, "Unhandled error");
                let code = ResponseCode::UndefinedError;
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(error_body(code, code.message())),
                )
                    .into_response()
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn render(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_client_errors_keep_message() {
        let (status, body) = render(ApiError::not_found("user not found")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "user not found");

        let (status, body) = render(ApiError::bad_request("no email or wrong password")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 3004);
    }

    #[tokio::test]
    async fn test_auth_errors_pass_through() {
        let (status, body) = render(ApiError::from(AuthError::TokenExpired)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 4005);
    }

    #[tokio::test]
    async fn test_unclassified_errors_are_generic() {
        let (status, body) = render(ApiError::from(DbError::NoSessionScope)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], 3004);
        assert_eq!(body["message"], "Undefined error");
    }
}
