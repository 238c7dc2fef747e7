//! Error response handling for authentication middleware.
//!
//! Every `AuthError` renders as `{"code": <int>, "message": <str>}` with a
//! fixed HTTP status.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::error::{AuthError, ResponseCode};

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let body = error_body(self.response_code(), &message_for(&self));

        let mut response = (status, Json(body)).into_response();
        if matches!(self, AuthError::AuthenticationMissing) {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

/// Builds the standard error body.
#[must_use]
pub fn error_body(code: ResponseCode, message: &str) -> Value {
    json!({
        "code": code.code(),
        "message": message,
    })
}

/// HTTP status for an error.
///
/// Token and identity-service failures are client errors (400); missing
/// credentials and missing authority are 401. The body `code` tells them apart.
fn status_for(error: &AuthError) -> StatusCode {
    match error {
        AuthError::TokenDecode { .. }
        | AuthError::TokenExpired
        | AuthError::ExternalServiceClient { .. }
        | AuthError::ExternalServiceServer { .. } => StatusCode::BAD_REQUEST,
        AuthError::AuthenticationMissing | AuthError::AuthorizationDenied { .. } => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::Storage { .. } | AuthError::Configuration { .. } | AuthError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Client-facing message. Internal details stay in the logs.
fn message_for(error: &AuthError) -> String {
    match error {
        AuthError::TokenDecode { .. }
        | AuthError::TokenExpired
        | AuthError::Storage { .. }
        | AuthError::Configuration { .. }
        | AuthError::Internal { .. } => error.response_code().message().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: AuthError) -> (StatusCode, Value, Option<HeaderValue>) {
        let response = err.into_response();
        let status = response.status();
        let www = response.headers().get(header::WWW_AUTHENTICATE).cloned();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap(), www)
    }

    #[test]
    fn test_status_table() {
        let cases = [
            (AuthError::token_decode("x"), StatusCode::BAD_REQUEST),
            (AuthError::TokenExpired, StatusCode::BAD_REQUEST),
            (AuthError::AuthenticationMissing, StatusCode::UNAUTHORIZED),
            (AuthError::authorization_denied("ADMIN"), StatusCode::UNAUTHORIZED),
            (AuthError::external_client("bad request"), StatusCode::BAD_REQUEST),
            (AuthError::external_server("down"), StatusCode::BAD_REQUEST),
            (AuthError::storage("x"), StatusCode::INTERNAL_SERVER_ERROR),
            (AuthError::configuration("x"), StatusCode::INTERNAL_SERVER_ERROR),
            (AuthError::internal("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(status_for(&err), expected, "{err:?}");
        }
    }

    #[tokio::test]
    async fn test_token_errors_are_bad_request() {
        let (status, body, www) = render(AuthError::TokenExpired).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 4005);
        assert_eq!(body["message"], "Token is expired");
        assert!(www.is_none());

        let (status, body, _) = render(AuthError::token_decode("x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 4003);
    }

    #[tokio::test]
    async fn test_missing_credentials_challenge() {
        let (status, body, www) = render(AuthError::AuthenticationMissing).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], 2001);
        assert_eq!(www.unwrap(), "Bearer");
    }

    #[tokio::test]
    async fn test_authorization_denied_is_unauthorized() {
        let (status, body, www) = render(AuthError::authorization_denied("ADMIN")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], 2101);
        assert!(www.is_none());
    }

    #[tokio::test]
    async fn test_external_errors() {
        let (status, body, _) = render(AuthError::external_client("bad request")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 5001);

        let (status, body, _) = render(AuthError::external_server("down")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 5002);
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let (status, body, _) = render(AuthError::storage("password=hunter2")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], 3004);
        assert_eq!(body["message"], "Undefined error");
    }
}
