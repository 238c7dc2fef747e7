//! Client for the external identity service.
//!
//! Every call authenticates with HTTP Basic client credentials. Failures are
//! classified by status: 4xx becomes [`AuthError::ExternalServiceClient`];
//! 5xx, timeouts and connection failures become
//! [`AuthError::ExternalServiceServer`].

use serde::{Deserialize, Serialize};
use url::Url;

use crate::AuthResult;
use crate::config::IdentityServiceConfig;
use crate::error::{AuthError, ResponseCode};

/// Result of a `verify` call that reached the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The token is valid.
    Valid,
    /// The token is malformed or unknown.
    Invalid,
    /// The token is expired.
    Expired,
}

impl VerifyOutcome {
    /// Maps a verify response code onto an outcome.
    ///
    /// Unknown codes are treated as invalid.
    #[must_use]
    pub fn from_code(code: u16) -> Self {
        match ResponseCode::from_code(code) {
            Some(ResponseCode::Ok) => Self::Valid,
            Some(ResponseCode::TokenExpired) => Self::Expired,
            _ => Self::Invalid,
        }
    }

    /// Converts a rejection into the matching token error.
    ///
    /// # Errors
    ///
    /// Returns `TokenDecode` for `Invalid` and `TokenExpired` for `Expired`.
    pub fn into_result(self) -> AuthResult<()> {
        match self {
            Self::Valid => Ok(()),
            Self::Invalid => Err(AuthError::token_decode("rejected by identity service")),
            Self::Expired => Err(AuthError::TokenExpired),
        }
    }
}

/// Kind of token presented to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// An access token.
    AccessToken,
    /// A refresh token.
    RefreshToken,
}

/// Token endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Issued access token.
    pub access_token: String,

    /// Rotated refresh token, if the service issued one.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,

    /// Token type, usually `bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    token: &'a str,
    token_type: TokenKind,
}

#[derive(Deserialize)]
struct VerifyResponse {
    code: u16,
}

/// Client for the external identity service.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct IdentityClient {
    http_client: reqwest::Client,
    verify_url: Url,
    token_url: Url,
    revoke_url: Url,
    client_id: String,
    client_secret: String,
    refresh_token_key: String,
    scope: String,
}

impl IdentityClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: &IdentityServiceConfig) -> AuthResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| AuthError::configuration(format!("identity http client: {e}")))?;

        Ok(Self {
            http_client,
            verify_url: endpoint(&config.base_url, "verify"),
            token_url: endpoint(&config.base_url, "token"),
            revoke_url: endpoint(&config.base_url, "revoke"),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token_key: config.refresh_token_key.clone(),
            scope: config.scope.join(","),
        })
    }

    /// Asks the service whether `token` is valid.
    ///
    /// # Errors
    ///
    /// Returns an external-service error if the service could not give an
    /// answer. A rejected token is an `Ok` outcome, not an error.
    pub async fn verify(&self, token: &str, kind: TokenKind) -> AuthResult<VerifyOutcome> {
        let request = self
            .http_client
            .post(self.verify_url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .json(&VerifyRequest {
                token,
                token_type: kind,
            });

        let response: VerifyResponse = self.send_json(request).await?;
        let outcome = VerifyOutcome::from_code(response.code);
        tracing::debug!(code = response.code, ?outcome, "Identity service verify");
        Ok(outcome)
    }

    /// Obtains a server-to-server access token with the client-credentials grant.
    ///
    /// # Errors
    ///
    /// Returns an external-service error if the call fails.
    pub async fn server_access_token(&self) -> AuthResult<String> {
        let request = self
            .http_client
            .post(self.token_url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .query(&[("grant_type", "client_credentials"), ("scope", self.scope.as_str())]);

        let response: TokenResponse = self.send_json(request).await?;
        Ok(response.access_token)
    }

    /// Exchanges a refresh token with the refresh grant.
    ///
    /// The refresh token travels in a cookie named after `refresh_token_key`.
    ///
    /// # Errors
    ///
    /// Returns an external-service error if the call fails.
    pub async fn refresh_token(&self, refresh_token: &str) -> AuthResult<TokenResponse> {
        let request = self
            .http_client
            .post(self.token_url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(
                reqwest::header::COOKIE,
                format!("{}={}", self.refresh_token_key, refresh_token),
            )
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token_key", self.refresh_token_key.as_str()),
            ]);

        self.send_json(request).await
    }

    /// Revokes a token at the service.
    ///
    /// # Errors
    ///
    /// Returns an external-service error if the call fails.
    pub async fn revoke(&self, token: &str, kind: TokenKind) -> AuthResult<()> {
        let hint = match kind {
            TokenKind::AccessToken => "access_token",
            TokenKind::RefreshToken => "refresh_token",
        };
        let request = self
            .http_client
            .post(self.revoke_url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("token", token), ("token_type_hint", hint)]);

        self.send(request).await.map(|_| ())
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> AuthResult<T> {
        let response = self.send(request).await?;
        response.json::<T>().await.map_err(|e| {
            tracing::warn!(error = %e, "Malformed identity service response");
            AuthError::external_server(format!("malformed response: {e}"))
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> AuthResult<reqwest::Response> {
        let response = request.send().await.map_err(|e| {
            let kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connect"
            } else {
                "request"
            };
            tracing::error!(error = %e, kind, "Identity service unreachable");
            AuthError::external_server(format!("{kind}: {e}"))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            tracing::error!(status = status.as_u16(), body = %body, "ExternalServiceClientError");
            Err(AuthError::external_client(body))
        } else {
            tracing::error!(status = status.as_u16(), body = %body, "ExternalServiceServerError");
            Err(AuthError::external_server(body))
        }
    }
}

impl std::fmt::Debug for IdentityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityClient")
            .field("verify_url", &self.verify_url.as_str())
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Appends `segment` to the base URL's path.
fn endpoint(base: &Url, segment: &str) -> Url {
    let mut url = base.clone();
    let path = base.path().trim_end_matches('/');
    url.set_path(&format!("{path}/{segment}"));
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        let base = Url::parse("http://identity.local/api/v1/auth/").unwrap();
        assert_eq!(
            endpoint(&base, "verify").as_str(),
            "http://identity.local/api/v1/auth/verify"
        );

        let root = Url::parse("http://identity.local").unwrap();
        assert_eq!(endpoint(&root, "token").as_str(), "http://identity.local/token");
    }

    #[test]
    fn test_verify_outcome_from_code() {
        assert_eq!(VerifyOutcome::from_code(200), VerifyOutcome::Valid);
        assert_eq!(VerifyOutcome::from_code(4003), VerifyOutcome::Invalid);
        assert_eq!(VerifyOutcome::from_code(4005), VerifyOutcome::Expired);
        assert_eq!(VerifyOutcome::from_code(3004), VerifyOutcome::Invalid);
    }

    #[test]
    fn test_verify_request_shape() {
        let body = serde_json::to_value(VerifyRequest {
            token: "abc",
            token_type: TokenKind::AccessToken,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"token": "abc", "tokenType": "access_token"})
        );
    }
}
