use std::future::Future;

use axum::{Json, extract::State, http::StatusCode};
use keystone_auth::password::verify_password;
use keystone_auth::{AuthError, Authority, Principal};
use keystone_db_postgres::transactional;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::cache::{CacheScope, HandlerSignature};
use crate::error::{ApiError, ApiResult};
use crate::handler_signature;
use crate::server::AppState;

/// Cache signature of [`me`].
///
/// Only `principal` shapes the response. `state` is shared by every request
/// and stays out of the key, and the principal's value is carried by the
/// `me:<user_id>` scope since keys only record parameter names.
pub const ME_SIGNATURE: HandlerSignature = handler_signature!(me, [principal]);

/// Cache namespace of the current-user response of `user_id`.
pub fn current_user_prefix(user_id: i64) -> String {
    format!("me:{user_id}")
}

/// Runs `op` as one unit of work on the request's session.
///
/// Without a database the operation runs as is.
async fn unit_of_work<T, F, Fut>(state: &AppState, op: F) -> ApiResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    match &state.sessions {
        Some(ctx) => {
            let session = ctx.current()?;
            transactional(session.as_ref(), op).await
        }
        None => op().await,
    }
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub refresh_token: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let user = state
        .users
        .find_by_email(&body.email)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    if !verify_password(&body.password, &user.password_hash)? {
        return Err(ApiError::bad_request("no email or wrong password"));
    }

    let issued = unit_of_work(&state, || async {
        Ok::<_, ApiError>(state.tokens.issue_for_user(&user).await?)
    })
    .await?;
    tracing::info!(user_id = user.id, "User logged in");

    Ok(Json(LoginResponse {
        token: issued.access_token,
        refresh_token: issued.refresh_token,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let access_ttl = state.tokens.lifetimes().access_token_lifetime;
    let access_token = state
        .tokens
        .refresh_access_token(&body.refresh_token, access_ttl)
        .await?;
    Ok(Json(RefreshResponse { access_token }))
}

/// Revokes every refresh credential of the caller and drops their cached
/// responses.
pub async fn logout(State(state): State<AppState>, principal: Principal) -> ApiResult<Json<Value>> {
    let user_id = principal.user_id.ok_or(AuthError::AuthenticationMissing)?;

    let revoked = unit_of_work(&state, || async {
        Ok::<_, ApiError>(state.tokens.revoke_refresh_token(user_id).await?)
    })
    .await?;
    state
        .cache
        .remove_by_prefix(&current_user_prefix(user_id))
        .await;

    Ok(Json(json!({ "revoked": revoked })))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub user_id: i64,
    pub group_id: Option<i64>,
    pub authority: Option<Authority>,
    pub scopes: Vec<String>,
}

pub async fn me(State(state): State<AppState>, principal: Principal) -> ApiResult<Json<CurrentUser>> {
    let user_id = principal.user_id.ok_or(AuthError::AuthenticationMissing)?;

    let current = state
        .cache
        .cached(
            CacheScope::prefix(current_user_prefix(user_id)),
            None,
            &ME_SIGNATURE,
            || async {
                tracing::debug!(user_id, "Building current user");
                Ok::<_, ApiError>(CurrentUser {
                    user_id,
                    group_id: principal.group_id,
                    authority: principal.authority,
                    scopes: principal.scopes.clone(),
                })
            },
        )
        .await?;
    Ok(Json(current))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::{CacheBackend, CacheManager};

    #[test]
    fn test_me_key_is_scoped_per_user() {
        let cache = CacheManager::new(CacheBackend::new_local(), Duration::from_secs(60));
        let scope = CacheScope::prefix(current_user_prefix(7));
        assert_eq!(
            cache.key_for(&ME_SIGNATURE, &scope),
            "me:7::keystone_server::handlers.me.principal"
        );
        assert_ne!(
            cache.key_for(&ME_SIGNATURE, &scope),
            cache.key_for(&ME_SIGNATURE, &CacheScope::prefix(current_user_prefix(70)))
        );
    }
}
