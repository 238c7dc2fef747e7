//! HTTP middleware for authentication and authorization.
//!
//! - [`backend`] - turns request headers into a [`Principal`]
//! - [`auth`] - axum middleware that runs the backend and enforces permission sets
//! - [`error`] - `IntoResponse` for [`AuthError`](crate::AuthError)
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware, routing::get};
//! use keystone_auth::middleware::{AuthState, authenticate, enforce};
//! use keystone_auth::{Permission, PermissionSet, Principal};
//!
//! async fn me(principal: Principal) -> String {
//!     format!("{:?}", principal.user_id)
//! }
//!
//! let app = Router::new()
//!     .route("/me", get(me))
//!     .route_layer(middleware::from_fn_with_state(
//!         PermissionSet::authenticated(),
//!         enforce,
//!     ))
//!     .layer(middleware::from_fn_with_state(auth_state, authenticate));
//! ```

pub mod auth;
pub mod backend;
pub mod error;
pub mod types;

pub use auth::{AuthState, authenticate, enforce};
pub use backend::{AuthBackend, ExternalVerifier, LocalVerifier, TokenVerifier};
pub use error::error_body;
pub use types::Principal;
