//! Keystone HTTP server.
//!
//! Wires request-scoped database sessions, bearer authentication, permission
//! checks, response caching and the request log around a small set of
//! account endpoints:
//!
//! | Route | Permission |
//! |-------|------------|
//! | `GET /health` | allow all |
//! | `POST /auth/refresh` | allow all |
//! | `POST /api/v1/users/login` | allow all |
//! | `POST /auth/logout` | authenticated |
//! | `GET /api/v1/users/me` | authenticated |

pub mod audit;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use server::{AppState, KeystoneServer, ServerBuilder, build_app};
