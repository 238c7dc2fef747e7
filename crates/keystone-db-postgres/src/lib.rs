//! PostgreSQL session management for Keystone.
//!
//! This crate owns the request-scoped database session:
//!
//! - [`SessionRouter`] holds a writer (primary) and a reader (replica) pool and
//!   picks one per statement.
//! - [`DbSession`] executes statements through the router, opening a writer
//!   transaction lazily on the first write and keeping later reads on that
//!   transaction until it is committed or rolled back.
//! - [`SessionContext`] maps a task-local scope id to its session so that
//!   concurrent requests never share one.
//! - [`transactional`] and [`standalone`] wrap a unit of work with
//!   commit-on-success, rollback-on-error semantics.
//!
//! # Example
//!
//! ```ignore
//! use keystone_db_postgres::{DatabaseConfig, SessionContext, create_router, standalone};
//!
//! let router = create_router(&DatabaseConfig::new("postgres://localhost/keystone")).await?;
//! let ctx = SessionContext::new(router);
//!
//! ctx.scope(async {
//!     standalone(&ctx, || async {
//!         let session = ctx.current()?;
//!         session.execute(sqlx_core::query::query("UPDATE tokens SET is_valid = false")).await?;
//!         Ok::<_, DbError>(())
//!     })
//!     .await
//! })
//! .await?;
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Writer/reader pool configuration
//! - [`error`]: Error types
//! - [`pool`]: Connection pool creation
//! - [`router`]: Statement classification and pool selection
//! - [`session`]: The per-scope session
//! - [`context`]: Task-local session scoping
//! - [`transactional`]: Unit-of-work boundaries
//! - [`migrations`]: Embedded schema migrations

pub mod config;
pub mod context;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod router;
pub mod session;
pub mod transactional;

pub use config::DatabaseConfig;
pub use context::{SessionContext, SessionId};
pub use error::{DbError, DbResult};
pub use pool::{connect_lazy, create_pool, create_router, test_connection};
pub use router::{Route, SessionRouter, StatementKind, classify};
pub use session::DbSession;
pub use transactional::{UnitOfWork, standalone, transactional};

pub use sqlx_postgres::PgPool;
