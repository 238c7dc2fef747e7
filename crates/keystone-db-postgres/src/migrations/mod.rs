//! Embedded schema migrations.
//!
//! The SQL files under `migrations/` are compiled into the binary and applied
//! against the writer pool on startup. Applied versions are tracked in
//! `_sqlx_migrations`.
//!
//! To add a migration, create the SQL file and append an entry to
//! `embedded_migrations!` below.

use std::borrow::Cow;

use sqlx_core::migrate::{Migration, MigrationType, Migrator};
use sqlx_postgres::PgPool;
use tracing::{info, instrument};

use crate::error::{DbError, DbResult};

/// (version, description, sql) in chronological order.
macro_rules! embedded_migrations {
    () => {
        &[
            (
                20250601000001i64,
                "identity",
                include_str!("../../migrations/20250601000001_identity.sql"),
            ),
            (
                20250601000002i64,
                "request_response_log",
                include_str!("../../migrations/20250601000002_request_response_log.sql"),
            ),
        ]
    };
}

fn build_migrations() -> Vec<Migration> {
    embedded_migrations!()
        .iter()
        .map(|(version, description, sql)| Migration {
            version: *version,
            description: Cow::Borrowed(description),
            migration_type: MigrationType::Simple,
            sql: Cow::Borrowed(sql),
            checksum: Cow::Borrowed(&[]),
            no_tx: false,
        })
        .collect()
}

/// Applies all pending migrations.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> DbResult<()> {
    let migrations = build_migrations();
    info!(count = migrations.len(), "Running database migrations");

    let migrator = Migrator {
        migrations: Cow::Owned(migrations),
        ignore_missing: false,
        locking: true,
        no_tx: false,
    };

    migrator
        .run(pool)
        .await
        .map_err(|e| DbError::Migration(format!("Migration failed: {e}")))?;

    info!("Database migrations completed");
    Ok(())
}
