//! Connection pool management for the writer and reader pools.

use std::time::Duration;

use sqlx_core::pool::PoolOptions;
use sqlx_postgres::{PgPool, Postgres};
use tracing::{debug, info, instrument};

use crate::config::DatabaseConfig;
use crate::error::{DbError, DbResult};
use crate::router::SessionRouter;

/// Type alias for PostgreSQL pool options.
pub type PgPoolOptions = PoolOptions<Postgres>;

const MAX_LIFETIME: Duration = Duration::from_secs(1800);

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    let mut options = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .min_connections((config.pool_size / 4).max(1))
        .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
        .max_lifetime(MAX_LIFETIME)
        .test_before_acquire(false);

    if let Some(idle_timeout) = config.idle_timeout_ms {
        options = options.idle_timeout(Duration::from_millis(idle_timeout));
    }
    options
}

/// Creates a connection pool for `url` using the sizing in `config`.
#[instrument(skip(config, url), fields(url = %mask_password(url)))]
pub async fn create_pool(config: &DatabaseConfig, url: &str) -> DbResult<PgPool> {
    if config.pool_size == 0 {
        return Err(DbError::config("pool_size must be greater than zero"));
    }

    info!(
        pool_size = config.pool_size,
        connect_timeout_ms = config.connect_timeout_ms,
        "Creating PostgreSQL connection pool"
    );

    let pool = pool_options(config).connect(url).await?;

    debug!("PostgreSQL connection pool created successfully");

    Ok(pool)
}

/// Creates both pools and the router over them.
///
/// Without a `reader_url` both pools connect to the writer, keeping routing
/// semantics identical on single-node setups.
pub async fn create_router(config: &DatabaseConfig) -> DbResult<SessionRouter> {
    let writer = create_pool(config, &config.writer_url).await?;
    let reader = create_pool(config, config.reader_url()).await?;
    Ok(SessionRouter::new(writer, reader))
}

/// Builds a router whose pools connect on first use.
///
/// Useful in tests and for deferring connection errors to the first query.
pub fn connect_lazy(config: &DatabaseConfig) -> DbResult<SessionRouter> {
    let writer = pool_options(config).connect_lazy(&config.writer_url)?;
    let reader = pool_options(config).connect_lazy(config.reader_url())?;
    Ok(SessionRouter::new(writer, reader))
}

/// Checks that the pool can run a trivial query.
#[instrument(skip(pool))]
pub async fn test_connection(pool: &PgPool) -> DbResult<()> {
    sqlx_core::query::query("SELECT 1").execute(pool).await?;

    debug!("Database connection test successful");

    Ok(())
}

/// Masks the password in a database URL for logging.
pub fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@')
        && let Some(colon_pos) = url[..at_pos].rfind(':')
    {
        let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
        if colon_pos > scheme_end {
            return format!("{}:****{}", &url[..colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}
