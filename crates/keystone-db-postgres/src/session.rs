//! The per-scope database session.

use std::fmt;

use sqlx_core::executor::Execute;
use sqlx_core::from_row::FromRow;
use sqlx_core::query::Query;
use sqlx_core::query_as::QueryAs;
use sqlx_postgres::{PgArguments, PgConnection, PgQueryResult, PgRow, PgTransaction, Postgres};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::context::SessionId;
use crate::error::DbResult;
use crate::router::{Route, SessionRouter};

type WriterSlot = Option<Box<PgTransaction<'static>>>;

/// A database session bound to one session scope.
///
/// Reads go to the reader pool until the first write. The first write opens a
/// transaction on the writer pool; from then on every statement, reads
/// included, runs on that transaction so the scope observes its own
/// uncommitted writes. [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) ends the transaction and routing falls back
/// to per-statement classification.
///
/// Uses a `Mutex` since sqlx requires mutable access to the transaction for
/// every statement.
pub struct DbSession {
    id: SessionId,
    router: SessionRouter,
    tx: Mutex<WriterSlot>,
}

impl DbSession {
    /// Creates an idle session.
    pub fn new(id: SessionId, router: SessionRouter) -> Self {
        Self {
            id,
            router,
            tx: Mutex::new(None),
        }
    }

    /// The scope id this session belongs to.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The router the session executes through.
    pub fn router(&self) -> &SessionRouter {
        &self.router
    }

    /// Returns `true` while a writer transaction holds uncommitted writes.
    pub async fn in_transaction(&self) -> bool {
        self.tx.lock().await.is_some()
    }

    /// The route the next statement would take.
    pub async fn route_for(&self, sql: &str) -> Route {
        let flushing = self.in_transaction().await;
        self.router.route(sql, flushing)
    }

    /// Locks the writer transaction, opening one if none is active.
    async fn writer(&self) -> DbResult<MappedMutexGuard<'_, PgConnection>> {
        let mut guard = self.tx.lock().await;
        let tx = match guard.take() {
            Some(tx) => tx,
            None => {
                let tx = self.router.writer().begin().await?;
                debug!(session = %self.id, "Opened writer transaction");
                Box::new(tx)
            }
        };
        Ok(MutexGuard::map(guard, |slot| &mut ***slot.insert(tx)))
    }

    /// Executes a statement and returns the affected row count.
    pub async fn execute<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> DbResult<PgQueryResult> {
        match self.route_for(query.sql()).await {
            Route::Reader => Ok(query.execute(self.router.reader()).await?),
            Route::Writer => {
                let mut tx = self.writer().await?;
                Ok(query.execute(&mut *tx).await?)
            }
        }
    }

    /// Fetches at most one row.
    pub async fn fetch_optional<'q, O>(
        &self,
        query: QueryAs<'q, Postgres, O, PgArguments>,
    ) -> DbResult<Option<O>>
    where
        O: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        match self.route_for(query.sql()).await {
            Route::Reader => Ok(query.fetch_optional(self.router.reader()).await?),
            Route::Writer => {
                let mut tx = self.writer().await?;
                Ok(query.fetch_optional(&mut *tx).await?)
            }
        }
    }

    /// Fetches exactly one row.
    pub async fn fetch_one<'q, O>(&self, query: QueryAs<'q, Postgres, O, PgArguments>) -> DbResult<O>
    where
        O: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        match self.route_for(query.sql()).await {
            Route::Reader => Ok(query.fetch_one(self.router.reader()).await?),
            Route::Writer => {
                let mut tx = self.writer().await?;
                Ok(query.fetch_one(&mut *tx).await?)
            }
        }
    }

    /// Fetches all rows.
    pub async fn fetch_all<'q, O>(
        &self,
        query: QueryAs<'q, Postgres, O, PgArguments>,
    ) -> DbResult<Vec<O>>
    where
        O: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        match self.route_for(query.sql()).await {
            Route::Reader => Ok(query.fetch_all(self.router.reader()).await?),
            Route::Writer => {
                let mut tx = self.writer().await?;
                Ok(query.fetch_all(&mut *tx).await?)
            }
        }
    }

    /// Commits pending writes. A session without writes commits trivially.
    pub async fn commit(&self) -> DbResult<()> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.commit().await?;
            debug!(session = %self.id, "Transaction committed");
        }
        Ok(())
    }

    /// Discards pending writes. A session without writes rolls back trivially.
    pub async fn rollback(&self) -> DbResult<()> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.rollback().await?;
            debug!(session = %self.id, "Transaction rolled back");
        }
        Ok(())
    }
}

impl fmt::Debug for DbSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbSession")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Drop for DbSession {
    fn drop(&mut self) {
        // sqlx issues ROLLBACK when the inner transaction drops.
        if self.tx.get_mut().is_some() {
            warn!(
                session = %self.id,
                "DbSession dropped with uncommitted writes - rolling back"
            );
        }
    }
}
