//! Unit-of-work boundaries.
//!
//! [`transactional`] commits the unit when the operation succeeds and rolls
//! it back when it fails, returning the operation's error unchanged.
//! Boundaries do not merge: a nested boundary commits or rolls back on its own.
//!
//! [`standalone`] additionally opens a brand new session scope for the
//! operation, so the work never shares state with an ambient scope.

use std::future::Future;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::context::SessionContext;
use crate::error::{DbError, DbResult};
use crate::session::DbSession;

/// Something that can be committed or rolled back.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn commit(&self) -> DbResult<()>;

    async fn rollback(&self) -> DbResult<()>;
}

#[async_trait]
impl UnitOfWork for DbSession {
    async fn commit(&self) -> DbResult<()> {
        DbSession::commit(self).await
    }

    async fn rollback(&self) -> DbResult<()> {
        DbSession::rollback(self).await
    }
}

/// Runs `op` and commits `unit` on success or rolls it back on failure.
///
/// If the commit itself fails the unit is rolled back and the commit error is
/// returned. A failed rollback after an operation error is logged and the
/// operation's error is returned.
pub async fn transactional<U, F, Fut, T, E>(unit: &U, op: F) -> Result<T, E>
where
    U: UnitOfWork + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<DbError>,
{
    match op().await {
        Ok(value) => {
            if let Err(commit_err) = unit.commit().await {
                warn!(error = %commit_err, "Commit failed, rolling back");
                if let Err(rollback_err) = unit.rollback().await {
                    error!(error = %rollback_err, "Rollback after failed commit failed");
                }
                return Err(commit_err.into());
            }
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = unit.rollback().await {
                error!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}

/// Runs `op` as a transactional unit inside a fresh session scope.
///
/// The session is removed once the unit has committed or rolled back,
/// whatever the outcome.
pub async fn standalone<F, Fut, T, E>(ctx: &SessionContext, op: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<DbError>,
{
    ctx.scope(async {
        let session = ctx.current()?;
        transactional(session.as_ref(), op).await
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<&'static str>>,
        fail_commit: bool,
    }

    impl Recorder {
        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UnitOfWork for Recorder {
        async fn commit(&self) -> DbResult<()> {
            self.events.lock().unwrap().push("commit");
            if self.fail_commit {
                return Err(DbError::config("commit refused"));
            }
            Ok(())
        }

        async fn rollback(&self) -> DbResult<()> {
            self.events.lock().unwrap().push("rollback");
            Ok(())
        }
    }

    #[derive(Debug, PartialEq)]
    enum AppError {
        Domain(&'static str),
        Db(String),
    }

    impl From<DbError> for AppError {
        fn from(err: DbError) -> Self {
            Self::Db(err.to_string())
        }
    }

    #[tokio::test]
    async fn test_commit_on_success() {
        let unit = Recorder::default();
        let value = assert_ok!(transactional(&unit, || async { Ok::<_, AppError>(7) }).await);
        assert_eq!(value, 7);
        assert_eq!(unit.events(), vec!["commit"]);
    }

    #[tokio::test]
    async fn test_rollback_and_reraise_unchanged() {
        let unit = Recorder::default();
        let err = assert_err!(
            transactional(&unit, || async { Err::<(), _>(AppError::Domain("boom")) }).await
        );
        assert_eq!(err, AppError::Domain("boom"));
        assert_eq!(unit.events(), vec!["rollback"]);
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back() {
        let unit = Recorder {
            fail_commit: true,
            ..Default::default()
        };
        let err = transactional(&unit, || async { Ok::<_, AppError>(()) })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AppError::Db("Configuration error: commit refused".into())
        );
        assert_eq!(unit.events(), vec!["commit", "rollback"]);
    }

    #[tokio::test]
    async fn test_nested_boundaries_are_independent() {
        let outer = Recorder::default();
        let inner = Recorder::default();
        let _ = transactional(&outer, || async {
            transactional(&inner, || async { Ok::<_, AppError>(()) }).await?;
            Err::<(), _>(AppError::Domain("outer failed"))
        })
        .await;
        assert_eq!(inner.events(), vec!["commit"]);
        assert_eq!(outer.events(), vec!["rollback"]);
    }
}
