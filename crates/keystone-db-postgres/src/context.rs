//! Task-local session scoping.
//!
//! A [`SessionContext`] is the process-wide registry of live sessions. Each
//! request (or standalone unit of work) runs inside [`SessionContext::scope`],
//! which allocates a fresh [`SessionId`], registers a [`DbSession`] for it,
//! and exposes the id to everything awaited inside the scope through a tokio
//! task-local. The session is removed when the scope ends on any exit path,
//! including cancellation and panics.
//!
//! Spawned tasks do not inherit the scope; they must open their own.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::router::SessionRouter;
use crate::session::DbSession;

tokio::task_local! {
    static SESSION_SCOPE: SessionId;
}

/// Opaque per-scope correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Allocates a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Registry of sessions keyed by scope id.
///
/// Cheap to clone; clones share the registry and the router.
#[derive(Clone)]
pub struct SessionContext {
    router: SessionRouter,
    sessions: Arc<DashMap<SessionId, Arc<DbSession>>>,
}

impl SessionContext {
    pub fn new(router: SessionRouter) -> Self {
        Self {
            router,
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn router(&self) -> &SessionRouter {
        &self.router
    }

    /// Runs `fut` inside a new session scope.
    ///
    /// Uncommitted writes left in the session when the scope ends are rolled
    /// back when the session drops.
    pub async fn scope<F>(&self, fut: F) -> F::Output
    where
        F: Future,
    {
        let id = SessionId::new();
        self.sessions
            .insert(id, Arc::new(DbSession::new(id, self.router.clone())));
        tracing::trace!(session = %id, "Session scope opened");

        let _guard = ScopeGuard {
            id,
            sessions: &self.sessions,
        };
        SESSION_SCOPE.scope(id, fut).await
    }

    /// The id of the enclosing scope.
    pub fn current_id() -> DbResult<SessionId> {
        SESSION_SCOPE
            .try_with(|id| *id)
            .map_err(|_| DbError::NoSessionScope)
    }

    /// The session of the enclosing scope.
    pub fn current(&self) -> DbResult<Arc<DbSession>> {
        let id = Self::current_id()?;
        self.sessions
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DbError::SessionNotFound { id: id.to_string() })
    }

    /// Number of registered sessions.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("active_sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

struct ScopeGuard<'a> {
    id: SessionId,
    sessions: &'a DashMap<SessionId, Arc<DbSession>>,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.sessions.remove(&self.id);
        tracing::trace!(session = %self.id, "Session scope closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::pool::connect_lazy;

    fn context() -> SessionContext {
        SessionContext::new(connect_lazy(&DatabaseConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn test_no_scope_outside_of_scope() {
        let ctx = context();
        assert!(matches!(
            SessionContext::current_id(),
            Err(DbError::NoSessionScope)
        ));
        assert!(ctx.current().is_err());
    }

    #[tokio::test]
    async fn test_scope_registers_and_removes_session() {
        let ctx = context();
        let id = ctx
            .scope(async {
                assert_eq!(ctx.active_sessions(), 1);
                let session = ctx.current().unwrap();
                assert_eq!(session.id(), SessionContext::current_id().unwrap());
                session.id()
            })
            .await;

        assert_eq!(ctx.active_sessions(), 0);
        assert_ne!(id, SessionId::new());
    }

    #[tokio::test]
    async fn test_nested_scope_is_independent() {
        let ctx = context();
        ctx.scope(async {
            let outer = SessionContext::current_id().unwrap();
            let inner = ctx
                .scope(async { SessionContext::current_id().unwrap() })
                .await;
            assert_ne!(outer, inner);
            assert_eq!(SessionContext::current_id().unwrap(), outer);
            assert_eq!(ctx.active_sessions(), 1);
        })
        .await;
    }
}
