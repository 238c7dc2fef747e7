use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use keystone_auth::middleware::{authenticate, enforce};
use keystone_auth::{
    AuthBackend, AuthState, JwtService, PermissionSet, TokenService, UserStorage,
};
use keystone_auth_postgres::PostgresAuthStorage;
use keystone_db_postgres::{SessionContext, SessionRouter, create_router, migrations};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::audit::{PostgresRequestLog, RequestLogSink};
use crate::cache::{CacheManager, create_cache_backend};
use crate::config::AppConfig;
use crate::handlers;
use crate::middleware::{self as app_middleware, RequestId};

/// Whole milliseconds in `latency`, saturating at `u64::MAX`.
fn elapsed_ms(latency: Duration) -> u64 {
    u64::try_from(latency.as_millis()).unwrap_or(u64::MAX)
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub tokens: TokenService,
    pub users: Arc<dyn UserStorage>,
    pub cache: CacheManager,
    pub request_log: Arc<dyn RequestLogSink>,
    /// Present when handlers run on a database session.
    pub sessions: Option<SessionContext>,
}

impl AppState {
    pub fn new(
        tokens: TokenService,
        users: Arc<dyn UserStorage>,
        cache: CacheManager,
        request_log: Arc<dyn RequestLogSink>,
    ) -> Self {
        Self {
            tokens,
            users,
            cache,
            request_log,
            sessions: None,
        }
    }

    pub fn with_sessions(mut self, sessions: SessionContext) -> Self {
        self.sessions = Some(sessions);
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("tokens", &self.tokens)
            .field("cache", &self.cache)
            .field("sessions", &self.sessions.is_some())
            .finish_non_exhaustive()
    }
}

pub fn build_app(state: AppState, auth: AuthState, body_limit: usize) -> Router {
    let public = Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/api/v1/users/login", post(handlers::login))
        .route_layer(middleware::from_fn_with_state(
            PermissionSet::allow_all(),
            enforce,
        ));

    let authenticated = Router::new()
        .route("/auth/logout", post(handlers::logout))
        .route("/api/v1/users/me", get(handlers::me))
        .route_layer(middleware::from_fn_with_state(
            PermissionSet::authenticated(),
            enforce,
        ));

    // Innermost first: request log -> authentication -> session scope
    let mut app = public
        .merge(authenticated)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.request_log),
            app_middleware::request_log,
        ))
        .layer(middleware::from_fn_with_state(auth, authenticate));
    if let Some(sessions) = state.sessions.clone() {
        app = app.layer(middleware::from_fn_with_state(
            sessions,
            app_middleware::session_scope,
        ));
    }

    app.layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let request_id = req
                        .extensions()
                        .get::<RequestId>()
                        .and_then(RequestId::as_str)
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        user_id = Empty,
                        request_id = %request_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record("http.status_code", res.status().as_u16());
                        tracing::info!(
                            http.status = res.status().as_u16(),
                            elapsed_ms = elapsed_ms(latency),
                            "request handled"
                        );
                    },
                ),
        )
        // Outside the trace layer so the span can read the id
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub struct KeystoneServer {
    addr: SocketAddr,
    app: Router,
    db: SessionRouter,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Connects the database pools and the cache, runs migrations when
    /// enabled and assembles the router.
    pub async fn build(self) -> anyhow::Result<KeystoneServer> {
        let config = self.config;

        let db = create_router(&config.database).await?;
        if config.database.run_migrations {
            migrations::run(db.writer()).await?;
        }
        let sessions = SessionContext::new(db.clone());
        let storage = PostgresAuthStorage::new(sessions.clone());
        let users: Arc<dyn UserStorage> = Arc::new(storage.users());

        let jwt = JwtService::new(
            config.auth.signing.secret.as_bytes(),
            config.auth.signing.algorithm,
        );
        let tokens = TokenService::new(
            jwt.clone(),
            Arc::new(storage.tokens()),
            config.auth.tokens.clone(),
        );
        let backend = AuthBackend::from_config(&config.auth, jwt)?
            .with_user_storage(Arc::clone(&users));
        tracing::info!(mode = ?config.auth.mode, "Authentication configured");

        let cache = CacheManager::new(
            create_cache_backend(&config.redis).await,
            config.cache.default_ttl(),
        );
        let request_log: Arc<dyn RequestLogSink> =
            Arc::new(PostgresRequestLog::new(sessions.clone()));

        let state = AppState::new(tokens, users, cache, request_log).with_sessions(sessions);
        let app = build_app(
            state,
            AuthState::new(backend),
            config.server.body_limit_bytes,
        );

        Ok(KeystoneServer {
            addr: self.addr,
            app,
            db,
        })
    }
}

impl KeystoneServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        self.db.close().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
