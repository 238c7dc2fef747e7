//! Request/response log.
//!
//! One [`RequestLog`] is recorded per handled request. Records are written
//! through a [`RequestLogSink`]; the PostgreSQL sink runs each insert as its
//! own standalone unit of work so it never joins the request's session.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::http::{HeaderMap, header::USER_AGENT};
use keystone_db_postgres::{DbError, SessionContext, standalone};
use serde::Serialize;
use sqlx_core::query::query;
use tokio::sync::Mutex;

/// A single request/response log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestLog {
    pub request_id: Option<String>,
    pub user_id: Option<i64>,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub agent: Option<String>,
    pub method: String,
    pub path: String,
    pub response_status: u16,
}

/// Client address and agent of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub agent: Option<String>,
}

/// Reads the client address from proxy headers, falling back to the peer
/// address of the connection.
pub fn extract_client_info(headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientInfo {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    let agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    ClientInfo {
        ip: forwarded.or_else(|| peer.map(|addr| addr.ip().to_string())),
        port: peer.map(|addr| addr.port()),
        agent,
    }
}

/// Destination for request log records.
#[async_trait]
pub trait RequestLogSink: Send + Sync {
    async fn record(&self, entry: RequestLog) -> Result<(), DbError>;
}

/// Writes records into `request_response_log`.
#[derive(Debug, Clone)]
pub struct PostgresRequestLog {
    ctx: SessionContext,
}

impl PostgresRequestLog {
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl RequestLogSink for PostgresRequestLog {
    async fn record(&self, entry: RequestLog) -> Result<(), DbError> {
        standalone(&self.ctx, || async {
            let session = self.ctx.current()?;
            session
                .execute(
                    query(
                        r#"
                        INSERT INTO request_response_log
                            (request_id, user_id, ip, port, agent, method, path, response_status)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                        "#,
                    )
                    .bind(entry.request_id.as_deref())
                    .bind(entry.user_id)
                    .bind(entry.ip.as_deref())
                    .bind(entry.port.map(i32::from))
                    .bind(entry.agent.as_deref())
                    .bind(entry.method.as_str())
                    .bind(entry.path.as_str())
                    .bind(i32::from(entry.response_status)),
                )
                .await?;
            Ok(())
        })
        .await
    }
}

/// Keeps records in memory. Used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryRequestLog {
    entries: Mutex<Vec<RequestLog>>,
}

impl MemoryRequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<RequestLog> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl RequestLogSink for MemoryRequestLog {
    async fn record(&self, entry: RequestLog) -> Result<(), DbError> {
        tracing::debug!(
            method = %entry.method,
            path = %entry.path,
            status = entry.response_status,
            "Request logged"
        );
        self.entries.lock().await.push(entry);
        Ok(())
    }
}
