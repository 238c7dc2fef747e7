use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use keystone_auth::Principal;
use keystone_db_postgres::SessionContext;
use uuid::Uuid;

use crate::audit::{RequestLog, RequestLogSink, extract_client_info};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Request id carried in the request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub HeaderValue);

impl RequestId {
    pub fn as_str(&self) -> Option<&str> {
        self.0.to_str().ok()
    }
}

// Ensures each request has an X-Request-Id and mirrors it on the response
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let value = match req.headers().get(&REQUEST_ID_HEADER) {
        Some(value) => value.clone(),
        None => {
            // A hyphenated UUID is always a valid header value.
            let generated = HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
            req.headers_mut()
                .insert(REQUEST_ID_HEADER, generated.clone());
            generated
        }
    };
    req.extensions_mut().insert(RequestId(value.clone()));

    let mut res = next.run(req).await;
    res.headers_mut().insert(REQUEST_ID_HEADER, value);
    res
}

/// Runs the rest of the stack inside a fresh session scope.
///
/// The session is dropped and the scope reset when the request finishes,
/// fails or is cancelled.
pub async fn session_scope(
    State(ctx): State<SessionContext>,
    req: Request<Body>,
    next: Next,
) -> Response {
    ctx.scope(next.run(req)).await
}

/// Records a [`RequestLog`] for every response.
///
/// Successful and client-error responses are written in the background.
/// Server errors are written before the response is returned.
pub async fn request_log(
    State(sink): State<Arc<dyn RequestLogSink>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = extract_client_info(req.headers(), peer);
    let user_id = req
        .extensions()
        .get::<Principal>()
        .and_then(|principal| principal.user_id);
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .and_then(RequestId::as_str)
        .map(String::from);
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let entry = RequestLog {
        request_id,
        user_id,
        ip: client.ip,
        port: client.port,
        agent: client.agent,
        method,
        path,
        response_status: response.status().as_u16(),
    };

    if response.status().is_server_error() {
        if let Err(err) = sink.record(entry).await {
            tracing::error!(error = %err, "Failed to record request log");
        }
    } else {
        tokio::spawn(async move {
            if let Err(err) = sink.record(entry).await {
                tracing::warn!(error = %err, "Failed to record request log");
            }
        });
    }
    response
}
