//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{limit_requests, log_requests, restrict_access_hours, GatekeeperState};
use crate::error::{Result, TurnstileError};

/// Wrap `inner` in the gatekeeping layers.
///
/// Requests pass logging, then the access-hours check, then the rate limiter.
pub fn gatekeep(inner: Router, state: GatekeeperState) -> Router {
    inner
        .layer(from_fn_with_state(state.clone(), limit_requests))
        .layer(from_fn_with_state(state, restrict_access_hours))
        .layer(from_fn(log_requests))
}

/// Liveness route, served outside the gatekeeping layers.
pub fn health_router() -> Router {
    Router::new().route("/health", get(|| async { "OK" }))
}

/// Gatekept `inner` plus the ungated health check.
pub fn app(inner: Router, state: GatekeeperState) -> Router {
    gatekeep(inner, state).merge(health_router())
}

/// Stand-in for the protected service: a catch-all that acknowledges every
/// request.
pub fn placeholder_router() -> Router {
    Router::new().fallback(accept)
}

async fn accept() -> Json<Value> {
    Json(json!({ "status": "accepted" }))
}

/// HTTP server that fronts an inner router with the gatekeeping layers.
pub struct GatekeeperServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Shared middleware state
    state: GatekeeperState,
}

impl GatekeeperServer {
    /// Create a new server.
    pub fn new(addr: SocketAddr, state: GatekeeperState) -> Self {
        Self { addr, state }
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, inner: Router, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_listener(listener, inner, signal).await
    }

    /// Serve on an already bound listener.
    pub async fn serve_listener<F>(self, listener: TcpListener, inner: Router, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = app(inner, self.state);

        info!(
            addr = %listener.local_addr()?,
            "Starting HTTP gatekeeper"
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            TurnstileError::Server(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccessHours;
    use crate::ratelimit::SlidingWindowLimiter;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use std::sync::Arc;
    use tokio::sync::oneshot;
    use tower::ServiceExt;

    fn state() -> GatekeeperState {
        GatekeeperState::new(Arc::new(SlidingWindowLimiter::default()), vec![Method::POST])
    }

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let _server = GatekeeperServer::new(addr, state());
    }

    #[tokio::test]
    async fn test_placeholder_routes() {
        let app = app(placeholder_router(), state());

        let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(health).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let post = Request::builder()
            .method(Method::POST)
            .uri("/api/conversations/1/messages")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(post).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_bypasses_access_hours() {
        let closed = state()
            .with_access_hours(Some(AccessHours {
                start_hour: 18,
                end_hour: 21,
            }))
            .with_hour_source(|| 3);
        let app = app(placeholder_router(), closed);

        let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(health).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let post = Request::builder()
            .method(Method::POST)
            .uri("/api/conversations/1/messages")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(post).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_serve_stops_on_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let server = GatekeeperServer::new(addr, state());
        let handle = tokio::spawn(server.serve_listener(listener, placeholder_router(), async {
            let _ = rx.await;
        }));

        tx.send(()).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("server did not shut down")
            .unwrap();
        assert!(result.is_ok());
    }
}
