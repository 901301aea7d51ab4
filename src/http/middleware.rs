//! Request gatekeeping middleware.
//!
//! Three layers sit in front of the inner service, outermost first: request
//! logging, time-of-day access restriction, and per-client rate limiting.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AccessHours;
use crate::ratelimit::{ClientKey, Decision, SlidingWindowLimiter};

/// Header naming the authenticated user, set by an upstream auth layer.
pub const USER_HEADER: &str = "x-user";

/// Body returned when a client exceeds its quota.
pub const RATE_LIMIT_MESSAGE: &str =
    "Message limit exceeded. Please wait before sending more messages.";

/// Body returned outside the configured access hours.
pub const ACCESS_HOURS_MESSAGE: &str =
    "Access to the messaging service is restricted at this time.";

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error message
    pub error: String,
}

fn forbidden(message: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn local_hour() -> u32 {
    chrono::Local::now().hour()
}

/// Shared state for the gatekeeping layers.
#[derive(Clone)]
pub struct GatekeeperState {
    limiter: Arc<SlidingWindowLimiter>,
    limited_methods: Arc<[Method]>,
    access_hours: Option<AccessHours>,
    current_hour: fn() -> u32,
}

impl GatekeeperState {
    /// Create state that rate-limits the given methods.
    pub fn new(limiter: Arc<SlidingWindowLimiter>, limited_methods: Vec<Method>) -> Self {
        Self {
            limiter,
            limited_methods: limited_methods.into(),
            access_hours: None,
            current_hour: local_hour,
        }
    }

    /// Restrict access to a daily window.
    pub fn with_access_hours(mut self, hours: Option<AccessHours>) -> Self {
        self.access_hours = hours;
        self
    }

    /// Replace the local-time hour source.
    pub fn with_hour_source(mut self, current_hour: fn() -> u32) -> Self {
        self.current_hour = current_hour;
        self
    }

    /// The limiter shared by every request.
    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    fn is_limited(&self, method: &Method) -> bool {
        self.limited_methods.iter().any(|m| m == method)
    }
}

/// Log every request with its user and path.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let user = request
        .headers()
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .unwrap_or("Anonymous")
        .to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    info!(
        timestamp = %chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f"),
        user = %user,
        method = %method,
        path = %path,
        "Incoming request"
    );

    next.run(request).await
}

/// Deny requests outside the configured access hours.
pub async fn restrict_access_hours(
    State(state): State<GatekeeperState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(hours) = state.access_hours {
        let hour = (state.current_hour)();
        if !hours.contains(hour) {
            warn!(
                hour = hour,
                start_hour = hours.start_hour,
                end_hour = hours.end_hour,
                path = %request.uri().path(),
                "Request outside access hours"
            );
            return forbidden(ACCESS_HOURS_MESSAGE);
        }
    }

    next.run(request).await
}

/// Apply the per-client sliding window to limited methods.
pub async fn limit_requests(
    State(state): State<GatekeeperState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.is_limited(request.method()) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = ClientKey::from_request(request.headers(), peer);

    match state.limiter.check_and_record(&key, Instant::now()) {
        Decision::Admit => next.run(request).await,
        Decision::Reject => {
            debug!(client = %key, path = %request.uri().path(), "Request rate limited");
            forbidden(RATE_LIMIT_MESSAGE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::FORWARDED_FOR_HEADER;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
        middleware::{from_fn, from_fn_with_state},
        routing::get,
        Router,
    };
    use std::time::Duration;
    use tower::ServiceExt;

    fn limiter(max_requests: u32) -> Arc<SlidingWindowLimiter> {
        Arc::new(SlidingWindowLimiter::with_limits(Duration::from_secs(60), max_requests).unwrap())
    }

    fn app(state: GatekeeperState) -> Router {
        Router::new()
            .route("/messages", get(|| async { "list" }).post(|| async { "sent" }))
            .layer(from_fn_with_state(state.clone(), limit_requests))
            .layer(from_fn_with_state(state, restrict_access_hours))
            .layer(from_fn(log_requests))
    }

    fn post_from(addr: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/messages")
            .header(FORWARDED_FOR_HEADER, addr)
            .body(Body::empty())
            .unwrap()
    }

    async fn error_message(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
        serde_json::from_slice::<ErrorBody>(&bytes).unwrap().error
    }

    #[tokio::test]
    async fn test_post_rejected_after_quota() {
        let app = app(GatekeeperState::new(limiter(2), vec![Method::POST]));

        for _ in 0..2 {
            let response = app.clone().oneshot(post_from("203.0.113.1")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(post_from("203.0.113.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(error_message(response).await, RATE_LIMIT_MESSAGE);

        // A different client still has its full quota.
        let response = app.oneshot(post_from("203.0.113.2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unlimited_methods_pass_through() {
        let limiter = limiter(0);
        let app = app(GatekeeperState::new(Arc::clone(&limiter), vec![Method::POST]));

        for _ in 0..5 {
            let request = Request::builder()
                .uri("/messages")
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(limiter.key_count(), 0);
    }

    #[tokio::test]
    async fn test_peer_address_used_without_forwarded_header() {
        let limiter = limiter(1);
        let app = app(GatekeeperState::new(Arc::clone(&limiter), vec![Method::POST]));
        let peer: SocketAddr = "192.0.2.10:40000".parse().unwrap();

        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/messages")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(limiter.window_len(&ClientKey::from("192.0.2.10")), Some(1));
    }

    #[tokio::test]
    async fn test_access_hours_enforced() {
        let hours = Some(AccessHours {
            start_hour: 18,
            end_hour: 21,
        });

        let closed = GatekeeperState::new(limiter(5), vec![Method::POST])
            .with_access_hours(hours)
            .with_hour_source(|| 9);
        let response = app(closed).oneshot(post_from("198.51.100.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(error_message(response).await, ACCESS_HOURS_MESSAGE);

        let open = GatekeeperState::new(limiter(5), vec![Method::POST])
            .with_access_hours(hours)
            .with_hour_source(|| 19);
        let response = app(open).oneshot(post_from("198.51.100.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_denied_by_hours_does_not_consume_quota() {
        let limiter = limiter(5);
        let state = GatekeeperState::new(Arc::clone(&limiter), vec![Method::POST])
            .with_access_hours(Some(AccessHours {
                start_hour: 18,
                end_hour: 21,
            }))
            .with_hour_source(|| 3);

        let response = app(state).oneshot(post_from("198.51.100.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(limiter.key_count(), 0);
    }
}
