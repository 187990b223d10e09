//! Rate limiting, admin gating and request logging.

use super::AppState;
use crate::error::BridgeError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use secrecy::ExposeSecret;
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
};
use tracing::{debug, warn};

/// Header carrying the internal API token.
pub const ADMIN_TOKEN_HEADER: &str = "X-Super-Admin-Token";

/// Global rate limiter (not keyed by IP).
pub type GlobalLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter state shared across client requests.
#[derive(Clone)]
pub struct RateLimitState {
    pub global: Arc<GlobalLimiter>,
}

impl RateLimitState {
    pub fn new(requests_per_minute: u32) -> Self {
        let quota = Quota::per_minute(
            NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN),
        );

        Self {
            global: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Create a permissive rate limiter for testing.
    pub fn permissive() -> Self {
        Self::new(100_000)
    }
}

/// Rejects client requests once the global quota is used up.
pub async fn rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, BridgeError> {
    if rate_limit.global.check().is_err() {
        warn!("Client rate limit exceeded");
        return Err(BridgeError::RateLimitExceeded);
    }

    Ok(next.run(request).await)
}

/// Gate for the internal API: token configured, loopback peer, matching
/// `X-Super-Admin-Token` header.
pub async fn admin_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, BridgeError> {
    let Some(expected) = state.admin_token.as_ref() else {
        return Err(BridgeError::Internal("admin token not configured".into()));
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    if !peer.is_some_and(is_loopback) {
        warn!(peer = ?peer, "Internal API request from non-local peer");
        return Err(BridgeError::Forbidden(
            "internal API only available from localhost".into(),
        ));
    }

    let provided = request
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if provided.is_empty() || provided != expected.expose_secret().as_str() {
        warn!("Internal API request with invalid admin token");
        return Err(BridgeError::Unauthorized("invalid admin token".into()));
    }

    Ok(next.run(request).await)
}

/// Loopback check that also accepts IPv4-mapped IPv6 loopback.
pub fn is_loopback(ip: IpAddr) -> bool {
    ip.to_canonical().is_loopback()
}

/// Logging middleware for requests.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    debug!(%method, %uri, "Request started");

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_success() {
        debug!(%method, %uri, %status, ?duration, "Request completed");
    } else {
        warn!(%method, %uri, %status, ?duration, "Request failed");
    }

    response
}
