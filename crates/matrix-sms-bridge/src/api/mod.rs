//! HTTP API for the bridge.

mod handlers;
mod middleware;
mod types;

pub use handlers::*;
pub use middleware::{
    admin_middleware, is_loopback, logging_middleware, rate_limit_middleware, RateLimitState,
    ADMIN_TOKEN_HEADER,
};
pub use types::*;

use crate::bridge::MessageBridge;
use crate::chat::ChatNetwork;
use crate::push::{PushRelay, PushTranslator};
use crate::registry::{MappingRegistry, TokenRegistry};
use crate::session::SessionManager;
use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use secrecy::SecretString;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Matrix homeserver
    pub network: Arc<dyn ChatNetwork>,
    /// Cached Matrix sessions
    pub sessions: Arc<SessionManager>,
    /// Device push registrations
    pub tokens: Arc<TokenRegistry>,
    /// SMS number mappings
    pub mappings: Arc<MappingRegistry>,
    pub bridge: Arc<MessageBridge>,
    pub push: Arc<PushTranslator>,
    /// Internal API token; `None` disables the internal routes
    pub admin_token: Option<SecretString>,
}

impl AppState {
    /// Wire the bridge and push translator over the shared components.
    pub fn new(
        network: Arc<dyn ChatNetwork>,
        relay: Arc<dyn PushRelay>,
        sessions: Arc<SessionManager>,
        tokens: TokenRegistry,
        mappings: MappingRegistry,
        admin_token: Option<SecretString>,
    ) -> Self {
        let tokens = Arc::new(tokens);
        let mappings = Arc::new(mappings);

        let bridge = MessageBridge::new(sessions.clone(), network.clone(), mappings.clone());
        let push = PushTranslator::new(tokens.clone(), relay);

        Self {
            network,
            sessions,
            tokens,
            mappings,
            bridge: Arc::new(bridge),
            push: Arc::new(push),
            admin_token,
        }
    }
}

/// Create the API router with the default client rate limit.
pub fn create_router(state: AppState) -> Router {
    create_router_with_rate_limit(state, RateLimitState::new(600))
}

/// Create the API router with custom rate limiting on the client routes.
pub fn create_router_with_rate_limit(state: AppState, rate_limit: RateLimitState) -> Router {
    let client_routes = Router::new()
        .route("/api/client/send_message", post(handlers::send_message))
        .route("/api/client/fetch_messages", post(handlers::fetch_messages))
        .route(
            "/api/client/push_token_report",
            post(handlers::push_token_report),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            rate_limit,
            rate_limit_middleware,
        ));

    let internal_routes = Router::new()
        .route(
            "/api/internal/map_sms_to_matrix",
            post(handlers::upsert_mapping).get(handlers::get_mapping),
        )
        .route("/api/internal/push_tokens", get(handlers::list_push_tokens))
        .route(
            "/api/internal/push_tokens/:selector",
            delete(handlers::delete_push_token),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            admin_middleware,
        ));

    Router::new()
        // Health check (no rate limiting)
        .route("/health", get(handlers::health))
        // Homeserver callbacks
        .route("/_matrix/push/v1/notify", post(handlers::push_notify))
        .route(
            "/_matrix/app/v1/transactions/:txn_id",
            put(handlers::app_transaction),
        )
        .merge(client_routes)
        .merge(internal_routes)
        .layer(axum_middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
