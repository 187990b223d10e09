//! Matrix SMS Bridge - Entry point.

use anyhow::{Context, Result};
use matrix_client::MatrixClient;
use matrix_sms_bridge::{
    api::{create_router_with_rate_limit, AppState, RateLimitState},
    config::Config,
    registry::{MappingRegistry, Store, TokenRegistry},
    AcrobitsPushClient, SessionManager,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    init_logging(&config.log.level, &config.log.format);

    info!("Starting Matrix SMS Bridge");

    let matrix = MatrixClient::new(&config.matrix.homeserver_url, config.matrix.request_timeout)
        .context("Failed to create Matrix client")?
        .with_timeline_limit(config.matrix.timeline_limit);

    if matrix.health_check().await {
        info!(homeserver = %matrix.homeserver_url(), "Homeserver reachable");
    } else {
        warn!(homeserver = %matrix.homeserver_url(), "Homeserver not reachable, continuing");
    }

    let relay = AcrobitsPushClient::new(&config.relay.push_url, config.relay.timeout)
        .context("Failed to create push relay client")?;

    let (token_store, mapping_store) = if config.storage.persist {
        info!(dir = ?config.storage.dir, "Using file storage");
        (
            Store::file(config.storage.push_tokens_path()),
            Store::file(config.storage.mappings_path()),
        )
    } else {
        info!("Persistence disabled, using in-memory storage");
        (Store::memory(), Store::memory())
    };

    let tokens = TokenRegistry::open(token_store)
        .await
        .context("Failed to load push token registry")?;
    let mappings = MappingRegistry::open(mapping_store)
        .await
        .context("Failed to load mapping registry")?;

    let network = Arc::new(matrix);
    let sessions = Arc::new(SessionManager::new(network.clone(), config.matrix.session_ttl));
    let _cleanup = sessions.spawn_cleanup(config.matrix.session_cleanup_interval);

    if config.admin.token.is_none() {
        warn!("ADMIN__TOKEN not set, internal API disabled");
    }

    let state = AppState::new(
        network,
        Arc::new(relay),
        sessions,
        tokens,
        mappings,
        config.admin.token.clone(),
    );

    let rate_limit = RateLimitState::new(config.rate_limit.client_per_minute);
    let app = create_router_with_rate_limit(state, rate_limit);

    let addr = config.server.socket_addr()?;

    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Peer addresses are needed by the internal API gate
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
