use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::config::RateLimitConfig;
use crate::content::routes as content_routes;
use crate::state::AppState;

/// Room for the JSON envelope around `encryptedData`
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// Wrap `routes` in a per-IP governor layer.
/// Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>, so the
/// server must be started with `into_make_service_with_connect_info`.
fn rate_limited(routes: Router<AppState>, limits: &RateLimitConfig) -> Router<AppState> {
    let Some(governor_config) = GovernorConfigBuilder::default()
        .key_extractor(PeerIpKeyExtractor)
        .per_second(limits.per_second)
        .burst_size(limits.burst_size)
        .finish()
    else {
        tracing::warn!(
            "Invalid rate limit settings (per_second={}, burst_size={}), rate limiting disabled",
            limits.per_second,
            limits.burst_size
        );
        return routes;
    };
    let governor_config = Arc::new(governor_config);

    // Spawn background task to clean up rate limiter state
    let limiter = governor_config.limiter().clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            limiter.retain_recent();
        }
    });

    routes.layer(GovernorLayer {
        config: governor_config,
    })
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Code allocation and creation consume code space, so they are the
    // rate-limited pair
    let write_routes = Router::new()
        .route(
            "/api/content/accessCode",
            post(content_routes::allocate_code),
        )
        .route("/api/content", post(content_routes::create_content));
    let write_routes = match state.rate_limit.as_ref().filter(|limits| limits.enabled) {
        Some(limits) => rate_limited(write_routes, limits),
        None => write_routes,
    };

    // Note: the static /api/content/accessCode route takes priority over {access_code},
    // so its other methods are routed here to keep the uniform 404.
    let content_routes = Router::new()
        .route(
            "/api/content/{access_code}",
            get(content_routes::get_content).put(content_routes::update_content),
        )
        .route(
            "/api/content/accessCode",
            get(content_routes::not_a_code).put(content_routes::not_a_code),
        );

    let health = Router::new().route("/health", get(health_check));

    let body_limit = state.max_payload_bytes + BODY_OVERHEAD_BYTES;

    Router::new()
        .merge(write_routes)
        .merge(content_routes)
        .merge(health)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
