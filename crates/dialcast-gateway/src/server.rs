//! HTTP server implementation using Axum.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use dialcast_core::config::GatewayConfig;
use dialcast_core::traits::TelephonyAdapter;
use dialcast_core::types::CampaignView;
use dialcast_engine::{CampaignRegistry, SchedulerGuards};

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CampaignRegistry>,
    /// Needed for the best-effort hangup when an operator pauses mid-call.
    pub telephony: Arc<dyn TelephonyAdapter>,
    pub guards: Arc<SchedulerGuards>,
    pub auto_restart: Arc<AtomicBool>,
    /// The scheduler's per-tick view broadcast; every WS client subscribes.
    pub feed: broadcast::Sender<Vec<CampaignView>>,
    pub start_time: std::time::Instant,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    Router::new()
        .route("/health", get(super::routes::health_check))
        .route("/api/v1/campaigns", get(super::routes::list_campaigns))
        .route("/api/v1/campaigns", post(super::routes::create_campaign))
        .route("/api/v1/campaigns/{id}", put(super::routes::update_campaign))
        .route("/api/v1/campaigns/{id}", delete(super::routes::delete_campaign))
        .route(
            "/api/v1/campaigns/{id}/state",
            patch(super::routes::set_campaign_state),
        )
        .route("/api/v1/auto-restart", get(super::routes::get_auto_restart))
        .route("/api/v1/auto-restart", put(super::routes::set_auto_restart))
        .route("/ws", get(super::ws::ws_handler))
        .layer(
            CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::PATCH,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server.
pub async fn start(config: &GatewayConfig, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("gateway listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
