use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::api::{routes, websocket};
use crate::config::RelayConfig;
use crate::state::ServiceContext;

pub fn build_router(ctx: ServiceContext) -> Router {
    Router::new()
        // Presence
        .route("/api/v1/presence", get(routes::presence::list_online))
        .route("/api/v1/presence/:user_id", get(routes::presence::get_presence))
        .route("/health", get(routes::presence::health))
        // Signaling relay
        .route("/ws", get(websocket::ws_handler))
        // Middleware
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Serve the relay on an already bound listener until the server stops.
pub async fn serve(listener: TcpListener, ctx: ServiceContext) -> std::io::Result<()> {
    let router = build_router(ctx);
    if let Ok(addr) = listener.local_addr() {
        info!("Relay listening on http://{}", addr);
    }
    axum::serve(listener, router).await
}

pub async fn start_relay_server(ctx: ServiceContext, config: &RelayConfig) -> Result<(), String> {
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind relay on {}: {}", addr, e))?;
    serve(listener, ctx)
        .await
        .map_err(|e| format!("Relay server error: {}", e))
}
