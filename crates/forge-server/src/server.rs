//! HTTP server implementation using Axum.

use crate::handler::{
    handle_cancel_job, handle_generate, handle_health, handle_list_jobs, handle_models,
    handle_not_found,
};
use axum::{
    routing::{get, post},
    Router,
};
use onnx_forge::ConversionService;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers.
pub struct AppState {
    pub service: Arc<ConversionService>,
}

/// Build the router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/models", get(handle_models))
        .route("/generate", post(handle_generate))
        .route("/jobs", get(handle_list_jobs))
        .route("/jobs/:job_id/cancel", post(handle_cancel_job))
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(
    service: Arc<ConversionService>,
    host: &str,
    port: u16,
) -> anyhow::Result<SocketAddr> {
    let state = Arc::new(AppState { service });
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "HTTP server exited");
        }
    });

    Ok(actual_addr)
}
