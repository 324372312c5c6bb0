//! HTTP server initialization and routing

use axum::{routing::get, Router};
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::core::middleware::request_context_middleware;
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::reports::worker::{requeue_pending, run_worker};
use crate::tasks::TaskScheduler;

use super::{health_check, health_check_simple, openapi_json, shutdown_signal};

/// Full application router with middleware applied.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let mut api_router = Router::new()
        .route("/health", get(health_check_simple))
        .route(ApiUrls::HEALTH, get(health_check))
        .route(ApiUrls::OPENAPI, get(openapi_json));

    api_router = api_router.merge(crate::catalogs::configure_catalog_routes());
    api_router = api_router.merge(crate::risk::configure_risk_routes());
    api_router = api_router.merge(crate::notifications::configure_notification_routes());
    api_router = api_router.merge(crate::reports::configure_report_routes());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    api_router
        .with_state(app_state)
        .layer(axum::middleware::from_fn(request_context_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Starts the report worker, the scheduler and the listener; returns on shutdown.
pub async fn run_axum_server(
    app_state: Arc<AppState>,
    report_rx: mpsc::Receiver<Uuid>,
) -> anyhow::Result<()> {
    tokio::spawn(run_worker(app_state.clone(), report_rx));
    if let Err(e) = requeue_pending(&app_state).await {
        error!("Could not re-queue pending reports: {e}");
    }

    match TaskScheduler::with_default_jobs(app_state.clone()).await {
        Ok(scheduler) => scheduler.start().await,
        Err(e) => error!("Task scheduler not started: {e}"),
    }

    let server = &app_state.config.server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address {}:{}: {e}", server.host, server.port))?;

    let app = build_router(app_state.clone());

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {addr}: {e} - is another instance running?");
            return Err(e.into());
        }
    };
    info!("HTTP server listening on {addr}");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}
