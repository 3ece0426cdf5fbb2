pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use mtbridge_service::ConnectionService;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the Axum application router.
pub fn build_router(service: Arc<ConnectionService>) -> Router {
    let app_state = Arc::new(state::AppState::new(service));

    routes::api_routes()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the API server and run until Ctrl-C, then shut the terminal down.
pub async fn start_server(service: Arc<ConnectionService>, bind_addr: &str) -> anyhow::Result<()> {
    match service.initialize().await {
        Ok(()) => tracing::info!(terminal = service.terminal_name(), "Terminal initialized"),
        Err(e) => tracing::error!(
            terminal = service.terminal_name(),
            "Failed to initialize terminal: {}",
            e
        ),
    }

    let app = build_router(service.clone());
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("API server listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = service.shutdown().await {
        tracing::error!("Error during terminal shutdown: {}", e);
    }
    tracing::info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
