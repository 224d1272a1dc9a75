//! HTTP server for the Prometheus metrics endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::connection::Connector;
use crate::exporter::Exporter;
use crate::exposition::{CONTENT_TYPE, render};

/// Application state shared across handlers.
struct AppState<C: Connector> {
    exporter: Arc<Exporter<C>>,
}

impl<C: Connector> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            exporter: self.exporter.clone(),
        }
    }
}

/// Create the HTTP router.
fn create_router<C: Connector>(exporter: Arc<Exporter<C>>, metrics_path: &str) -> Router {
    let state = AppState { exporter };

    Router::new()
        .route(metrics_path, get(metrics_handler::<C>))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler::<C>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint: one full scrape cycle per request.
async fn metrics_handler<C: Connector>(State(state): State<AppState<C>>) -> Response {
    let metrics = state.exporter.gather().await;
    let body = render(&metrics);

    (StatusCode::OK, [("content-type", CONTENT_TYPE)], body).into_response()
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Handler for the /ready endpoint.
async fn ready_handler<C: Connector>(State(state): State<AppState<C>>) -> Response {
    // Ready once a scrape has reached the server
    if state.exporter.is_up() {
        (StatusCode::OK, "ready\n").into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready - MySQL not reachable on last scrape\n",
        )
            .into_response()
    }
}

/// HTTP server configuration.
pub struct HttpServer<C: Connector> {
    exporter: Arc<Exporter<C>>,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl<C: Connector> HttpServer<C> {
    /// Create a new HTTP server.
    pub fn new(exporter: Arc<Exporter<C>>, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            exporter,
            listen_addr,
            metrics_path,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.exporter, &self.metrics_path);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
