//! The `/health` and `/metrics` endpoints served alongside either
//! pipeline, independent of the document-store connection so a scrape
//! during startup still gets a response.

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::info;

use crate::shutdown::Shutdown;

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn metrics() -> Response {
    match crate::metrics::encode() {
        Ok(buffer) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Body::from(buffer))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(error) => {
            tracing::error!(?error, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn run(address: SocketAddr, shutdown: Shutdown) -> anyhow::Result<()> {
    let router = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics));

    info!(%address, "monitoring endpoint listening");
    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.await_shutdown_begin().await })
        .await?;

    Ok(())
}
