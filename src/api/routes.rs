use crate::api::handlers::{device, health};
use crate::api::state::AppState;
use axum::{extract::Request, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::Level;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/status/{imei}", get(device::get_status))
        .route("/readings/{imei}", get(device::get_reading))
        .route("/stats", get(device::get_stats))
        .with_state(Arc::new(state))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    tracing::span!(
                        Level::INFO,
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_request(|_request: &Request, _span: &tracing::Span| {
                    tracing::event!(Level::DEBUG, "received request");
                })
                .on_response(|_response: &axum::response::Response, latency: std::time::Duration, _span: &tracing::Span| {
                    tracing::event!(Level::INFO, latency = ?latency, "request completed");
                }),
        )
}
