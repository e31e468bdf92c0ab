pub mod analytics;
pub mod audit;
pub mod auth;
pub mod config;
pub mod database;
pub mod dtos;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod pagination;
pub mod routes;
pub mod state;

use axum::http::{header, HeaderValue, Method};
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use crate::error::AppError;
use crate::handlers::health::health_check;
use crate::state::AppState;

/// Full application: the API under `/api` plus a root health check.
pub fn build_app(state: AppState) -> Router {
    let api = routes::create_router(&state);

    let mut app = Router::new()
        .route("/", get(|| async { "CAGPU API" }))
        .route("/health", get(health_check))
        .nest("/api", api)
        .fallback(|| async { AppError::not_found("Route not found") })
        .layer(TraceLayer::new_for_http());

    if let Some(origin) = state.config.cors_origin.as_deref() {
        match origin.parse::<HeaderValue>() {
            Ok(origin) => {
                app = app.layer(
                    CorsLayer::new()
                        .allow_origin(origin)
                        .allow_credentials(true)
                        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
                        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
                );
            }
            Err(e) => tracing::warn!(%origin, error = %e, "Ignoring invalid CORS_ORIGIN"),
        }
    }

    app.with_state(state)
}
