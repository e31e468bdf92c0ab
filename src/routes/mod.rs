pub mod auth;
pub mod users;
pub mod directions;
pub mod services;
pub mod audit_log;
pub mod notifications;
pub mod analytics;

use axum::{routing::get, Router};
use crate::handlers::health::health_check;
use crate::state::AppState;

pub fn create_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .merge(auth::routes(state))
        .merge(users::routes(state))
        .merge(directions::routes(state))
        .merge(services::routes(state))
        .merge(audit_log::routes(state))
        .merge(notifications::routes(state))
        .merge(analytics::routes(state))
}
