use axum::{Router, routing::get, middleware};
use crate::state::AppState;
use crate::handlers::analytics::{get_overview, get_security_metrics};
use crate::middleware::auth::require_auth;

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/analytics/overview", get(get_overview))
        .route("/analytics/security-metrics", get(get_security_metrics))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
}
