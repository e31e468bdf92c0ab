use axum::{Router, routing::get, middleware};
use crate::state::AppState;
use crate::handlers::audit_log::list_audit_log;
use crate::middleware::auth::require_auth;

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/audit-log", get(list_audit_log))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
}
