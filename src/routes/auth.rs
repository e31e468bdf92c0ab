use axum::{Router, routing::{get, post, put}, middleware};
use crate::state::AppState;
use crate::handlers::auth::{login, logout, get_me, change_password};
use crate::middleware::auth::require_auth;

pub fn routes(state: &AppState) -> Router<AppState> {
    let open = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout));

    let protected = Router::new()
        .route("/auth/me", get(get_me))
        .route("/auth/password", put(change_password))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    open.merge(protected)
}
