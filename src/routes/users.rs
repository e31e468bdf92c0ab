use axum::{Router, routing::get, middleware};
use crate::state::AppState;
use crate::handlers::user::{
    list_users, create_user, get_user, update_user, set_user_status, delete_user, get_user_history,
};
use crate::middleware::auth::require_auth;

// Admin only; the role check happens in each handler.
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).patch(set_user_status).delete(delete_user),
        )
        .route("/users/{id}/history", get(get_user_history))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
}
