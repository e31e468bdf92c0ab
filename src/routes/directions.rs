use axum::{Router, routing::get, middleware};
use crate::state::AppState;
use crate::handlers::direction::{
    list_directions, get_direction, create_direction, update_direction, delete_direction,
};
use crate::middleware::auth::require_auth;

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/directions", get(list_directions).post(create_direction))
        .route(
            "/directions/{id}",
            get(get_direction).put(update_direction).delete(delete_direction),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
}
