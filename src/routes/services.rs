use axum::{Router, routing::get, middleware};
use crate::state::AppState;
use crate::handlers::service::{
    list_services, get_service, create_service, update_service, delete_service,
};
use crate::middleware::auth::require_auth;

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/services", get(list_services).post(create_service))
        .route(
            "/services/{id}",
            get(get_service).put(update_service).delete(delete_service),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
}
