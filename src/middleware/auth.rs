use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use crate::auth::jwt::verify_token;
use crate::auth::session::token_from_headers;
use crate::error::AppError;
use crate::models::user::Role;
use crate::state::AppState;

#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user_id: i64,
    pub role: Role,
    pub username: String,
}

impl AuthContext {
    pub fn require_admin(&self, action: &str) -> Result<(), AppError> {
        if self.role != Role::Admin {
            return Err(AppError::forbidden(format!("Only admins can {action}")));
        }
        Ok(())
    }

    pub fn require_service_editor(&self, action: &str) -> Result<(), AppError> {
        if !self.role.can_edit_services() {
            return Err(AppError::forbidden(format!("Only admins and service users can {action}")));
        }
        Ok(())
    }
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = match token_from_headers(req.headers()) {
        Some(t) => t,
        None => return AppError::unauthorized("Missing session").into_response(),
    };

    let claims = match verify_token(&token, &state.config.jwt_secret) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = ?e, "Rejected session token");
            return AppError::unauthorized("Invalid or expired session").into_response();
        }
    };

    let role = match claims.role.parse::<Role>() {
        Ok(r) => r,
        Err(_) => return AppError::unauthorized("Invalid or expired session").into_response(),
    };

    // Attach context
    req.extensions_mut().insert(AuthContext {
        user_id: claims.sub,
        role,
        username: claims.username,
    });

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn ctx(role: Role) -> AuthContext {
        AuthContext { user_id: 1, role, username: "u".into() }
    }

    #[test]
    fn admin_gate() {
        assert!(ctx(Role::Admin).require_admin("manage users").is_ok());
        assert_matches!(ctx(Role::User).require_admin("manage users"), Err(AppError::Forbidden(_)));
        assert_matches!(
            ctx(Role::ServiceUser).require_admin("manage users"),
            Err(AppError::Forbidden(_))
        );
    }

    #[test]
    fn service_editor_gate() {
        assert!(ctx(Role::ServiceUser).require_service_editor("create services").is_ok());
        assert_matches!(
            ctx(Role::User).require_service_editor("create services"),
            Err(AppError::Forbidden(_))
        );
    }
}
