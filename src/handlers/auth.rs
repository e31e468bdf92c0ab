use axum::{extract::State, Extension, Json};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use tracing::{info, instrument, warn};
use crate::audit::{self, AuditRecord};
use crate::auth::jwt::{sign_token, verify_token};
use crate::auth::password::{hash_password, validate_password, verify_login, verify_password};
use crate::auth::session::{clear_session_cookie, session_cookie, token_from_headers};
use crate::dtos::auth::{ChangePasswordRequest, LoginRequest, LoginResponse};
use crate::dtos::user::UserResponse;
use crate::extract::ApiJson;
use crate::error::AppError;
use crate::handlers::client_ip;
use crate::middleware::auth::AuthContext;
use crate::models::audit_log::{AuditAction, TargetType};
use crate::models::user::{User, USER_COLUMNS};
use crate::models::user_change::FieldChange;
use crate::state::AppState;

#[instrument(skip_all, fields(username = %payload.username))]
pub async fn login(
    State(AppState { db_pool, config }): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Response, AppError> {
    let username = payload.username.trim();
    if username.is_empty() {
        return Err(AppError::validation("Username required"));
    }
    if payload.password.is_empty() {
        return Err(AppError::validation("Password required"));
    }
    let ip = client_ip(&headers);

    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
        .bind(username)
        .fetch_optional(&db_pool)
        .await?;

    let verified = verify_login(&payload.password, user.as_ref().map(|u| u.password_hash.as_str()))?;

    let user = match user {
        Some(u) if verified => u,
        other => {
            warn!("Failed login attempt");
            let mut conn = db_pool.acquire().await?;
            audit::record(
                &mut conn,
                AuditRecord::new(AuditAction::LoginFailed)
                    .actor(other.map(|u| u.id), username)
                    .details("invalid credentials")
                    .ip(ip),
            )
            .await?;
            return Err(AppError::unauthorized("Invalid credentials"));
        }
    };

    if !user.is_active {
        let mut conn = db_pool.acquire().await?;
        audit::record(
            &mut conn,
            AuditRecord::new(AuditAction::LoginFailed)
                .actor(Some(user.id), &user.username)
                .details("account disabled")
                .ip(ip),
        )
        .await?;
        return Err(AppError::forbidden("Account is disabled"));
    }

    let token = sign_token(user.id, &user.role, &user.username, &config.jwt_secret, config.session_ttl_hours)?;
    let cookie = session_cookie(&token, config.session_ttl_seconds(), config.cookie_secure)
        .ok_or_else(|| AppError::internal("Session cookie could not be encoded"))?;

    let mut tx = db_pool.begin().await?;
    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET last_login_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
    ))
    .bind(user.id)
    .fetch_one(&mut *tx)
    .await?;
    audit::record(
        &mut tx,
        AuditRecord::new(AuditAction::Login).actor(Some(user.id), &user.username).ip(ip),
    )
    .await?;
    tx.commit().await?;

    info!(user_id = user.id, "User logged in");

    let body = LoginResponse {
        access_token: token,
        token_type: "Bearer",
        expires_in_seconds: config.session_ttl_seconds(),
        user: UserResponse::from(user),
    };
    Ok((AppendHeaders([(header::SET_COOKIE, cookie)]), Json(body)).into_response())
}

/// Always clears the cookie; the audit row is only written for a valid session.
#[instrument(skip_all)]
pub async fn logout(
    State(AppState { db_pool, config }): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if let Some(claims) = token_from_headers(&headers).and_then(|t| verify_token(&t, &config.jwt_secret).ok()) {
        let mut conn = db_pool.acquire().await?;
        audit::record(
            &mut conn,
            AuditRecord::new(AuditAction::Logout)
                .actor(Some(claims.sub), &claims.username)
                .ip(client_ip(&headers)),
        )
        .await?;
    }

    Ok((
        StatusCode::NO_CONTENT,
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie(config.cookie_secure))]),
    )
        .into_response())
}

// Authenticated endpoint: returns full user profile from DB using the id in AuthContext
pub async fn get_me(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UserResponse>, AppError> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(auth.user_id)
        .fetch_optional(&db_pool)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(Json(UserResponse::from(user)))
}

#[instrument(skip_all, fields(user_id = auth.user_id))]
pub async fn change_password(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    validate_password(&req.new_password)?;
    if req.new_password == req.current_password {
        return Err(AppError::validation("New password must differ from the current one"));
    }

    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(auth.user_id)
        .fetch_optional(&db_pool)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    if !verify_password(&req.current_password, &user.password_hash)? {
        return Err(AppError::validation("Current password is incorrect"));
    }

    let password_hash = hash_password(&req.new_password)?;

    let mut tx = db_pool.begin().await?;
    sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(user.id)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?;
    audit::record_user_changes(&mut tx, user.id, auth.user_id, &[FieldChange::masked("password")]).await?;
    audit::record(
        &mut tx,
        AuditRecord::new(AuditAction::PasswordChanged)
            .by(&auth)
            .target(TargetType::User, user.id)
            .ip(client_ip(&headers)),
    )
    .await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}
