use axum::extract::State;
use axum::{Extension, Json};
use sqlx::PgConnection;
use crate::dtos::notification::{MarkAllReadResponse, NotificationQuery, UnreadCountResponse};
use crate::extract::{ApiPath, ApiQuery};
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::notification::Notification;
use crate::state::AppState;

const NOTIFICATION_LIMIT: i64 = 100;

/// Queues a notification for `user_id` inside the caller's transaction.
pub async fn notify(
    conn: &mut PgConnection,
    user_id: i64,
    kind: &str,
    title: &str,
    message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO notifications (user_id, kind, title, message) VALUES ($1, $2, $3, $4)")
        .bind(user_id)
        .bind(kind)
        .bind(title)
        .bind(message)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn list_notifications(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let notifications = sqlx::query_as::<_, Notification>(
        r#"SELECT id, user_id, kind, title, message, is_read, created_at
           FROM notifications
           WHERE user_id = $1 AND (NOT $2 OR NOT is_read)
           ORDER BY created_at DESC, id DESC
           LIMIT $3"#,
    )
    .bind(auth.user_id)
    .bind(query.unread_only)
    .bind(NOTIFICATION_LIMIT)
    .fetch_all(&db_pool)
    .await?;

    Ok(Json(notifications))
}

pub async fn unread_count(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UnreadCountResponse>, AppError> {
    let unread = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read",
    )
    .bind(auth.user_id)
    .fetch_one(&db_pool)
    .await?;

    Ok(Json(UnreadCountResponse { unread }))
}

// Another user's notification is reported as missing.
pub async fn mark_read(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Notification>, AppError> {
    let notification = sqlx::query_as::<_, Notification>(
        r#"UPDATE notifications SET is_read = TRUE
           WHERE id = $1 AND user_id = $2
           RETURNING id, user_id, kind, title, message, is_read, created_at"#,
    )
    .bind(id)
    .bind(auth.user_id)
    .fetch_optional(&db_pool)
    .await?
    .ok_or_else(|| AppError::not_found("Notification not found"))?;

    Ok(Json(notification))
}

pub async fn mark_all_read(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<MarkAllReadResponse>, AppError> {
    let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read")
        .bind(auth.user_id)
        .execute(&db_pool)
        .await?;

    Ok(Json(MarkAllReadResponse { updated: result.rows_affected() }))
}
