use axum::extract::State;
use axum::{Extension, Json};
use chrono::Utc;
use tracing::instrument;
use crate::analytics::{
    self, clamp_window_days, window_start, AuditStatRow, DirectionRow, ServiceStatRow, UserStatRow,
};
use crate::dtos::analytics::{OverviewResponse, SecurityMetricsQuery, SecurityMetricsResponse};
use crate::extract::ApiQuery;
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::state::AppState;

// GET /api/analytics/overview
#[instrument(skip_all)]
pub async fn get_overview(
    State(AppState { db_pool, .. }): State<AppState>,
) -> Result<Json<OverviewResponse>, AppError> {
    let directions = sqlx::query_as::<_, DirectionRow>("SELECT id, name FROM directions")
        .fetch_all(&db_pool)
        .await?;
    let services = sqlx::query_as::<_, ServiceStatRow>("SELECT direction_id, service_type, is_active FROM services")
        .fetch_all(&db_pool)
        .await?;
    let users = sqlx::query_as::<_, UserStatRow>("SELECT role, is_active FROM users")
        .fetch_all(&db_pool)
        .await?;

    Ok(Json(analytics::overview(&directions, &services, &users)))
}

// GET /api/analytics/security-metrics
#[instrument(skip_all)]
pub async fn get_security_metrics(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<SecurityMetricsQuery>,
) -> Result<Json<SecurityMetricsResponse>, AppError> {
    auth.require_admin("view security metrics")?;

    let days = clamp_window_days(query.days);
    let now = Utc::now();
    let from = window_start(now, days);

    let events = sqlx::query_as::<_, AuditStatRow>(
        "SELECT action, actor_id, actor_username, created_at FROM audit_log WHERE created_at >= $1",
    )
    .bind(from)
    .fetch_all(&db_pool)
    .await?;
    let users = sqlx::query_as::<_, UserStatRow>("SELECT role, is_active FROM users")
        .fetch_all(&db_pool)
        .await?;

    Ok(Json(analytics::security_metrics(&events, &users, now, days)))
}
