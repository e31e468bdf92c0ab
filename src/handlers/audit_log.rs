use axum::extract::State;
use axum::{Extension, Json};
use sqlx::{Postgres, QueryBuilder};
use tracing::instrument;
use crate::dtos::audit_log::AuditLogQuery;
use crate::dtos::clean_text;
use crate::extract::ApiQuery;
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::audit_log::AuditLogEntry;
use crate::pagination::Paginated;
use crate::state::AppState;

const AUDIT_COLUMNS: &str =
    "id, action, actor_id, actor_username, target_type, target_id, details, ip_address, created_at";

fn push_audit_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &AuditLogQuery) {
    qb.push(" WHERE 1=1");
    if let Some(action) = clean_text(query.action.as_deref()) {
        qb.push(" AND action = ").push_bind(action);
    }
    if let Some(actor_id) = query.actor_id {
        qb.push(" AND actor_id = ").push_bind(actor_id);
    }
    if let Some(target_type) = clean_text(query.target_type.as_deref()) {
        qb.push(" AND target_type = ").push_bind(target_type);
    }
    if let Some(target_id) = query.target_id {
        qb.push(" AND target_id = ").push_bind(target_id);
    }
    if let Some(from) = query.from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = query.to {
        qb.push(" AND created_at <= ").push_bind(to);
    }
}

// GET /api/audit-log
#[instrument(skip_all)]
pub async fn list_audit_log(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<AuditLogQuery>,
) -> Result<Json<Paginated<AuditLogEntry>>, AppError> {
    auth.require_admin("view the audit log")?;

    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(AppError::validation("'from' must not be after 'to'"));
        }
    }
    let page = query.page_params();

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_log");
    push_audit_filters(&mut count, &query);
    let total = count.build_query_scalar::<i64>().fetch_one(&db_pool).await?;

    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {AUDIT_COLUMNS} FROM audit_log"));
    push_audit_filters(&mut qb, &query);
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let entries = qb.build_query_as::<AuditLogEntry>().fetch_all(&db_pool).await?;

    Ok(Json(Paginated::new(entries, total, &page)))
}
