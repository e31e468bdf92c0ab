use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use tracing::instrument;
use crate::audit::{self, describe_changes, AuditRecord};
use crate::dtos::direction::{CreateDirectionRequest, DirectionResponse, DirectionSummary, UpdateDirectionRequest};
use crate::dtos::service::ServiceSummary;
use crate::dtos::{clean_text, patch_text};
use crate::extract::{ApiJson, ApiPath};
use crate::error::{map_db_error, map_unique_violation, AppError};
use crate::handlers::client_ip;
use crate::middleware::auth::AuthContext;
use crate::models::audit_log::{AuditAction, TargetType};
use crate::models::direction::Direction;
use crate::models::service::{Service, SERVICE_SELECT};
use crate::state::AppState;

const DUPLICATE_DIRECTION: &str = "Direction code or name already exists";

fn normalize_code(code: &str) -> Result<String, AppError> {
    let code = code.trim().to_uppercase();
    if code.is_empty() {
        return Err(AppError::validation("Direction code is required"));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(AppError::validation("Direction code may only contain letters, digits, '-' and '_'"));
    }
    Ok(code)
}

// GET /api/directions
pub async fn list_directions(
    State(AppState { db_pool, .. }): State<AppState>,
) -> Result<Json<Vec<DirectionSummary>>, AppError> {
    let directions = sqlx::query_as::<_, DirectionSummary>(
        r#"SELECT d.id, d.code, d.name, d.description, COUNT(s.id) AS service_count
           FROM directions d
           LEFT JOIN services s ON s.direction_id = d.id
           GROUP BY d.id
           ORDER BY d.name ASC"#,
    )
    .fetch_all(&db_pool)
    .await?;

    Ok(Json(directions))
}

// GET /api/directions/{id}
pub async fn get_direction(
    State(AppState { db_pool, .. }): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<DirectionResponse>, AppError> {
    let direction = sqlx::query_as::<_, Direction>(
        "SELECT id, code, name, description, created_at FROM directions WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&db_pool)
    .await?
    .ok_or_else(|| AppError::not_found("Direction not found"))?;

    let services = sqlx::query_as::<_, Service>(&format!(
        "{SERVICE_SELECT} WHERE s.direction_id = $1 ORDER BY s.name ASC"
    ))
    .bind(id)
    .fetch_all(&db_pool)
    .await?;

    Ok(Json(DirectionResponse {
        id: direction.id,
        code: direction.code,
        name: direction.name,
        description: direction.description,
        created_at: direction.created_at,
        services: services.into_iter().map(ServiceSummary::from).collect(),
    }))
}

// POST /api/directions
#[instrument(skip_all, fields(actor = auth.user_id))]
pub async fn create_direction(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<CreateDirectionRequest>,
) -> Result<(StatusCode, Json<DirectionSummary>), AppError> {
    auth.require_admin("create directions")?;

    let code = normalize_code(&req.code)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Direction name is required"));
    }

    let mut tx = db_pool.begin().await?;
    let direction = sqlx::query_as::<_, Direction>(
        r#"INSERT INTO directions (code, name, description)
           VALUES ($1, $2, $3)
           RETURNING id, code, name, description, created_at"#,
    )
    .bind(&code)
    .bind(name)
    .bind(clean_text(req.description.as_deref()))
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| map_unique_violation(e, DUPLICATE_DIRECTION))?;

    audit::record(
        &mut tx,
        AuditRecord::new(AuditAction::DirectionCreated)
            .by(&auth)
            .target(TargetType::Direction, direction.id)
            .details(format!("{} ({})", direction.name, direction.code))
            .ip(client_ip(&headers)),
    )
    .await?;
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(DirectionSummary {
            id: direction.id,
            code: direction.code,
            name: direction.name,
            description: direction.description,
            service_count: 0,
        }),
    ))
}

// PUT /api/directions/{id}
#[instrument(skip_all, fields(actor = auth.user_id, id))]
pub async fn update_direction(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<UpdateDirectionRequest>,
) -> Result<Json<DirectionSummary>, AppError> {
    auth.require_admin("update directions")?;

    let mut tx = db_pool.begin().await?;
    let existing = sqlx::query_as::<_, Direction>(
        "SELECT id, code, name, description, created_at FROM directions WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::not_found("Direction not found"))?;

    let mut changed = Vec::new();
    let code = match &req.code {
        Some(c) => normalize_code(c)?,
        None => existing.code.clone(),
    };
    if code != existing.code {
        changed.push("code");
    }
    let name = match req.name.as_deref().map(str::trim) {
        Some("") => return Err(AppError::validation("Direction name cannot be empty")),
        Some(n) => n.to_string(),
        None => existing.name.clone(),
    };
    if name != existing.name {
        changed.push("name");
    }
    let description = patch_text(req.description.as_deref()).unwrap_or_else(|| existing.description.clone());
    if description != existing.description {
        changed.push("description");
    }

    let direction = sqlx::query_as::<_, DirectionSummary>(
        r#"UPDATE directions SET code = $2, name = $3, description = $4
           WHERE id = $1
           RETURNING id, code, name, description,
                     (SELECT COUNT(*) FROM services WHERE direction_id = $1) AS service_count"#,
    )
    .bind(id)
    .bind(&code)
    .bind(&name)
    .bind(&description)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| map_unique_violation(e, DUPLICATE_DIRECTION))?;

    if !changed.is_empty() {
        audit::record(
            &mut tx,
            AuditRecord::new(AuditAction::DirectionUpdated)
                .by(&auth)
                .target(TargetType::Direction, id)
                .details(describe_changes(changed))
                .ip(client_ip(&headers)),
        )
        .await?;
    }
    tx.commit().await?;

    Ok(Json(direction))
}

/// A service inserted between the existence check and the delete surfaces as
/// a foreign-key violation.
fn direction_delete_error(code: &str, _constraint: Option<&str>) -> Option<AppError> {
    (code == "23503").then(|| AppError::conflict(DIRECTION_IN_USE))
}

const DIRECTION_IN_USE: &str = "Cannot delete a direction that still has services";

// DELETE /api/directions/{id}
#[instrument(skip_all, fields(actor = auth.user_id, id))]
pub async fn delete_direction(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    auth.require_admin("delete directions")?;

    let mut tx = db_pool.begin().await?;
    let has_services = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM services WHERE direction_id = $1)",
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    if has_services {
        return Err(AppError::conflict(DIRECTION_IN_USE));
    }

    let name = sqlx::query_scalar::<_, String>("DELETE FROM directions WHERE id = $1 RETURNING name")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_db_error(e, direction_delete_error))?
        .ok_or_else(|| AppError::not_found("Direction not found"))?;

    audit::record(
        &mut tx,
        AuditRecord::new(AuditAction::DirectionDeleted)
            .by(&auth)
            .target(TargetType::Direction, id)
            .details(name)
            .ip(client_ip(&headers)),
    )
    .await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_uppercased_and_checked() {
        assert_eq!(normalize_code(" dsi ").unwrap(), "DSI");
        assert_eq!(normalize_code("dg-adj").unwrap(), "DG-ADJ");
        assert!(normalize_code("   ").is_err());
        assert!(normalize_code("D S I").is_err());
    }

    #[test]
    fn delete_blocked_by_services_is_a_conflict() {
        let err = direction_delete_error("23503", Some("services_direction_id_fkey")).unwrap();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert!(matches!(err, AppError::Conflict(msg) if msg == DIRECTION_IN_USE));
        assert!(direction_delete_error("23505", None).is_none());
    }
}
