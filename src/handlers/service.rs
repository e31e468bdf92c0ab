use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::{info, instrument};
use crate::audit::{self, describe_changes, AuditRecord};
use crate::dtos::service::{CreateServiceRequest, ServiceListQuery, ServiceResponse, UpdateServiceRequest};
use crate::dtos::{clean_text, contains_pattern, is_valid_email, patch_text, LIKE_ESCAPE};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::error::{map_db_error, AppError};
use crate::handlers::client_ip;
use crate::middleware::auth::AuthContext;
use crate::models::audit_log::{AuditAction, TargetType};
use crate::models::service::{Service, SERVICE_SELECT};
use crate::pagination::Paginated;
use crate::state::AppState;

const MAX_NAME_LEN: usize = 200;
const MAX_EXTENSION_LEN: usize = 10;

/// Column values written for a service on create or update.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceFields {
    pub direction_id: i64,
    pub name: String,
    pub service_type: String,
    pub responsible_person: Option<String>,
    pub phone_extension: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
}

impl ServiceFields {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.is_empty() {
            return Err(AppError::validation("Service name is required"));
        }
        if self.name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::validation(format!(
                "Service name cannot exceed {MAX_NAME_LEN} characters"
            )));
        }
        if self.service_type.is_empty() {
            return Err(AppError::validation("Service type is required"));
        }
        if let Some(ext) = &self.phone_extension {
            if ext.len() > MAX_EXTENSION_LEN || !ext.chars().all(|c| c.is_ascii_digit()) {
                return Err(AppError::validation(format!(
                    "Phone extension must be 1 to {MAX_EXTENSION_LEN} digits"
                )));
            }
        }
        if let Some(email) = &self.email {
            if !is_valid_email(email) {
                return Err(AppError::validation("Invalid email address"));
            }
        }
        Ok(())
    }
}

impl From<&CreateServiceRequest> for ServiceFields {
    fn from(req: &CreateServiceRequest) -> Self {
        ServiceFields {
            direction_id: req.direction_id,
            name: req.name.trim().to_string(),
            service_type: req.service_type.trim().to_lowercase(),
            responsible_person: clean_text(req.responsible_person.as_deref()),
            phone_extension: clean_text(req.phone_extension.as_deref()),
            location: clean_text(req.location.as_deref()),
            email: clean_text(req.email.as_deref()).map(|e| e.to_lowercase()),
            description: clean_text(req.description.as_deref()),
            is_active: req.is_active.unwrap_or(true),
        }
    }
}

/// Applies a partial update over the stored service, returning the merged
/// values and the names of the fields that changed.
pub fn plan_service_update(
    existing: &Service,
    req: &UpdateServiceRequest,
) -> Result<(ServiceFields, Vec<&'static str>), AppError> {
    let current = ServiceFields {
        direction_id: existing.direction_id,
        name: existing.name.clone(),
        service_type: existing.service_type.clone(),
        responsible_person: existing.responsible_person.clone(),
        phone_extension: existing.phone_extension.clone(),
        location: existing.location.clone(),
        email: existing.email.clone(),
        description: existing.description.clone(),
        is_active: existing.is_active,
    };

    let next = ServiceFields {
        direction_id: req.direction_id.unwrap_or(current.direction_id),
        name: req.name.as_deref().map(|n| n.trim().to_string()).unwrap_or_else(|| current.name.clone()),
        service_type: req
            .service_type
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .unwrap_or_else(|| current.service_type.clone()),
        responsible_person: patch_text(req.responsible_person.as_deref())
            .unwrap_or_else(|| current.responsible_person.clone()),
        phone_extension: patch_text(req.phone_extension.as_deref())
            .unwrap_or_else(|| current.phone_extension.clone()),
        location: patch_text(req.location.as_deref()).unwrap_or_else(|| current.location.clone()),
        email: patch_text(req.email.as_deref())
            .map(|e| e.map(|e| e.to_lowercase()))
            .unwrap_or_else(|| current.email.clone()),
        description: patch_text(req.description.as_deref()).unwrap_or_else(|| current.description.clone()),
        is_active: req.is_active.unwrap_or(current.is_active),
    };
    next.validate()?;

    let mut changed = Vec::new();
    if next.direction_id != current.direction_id { changed.push("direction_id"); }
    if next.name != current.name { changed.push("name"); }
    if next.service_type != current.service_type { changed.push("service_type"); }
    if next.responsible_person != current.responsible_person { changed.push("responsible_person"); }
    if next.phone_extension != current.phone_extension { changed.push("phone_extension"); }
    if next.location != current.location { changed.push("location"); }
    if next.email != current.email { changed.push("email"); }
    if next.description != current.description { changed.push("description"); }
    if next.is_active != current.is_active { changed.push("is_active"); }

    Ok((next, changed))
}

fn service_write_error(code: &str, _constraint: Option<&str>) -> Option<AppError> {
    match code {
        "23505" => Some(AppError::conflict("A service with this name already exists in the direction")),
        "23503" => Some(AppError::validation("Direction does not exist")),
        _ => None,
    }
}

fn map_service_write_error(err: sqlx::Error) -> AppError {
    map_db_error(err, service_write_error)
}

async fn fetch_service(conn: &mut PgConnection, id: i64) -> Result<Service, AppError> {
    sqlx::query_as::<_, Service>(&format!("{SERVICE_SELECT} WHERE s.id = $1"))
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Service not found"))
}

fn push_service_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ServiceListQuery) {
    qb.push(" WHERE 1=1");
    if let Some(direction_id) = query.direction_id {
        qb.push(" AND s.direction_id = ").push_bind(direction_id);
    }
    if let Some(service_type) = clean_text(query.service_type.as_deref()) {
        qb.push(" AND s.service_type = ").push_bind(service_type.to_lowercase());
    }
    if let Some(active) = query.is_active {
        qb.push(" AND s.is_active = ").push_bind(active);
    }
    if let Some(search) = clean_text(query.search.as_deref()) {
        let pattern = contains_pattern(&search);
        qb.push(" AND (LOWER(s.name) LIKE ")
            .push_bind(pattern.clone())
            .push(LIKE_ESCAPE)
            .push(" OR LOWER(COALESCE(s.responsible_person, '')) LIKE ")
            .push_bind(pattern.clone())
            .push(LIKE_ESCAPE)
            .push(" OR LOWER(COALESCE(s.location, '')) LIKE ")
            .push_bind(pattern)
            .push(LIKE_ESCAPE)
            .push(")");
    }
}

// GET /api/services
#[instrument(skip_all)]
pub async fn list_services(
    State(AppState { db_pool, .. }): State<AppState>,
    ApiQuery(query): ApiQuery<ServiceListQuery>,
) -> Result<Json<Paginated<ServiceResponse>>, AppError> {
    let page = query.page_params();

    let mut count = QueryBuilder::<Postgres>::new(
        "SELECT COUNT(*) FROM services s JOIN directions d ON d.id = s.direction_id",
    );
    push_service_filters(&mut count, &query);
    let total = count.build_query_scalar::<i64>().fetch_one(&db_pool).await?;

    let mut qb = QueryBuilder::<Postgres>::new(SERVICE_SELECT);
    push_service_filters(&mut qb, &query);
    qb.push(" ORDER BY d.name ASC, s.name ASC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let services = qb.build_query_as::<Service>().fetch_all(&db_pool).await?;

    Ok(Json(Paginated::new(
        services.into_iter().map(ServiceResponse::from).collect(),
        total,
        &page,
    )))
}

// GET /api/services/{id}
pub async fn get_service(
    State(AppState { db_pool, .. }): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ServiceResponse>, AppError> {
    let mut conn = db_pool.acquire().await?;
    let service = fetch_service(&mut conn, id).await?;
    Ok(Json(ServiceResponse::from(service)))
}

// POST /api/services
#[instrument(skip_all, fields(actor = auth.user_id))]
pub async fn create_service(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<CreateServiceRequest>,
) -> Result<(StatusCode, Json<ServiceResponse>), AppError> {
    auth.require_service_editor("create services")?;

    let fields = ServiceFields::from(&req);
    fields.validate()?;

    let mut tx = db_pool.begin().await?;
    let id = sqlx::query_scalar::<_, i64>(
        r#"INSERT INTO services (direction_id, name, service_type, responsible_person, phone_extension,
                                 location, email, description, is_active, created_by, updated_by)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
           RETURNING id"#,
    )
    .bind(fields.direction_id)
    .bind(&fields.name)
    .bind(&fields.service_type)
    .bind(&fields.responsible_person)
    .bind(&fields.phone_extension)
    .bind(&fields.location)
    .bind(&fields.email)
    .bind(&fields.description)
    .bind(fields.is_active)
    .bind(auth.user_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(map_service_write_error)?;

    let service = fetch_service(&mut tx, id).await?;
    audit::record(
        &mut tx,
        AuditRecord::new(AuditAction::ServiceCreated)
            .by(&auth)
            .target(TargetType::Service, id)
            .details(format!("{} ({})", service.name, service.direction_name))
            .ip(client_ip(&headers)),
    )
    .await?;
    tx.commit().await?;

    info!(service_id = id, "Service created");
    Ok((StatusCode::CREATED, Json(ServiceResponse::from(service))))
}

// PUT /api/services/{id}
#[instrument(skip_all, fields(actor = auth.user_id, id))]
pub async fn update_service(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<UpdateServiceRequest>,
) -> Result<Json<ServiceResponse>, AppError> {
    auth.require_service_editor("update services")?;

    let mut tx = db_pool.begin().await?;
    let existing = fetch_service(&mut tx, id).await?;
    let (fields, changed) = plan_service_update(&existing, &req)?;

    if changed.is_empty() {
        return Ok(Json(ServiceResponse::from(existing)));
    }

    sqlx::query(
        r#"UPDATE services SET
            direction_id = $2, name = $3, service_type = $4, responsible_person = $5,
            phone_extension = $6, location = $7, email = $8, description = $9,
            is_active = $10, updated_by = $11, updated_at = NOW()
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(fields.direction_id)
    .bind(&fields.name)
    .bind(&fields.service_type)
    .bind(&fields.responsible_person)
    .bind(&fields.phone_extension)
    .bind(&fields.location)
    .bind(&fields.email)
    .bind(&fields.description)
    .bind(fields.is_active)
    .bind(auth.user_id)
    .execute(&mut *tx)
    .await
    .map_err(map_service_write_error)?;

    let service = fetch_service(&mut tx, id).await?;
    audit::record(
        &mut tx,
        AuditRecord::new(AuditAction::ServiceUpdated)
            .by(&auth)
            .target(TargetType::Service, id)
            .details(describe_changes(changed))
            .ip(client_ip(&headers)),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(ServiceResponse::from(service)))
}

// DELETE /api/services/{id}
#[instrument(skip_all, fields(actor = auth.user_id, id))]
pub async fn delete_service(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    auth.require_admin("delete services")?;

    let mut tx = db_pool.begin().await?;
    let name = sqlx::query_scalar::<_, String>("DELETE FROM services WHERE id = $1 RETURNING name")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Service not found"))?;

    audit::record(
        &mut tx,
        AuditRecord::new(AuditAction::ServiceDeleted)
            .by(&auth)
            .target(TargetType::Service, id)
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
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn service() -> Service {
        Service {
            id: 4,
            direction_id: 2,
            direction_name: "Direction Technique".into(),
            name: "Maintenance".into(),
            service_type: "technical".into(),
            responsible_person: Some("M. Diallo".into()),
            phone_extension: Some("214".into()),
            location: Some("Bâtiment B".into()),
            email: None,
            description: None,
            is_active: true,
            created_by: Some(1),
            updated_by: Some(1),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn create_request() -> CreateServiceRequest {
        CreateServiceRequest {
            direction_id: 1,
            name: "  Accueil ".into(),
            service_type: " Support ".into(),
            responsible_person: Some("".into()),
            phone_extension: Some("100".into()),
            location: None,
            email: Some("Accueil@CAGPU.org".into()),
            description: None,
            is_active: None,
        }
    }

    #[test]
    fn create_request_is_normalized() {
        let fields = ServiceFields::from(&create_request());
        assert_eq!(fields.name, "Accueil");
        assert_eq!(fields.service_type, "support");
        assert_eq!(fields.responsible_person, None);
        assert_eq!(fields.email.as_deref(), Some("accueil@cagpu.org"));
        assert!(fields.is_active);
        assert!(fields.validate().is_ok());
    }

    #[test]
    fn invalid_extension_is_rejected() {
        let mut req = create_request();
        req.phone_extension = Some("12a".into());
        assert_matches!(ServiceFields::from(&req).validate(), Err(AppError::ValidationError(_)));
        req.phone_extension = Some("12345678901".into());
        assert_matches!(ServiceFields::from(&req).validate(), Err(AppError::ValidationError(_)));
    }

    #[test]
    fn blank_name_is_rejected() {
        let mut req = create_request();
        req.name = "   ".into();
        assert_matches!(ServiceFields::from(&req).validate(), Err(AppError::ValidationError(_)));
    }

    #[test]
    fn update_reports_changed_fields_only() {
        let req = UpdateServiceRequest {
            location: Some("Bâtiment C".into()),
            phone_extension: Some("".into()),
            responsible_person: Some("M. Diallo".into()),
            ..Default::default()
        };
        let (fields, changed) = plan_service_update(&service(), &req).unwrap();
        assert_eq!(changed, vec!["phone_extension", "location"]);
        assert_eq!(fields.phone_extension, None);
        assert_eq!(fields.location.as_deref(), Some("Bâtiment C"));
        assert_eq!(fields.name, "Maintenance");
    }

    #[test]
    fn empty_update_is_a_no_op() {
        let (_, changed) = plan_service_update(&service(), &UpdateServiceRequest::default()).unwrap();
        assert!(changed.is_empty());
    }

    #[test]
    fn update_cannot_blank_the_name() {
        let req = UpdateServiceRequest { name: Some(" ".into()), ..Default::default() };
        assert_matches!(plan_service_update(&service(), &req), Err(AppError::ValidationError(_)));
    }

    #[test]
    fn write_errors_map_to_client_statuses() {
        assert_matches!(
            service_write_error("23505", Some("services_direction_name_key")),
            Some(AppError::Conflict(_))
        );
        assert_matches!(
            service_write_error("23503", Some("services_direction_id_fkey")),
            Some(AppError::ValidationError(msg)) if msg == "Direction does not exist"
        );
        assert!(service_write_error("57014", None).is_none());
    }

    #[test]
    fn search_filter_escapes_every_like() {
        let query = ServiceListQuery {
            direction_id: Some(2),
            service_type: None,
            search: Some("50%".into()),
            is_active: None,
            page: None,
            per_page: None,
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM services s");
        push_service_filters(&mut qb, &query);
        assert_eq!(qb.sql().matches(r" ESCAPE '\'").count(), 3);
    }
}
