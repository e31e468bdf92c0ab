use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::{info, instrument};
use crate::audit::{self, describe_changes, AuditRecord};
use crate::auth::password::{hash_password, validate_password};
use crate::dtos::user::{CreateUserRequest, UpdateUserRequest, UserListQuery, UserResponse, UserStatusRequest};
use crate::dtos::{clean_text, contains_pattern, is_valid_email, patch_text, LIKE_ESCAPE};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::error::{map_db_error, AppError};
use crate::handlers::client_ip;
use crate::handlers::notification::notify;
use crate::middleware::auth::AuthContext;
use crate::models::audit_log::{AuditAction, TargetType};
use crate::models::user::{Role, User, USER_COLUMNS};
use crate::models::user_change::{FieldChange, UserChange};
use crate::pagination::Paginated;
use crate::state::AppState;

fn user_write_error(code: &str, constraint: Option<&str>) -> Option<AppError> {
    match (code, constraint) {
        ("23505", Some("users_email_key")) => Some(AppError::conflict("Email already exists")),
        ("23505", _) => Some(AppError::conflict("Username already exists")),
        ("23503", _) => Some(AppError::validation("Invalid direction_id")),
        _ => None,
    }
}

fn map_user_write_error(err: sqlx::Error) -> AppError {
    map_db_error(err, user_write_error)
}

/// Resulting column values of a profile update plus the per-field history.
#[derive(Debug)]
pub struct UserUpdatePlan {
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub direction_id: Option<i64>,
    pub new_password: Option<String>,
    pub changes: Vec<FieldChange>,
}

pub fn plan_user_update(user: &User, req: &UpdateUserRequest) -> Result<UserUpdatePlan, AppError> {
    let mut changes = Vec::new();

    let username = match req.username.as_deref().map(str::trim) {
        Some("") => return Err(AppError::validation("Username cannot be empty")),
        Some(name) => name.to_string(),
        None => user.username.clone(),
    };
    if username != user.username {
        changes.push(FieldChange::new("username", Some(user.username.clone()), Some(username.clone())));
    }

    let email = match req.email.as_deref().map(str::trim) {
        Some(e) if !is_valid_email(e) => return Err(AppError::validation("Invalid email address")),
        Some(e) => e.to_lowercase(),
        None => user.email.clone(),
    };
    if email != user.email {
        changes.push(FieldChange::new("email", Some(user.email.clone()), Some(email.clone())));
    }

    let mut text_field = |field: &'static str, current: &Option<String>, patch: Option<&str>| {
        match patch_text(patch) {
            Some(next) if next != *current => {
                changes.push(FieldChange::new(field, current.clone(), next.clone()));
                next
            }
            _ => current.clone(),
        }
    };
    let first_name = text_field("first_name", &user.first_name, req.first_name.as_deref());
    let last_name = text_field("last_name", &user.last_name, req.last_name.as_deref());
    let phone = text_field("phone", &user.phone, req.phone.as_deref());
    let position = text_field("position", &user.position, req.position.as_deref());

    let direction_id = if req.clear_direction {
        None
    } else {
        req.direction_id.or(user.direction_id)
    };
    if direction_id != user.direction_id {
        changes.push(FieldChange::new(
            "direction_id",
            user.direction_id.map(|d| d.to_string()),
            direction_id.map(|d| d.to_string()),
        ));
    }

    let new_password = match &req.password {
        Some(p) => {
            validate_password(p)?;
            changes.push(FieldChange::masked("password"));
            Some(p.clone())
        }
        None => None,
    };

    Ok(UserUpdatePlan {
        username,
        email,
        first_name,
        last_name,
        phone,
        position,
        direction_id,
        new_password,
        changes,
    })
}

/// Validates a status/role change made by `actor_id` and returns the changed fields.
pub fn plan_status_change(
    actor_id: i64,
    user: &User,
    req: &UserStatusRequest,
) -> Result<(bool, Role, Vec<FieldChange>), AppError> {
    let current_role: Role = user.role.parse().map_err(AppError::internal)?;
    let role = match &req.role {
        Some(r) => r.parse::<Role>().map_err(AppError::validation)?,
        None => current_role,
    };
    let is_active = req.is_active.unwrap_or(user.is_active);

    if user.id == actor_id {
        if !is_active {
            return Err(AppError::validation("You cannot deactivate your own account"));
        }
        if current_role == Role::Admin && role != Role::Admin {
            return Err(AppError::validation("You cannot remove your own admin role"));
        }
    }

    let mut changes = Vec::new();
    if is_active != user.is_active {
        changes.push(FieldChange::new(
            "is_active",
            Some(user.is_active.to_string()),
            Some(is_active.to_string()),
        ));
    }
    if role != current_role {
        changes.push(FieldChange::new("role", Some(user.role.clone()), Some(role.to_string())));
    }
    Ok((is_active, role, changes))
}

async fn fetch_user(conn: &mut PgConnection, id: i64) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

fn push_user_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &UserListQuery, role: Option<Role>) {
    qb.push(" WHERE 1=1");
    if let Some(search) = clean_text(query.search.as_deref()) {
        let pattern = contains_pattern(&search);
        qb.push(" AND (LOWER(username) LIKE ")
            .push_bind(pattern.clone())
            .push(LIKE_ESCAPE)
            .push(" OR LOWER(email) LIKE ")
            .push_bind(pattern.clone())
            .push(LIKE_ESCAPE)
            .push(" OR LOWER(COALESCE(first_name, '') || ' ' || COALESCE(last_name, '')) LIKE ")
            .push_bind(pattern)
            .push(LIKE_ESCAPE)
            .push(")");
    }
    if let Some(role) = role {
        qb.push(" AND role = ").push_bind(role.as_str());
    }
    if let Some(active) = query.is_active {
        qb.push(" AND is_active = ").push_bind(active);
    }
}

// GET /api/users
#[instrument(skip_all)]
pub async fn list_users(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> Result<Json<Paginated<UserResponse>>, AppError> {
    auth.require_admin("list users")?;

    let role = query
        .role
        .as_deref()
        .map(str::parse::<Role>)
        .transpose()
        .map_err(AppError::validation)?;
    let page = query.page_params();

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
    push_user_filters(&mut count, &query, role);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(&db_pool).await?;

    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
    push_user_filters(&mut qb, &query, role);
    qb.push(" ORDER BY username ASC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let users = qb.build_query_as::<User>().fetch_all(&db_pool).await?;

    Ok(Json(Paginated::new(
        users.into_iter().map(UserResponse::from).collect(),
        total,
        &page,
    )))
}

// POST /api/users
#[instrument(skip_all, fields(actor = auth.user_id))]
pub async fn create_user(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    auth.require_admin("create users")?;

    let role: Role = req.role.parse().map_err(AppError::validation)?;
    let username = req.username.trim();
    if username.is_empty() {
        return Err(AppError::validation("Username required"));
    }
    if !is_valid_email(&req.email) {
        return Err(AppError::validation("Invalid email address"));
    }
    validate_password(&req.password)?;
    let password_hash = hash_password(&req.password)?;

    let mut tx = db_pool.begin().await?;
    let user = sqlx::query_as::<_, User>(&format!(
        r#"INSERT INTO users (username, email, password_hash, role, first_name, last_name, phone, position, direction_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {USER_COLUMNS}"#
    ))
    .bind(username)
    .bind(req.email.trim().to_lowercase())
    .bind(password_hash)
    .bind(role.as_str())
    .bind(clean_text(req.first_name.as_deref()))
    .bind(clean_text(req.last_name.as_deref()))
    .bind(clean_text(req.phone.as_deref()))
    .bind(clean_text(req.position.as_deref()))
    .bind(req.direction_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(map_user_write_error)?;

    audit::record(
        &mut tx,
        AuditRecord::new(AuditAction::UserCreated)
            .by(&auth)
            .target(TargetType::User, user.id)
            .details(format!("username: {}, role: {}", user.username, user.role))
            .ip(client_ip(&headers)),
    )
    .await?;
    tx.commit().await?;

    info!(user_id = user.id, "User created");
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

// GET /api/users/{id}
pub async fn get_user(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<UserResponse>, AppError> {
    auth.require_admin("view users")?;
    let mut conn = db_pool.acquire().await?;
    let user = fetch_user(&mut conn, id).await?;
    Ok(Json(UserResponse::from(user)))
}

// PUT /api/users/{id}
#[instrument(skip_all, fields(actor = auth.user_id, id))]
pub async fn update_user(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    auth.require_admin("update users")?;

    let mut tx = db_pool.begin().await?;
    let existing = fetch_user(&mut tx, id).await?;
    let plan = plan_user_update(&existing, &req)?;

    if plan.changes.is_empty() {
        return Ok(Json(UserResponse::from(existing)));
    }

    let password_hash = match &plan.new_password {
        Some(p) => hash_password(p)?,
        None => existing.password_hash.clone(),
    };

    let user = sqlx::query_as::<_, User>(&format!(
        r#"UPDATE users SET
            username = $2, email = $3, first_name = $4, last_name = $5,
            phone = $6, position = $7, direction_id = $8, password_hash = $9,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {USER_COLUMNS}"#
    ))
    .bind(id)
    .bind(&plan.username)
    .bind(&plan.email)
    .bind(&plan.first_name)
    .bind(&plan.last_name)
    .bind(&plan.phone)
    .bind(&plan.position)
    .bind(plan.direction_id)
    .bind(password_hash)
    .fetch_one(&mut *tx)
    .await
    .map_err(map_user_write_error)?;

    audit::record_user_changes(&mut tx, id, auth.user_id, &plan.changes).await?;
    audit::record(
        &mut tx,
        AuditRecord::new(AuditAction::UserUpdated)
            .by(&auth)
            .target(TargetType::User, id)
            .details(describe_changes(plan.changes.iter().map(|c| c.field)))
            .ip(client_ip(&headers)),
    )
    .await?;
    if plan.new_password.is_some() && id != auth.user_id {
        notify(
            &mut tx,
            id,
            "account",
            "Password reset",
            &format!("Your password was reset by {}.", auth.username),
        )
        .await?;
    }
    tx.commit().await?;

    Ok(Json(UserResponse::from(user)))
}

// PATCH /api/users/{id}
#[instrument(skip_all, fields(actor = auth.user_id, id))]
pub async fn set_user_status(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<UserStatusRequest>,
) -> Result<Json<UserResponse>, AppError> {
    auth.require_admin("change user status")?;
    if req.is_active.is_none() && req.role.is_none() {
        return Err(AppError::validation("Provide is_active and/or role"));
    }

    let mut tx = db_pool.begin().await?;
    let existing = fetch_user(&mut tx, id).await?;
    let (is_active, role, changes) = plan_status_change(auth.user_id, &existing, &req)?;

    if changes.is_empty() {
        return Ok(Json(UserResponse::from(existing)));
    }

    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET is_active = $2, role = $3, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(is_active)
    .bind(role.as_str())
    .fetch_one(&mut *tx)
    .await?;

    audit::record_user_changes(&mut tx, id, auth.user_id, &changes).await?;
    let ip = client_ip(&headers);
    for change in &changes {
        let (action, title, message) = match change.field {
            "is_active" if is_active => (
                AuditAction::UserActivated,
                "Account activated",
                "Your account has been activated.".to_string(),
            ),
            "is_active" => (
                AuditAction::UserDeactivated,
                "Account deactivated",
                "Your account has been deactivated.".to_string(),
            ),
            _ => (
                AuditAction::UserRoleChanged,
                "Role changed",
                format!("Your role is now {role}."),
            ),
        };
        audit::record(
            &mut tx,
            AuditRecord::new(action)
                .by(&auth)
                .target(TargetType::User, id)
                .details(format!(
                    "{}: {} -> {}",
                    change.field,
                    change.old_value.as_deref().unwrap_or(""),
                    change.new_value.as_deref().unwrap_or("")
                ))
                .ip(ip.clone()),
        )
        .await?;
        notify(&mut tx, id, "account", title, &message).await?;
    }
    tx.commit().await?;

    info!(user_id = id, "User status updated");
    Ok(Json(UserResponse::from(user)))
}

// DELETE /api/users/{id}
#[instrument(skip_all, fields(actor = auth.user_id, id))]
pub async fn delete_user(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    auth.require_admin("delete users")?;
    if id == auth.user_id {
        return Err(AppError::validation("You cannot delete your own account"));
    }

    let mut tx = db_pool.begin().await?;
    let username = sqlx::query_scalar::<_, String>("DELETE FROM users WHERE id = $1 RETURNING username")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    audit::record(
        &mut tx,
        AuditRecord::new(AuditAction::UserDeleted)
            .by(&auth)
            .target(TargetType::User, id)
            .details(format!("username: {username}"))
            .ip(client_ip(&headers)),
    )
    .await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

// GET /api/users/{id}/history
pub async fn get_user_history(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Vec<UserChange>>, AppError> {
    auth.require_admin("view user history")?;

    let mut conn = db_pool.acquire().await?;
    fetch_user(&mut conn, id).await?;

    let history = sqlx::query_as::<_, UserChange>(
        r#"SELECT h.id, h.user_id, h.changed_by, u.username AS changed_by_username,
                  h.field, h.old_value, h.new_value, h.changed_at
           FROM user_change_history h
           LEFT JOIN users u ON u.id = h.changed_by
           WHERE h.user_id = $1
           ORDER BY h.changed_at DESC, h.id DESC"#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Json(history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn user(id: i64, role: &str) -> User {
        User {
            id,
            username: "jdoe".into(),
            email: "jdoe@cagpu.org".into(),
            password_hash: "hash".into(),
            role: role.into(),
            first_name: Some("Jane".into()),
            last_name: Some("Doe".into()),
            phone: None,
            position: Some("Analyst".into()),
            direction_id: Some(3),
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn empty_update_changes_nothing() {
        let plan = plan_user_update(&user(1, "user"), &UpdateUserRequest::default()).unwrap();
        assert!(plan.changes.is_empty());
        assert_eq!(plan.username, "jdoe");
        assert_eq!(plan.direction_id, Some(3));
    }

    #[test]
    fn update_records_each_changed_field() {
        let req = UpdateUserRequest {
            email: Some("  JDoe@CAGPU.org ".into()),
            first_name: Some("Janet".into()),
            position: Some("".into()),
            phone: Some("  ".into()),
            direction_id: Some(5),
            ..Default::default()
        };
        let plan = plan_user_update(&user(1, "user"), &req).unwrap();
        let fields: Vec<&str> = plan.changes.iter().map(|c| c.field).collect();
        // email only differs by case/whitespace; phone was already empty
        assert_eq!(fields, vec!["first_name", "position", "direction_id"]);
        assert_eq!(plan.position, None);
        assert_eq!(plan.email, "jdoe@cagpu.org");
        assert_eq!(
            plan.changes[2],
            FieldChange::new("direction_id", Some("3".into()), Some("5".into()))
        );
    }

    #[test]
    fn password_reset_is_masked() {
        let req = UpdateUserRequest { password: Some("n3w-password".into()), ..Default::default() };
        let plan = plan_user_update(&user(1, "user"), &req).unwrap();
        assert_eq!(plan.changes, vec![FieldChange::masked("password")]);
        assert_eq!(plan.new_password.as_deref(), Some("n3w-password"));

        let weak = UpdateUserRequest { password: Some("123".into()), ..Default::default() };
        assert_matches!(plan_user_update(&user(1, "user"), &weak), Err(AppError::ValidationError(_)));
    }

    #[test]
    fn invalid_profile_values_are_rejected() {
        let blank = UpdateUserRequest { username: Some("  ".into()), ..Default::default() };
        assert_matches!(plan_user_update(&user(1, "user"), &blank), Err(AppError::ValidationError(_)));
        let bad_email = UpdateUserRequest { email: Some("nope".into()), ..Default::default() };
        assert_matches!(plan_user_update(&user(1, "user"), &bad_email), Err(AppError::ValidationError(_)));
    }

    #[test]
    fn clear_direction_wins_over_direction_id() {
        let req = UpdateUserRequest { direction_id: Some(9), clear_direction: true, ..Default::default() };
        let plan = plan_user_update(&user(1, "user"), &req).unwrap();
        assert_eq!(plan.direction_id, None);
    }

    #[test]
    fn admin_cannot_deactivate_self() {
        let req = UserStatusRequest { is_active: Some(false), role: None };
        assert_matches!(
            plan_status_change(1, &user(1, "admin"), &req),
            Err(AppError::ValidationError(_))
        );
    }

    #[test]
    fn admin_cannot_demote_self() {
        let req = UserStatusRequest { is_active: None, role: Some("user".into()) };
        assert_matches!(
            plan_status_change(1, &user(1, "admin"), &req),
            Err(AppError::ValidationError(_))
        );
    }

    #[test]
    fn status_change_on_other_user() {
        let req = UserStatusRequest { is_active: Some(false), role: Some("service_user".into()) };
        let (active, role, changes) = plan_status_change(1, &user(2, "user"), &req).unwrap();
        assert!(!active);
        assert_eq!(role, Role::ServiceUser);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].field, "is_active");
        assert_eq!(changes[1].new_value.as_deref(), Some("service_user"));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let req = UserStatusRequest { is_active: None, role: Some("superuser".into()) };
        assert_matches!(
            plan_status_change(1, &user(2, "user"), &req),
            Err(AppError::ValidationError(_))
        );
    }

    #[test]
    fn duplicate_username_and_email_are_conflicts() {
        assert_matches!(
            user_write_error("23505", Some("users_email_key")),
            Some(AppError::Conflict(msg)) if msg == "Email already exists"
        );
        assert_matches!(
            user_write_error("23505", Some("users_username_key")),
            Some(AppError::Conflict(msg)) if msg == "Username already exists"
        );
    }

    #[test]
    fn unknown_direction_is_a_validation_error() {
        let err = user_write_error("23503", Some("users_direction_id_fkey")).unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(user_write_error("40001", None).is_none());
    }

    #[test]
    fn search_filter_matches_wildcards_literally() {
        let query = UserListQuery {
            search: Some("J_Doe".into()),
            role: None,
            is_active: Some(true),
            page: None,
            per_page: None,
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_user_filters(&mut qb, &query, Some(Role::Admin));
        let sql = qb.sql();
        assert_eq!(sql.matches(r"LIKE $").count(), 3);
        assert_eq!(sql.matches(r" ESCAPE '\'").count(), 3);
        assert!(sql.contains("AND role = $4 AND is_active = $5"));
    }
}
