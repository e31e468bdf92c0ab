use std::fmt;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: String,
    pub actor_id: Option<i64>,
    pub actor_username: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<i64>,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Actions written to `audit_log.action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Login,
    LoginFailed,
    Logout,
    PasswordChanged,
    UserCreated,
    UserUpdated,
    UserActivated,
    UserDeactivated,
    UserRoleChanged,
    UserDeleted,
    DirectionCreated,
    DirectionUpdated,
    DirectionDeleted,
    ServiceCreated,
    ServiceUpdated,
    ServiceDeleted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "login",
            AuditAction::LoginFailed => "login_failed",
            AuditAction::Logout => "logout",
            AuditAction::PasswordChanged => "password_changed",
            AuditAction::UserCreated => "user_created",
            AuditAction::UserUpdated => "user_updated",
            AuditAction::UserActivated => "user_activated",
            AuditAction::UserDeactivated => "user_deactivated",
            AuditAction::UserRoleChanged => "user_role_changed",
            AuditAction::UserDeleted => "user_deleted",
            AuditAction::DirectionCreated => "direction_created",
            AuditAction::DirectionUpdated => "direction_updated",
            AuditAction::DirectionDeleted => "direction_deleted",
            AuditAction::ServiceCreated => "service_created",
            AuditAction::ServiceUpdated => "service_updated",
            AuditAction::ServiceDeleted => "service_deleted",
        }
    }

    /// Session events are not administrative mutations.
    pub fn is_admin_mutation(action: &str) -> bool {
        !matches!(action, "login" | "login_failed" | "logout" | "password_changed")
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    User,
    Direction,
    Service,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::User => "user",
            TargetType::Direction => "direction",
            TargetType::Service => "service",
        }
    }
}
