//! Insert-on-write recording for the audit log and user change history.

use sqlx::PgConnection;
use crate::middleware::auth::AuthContext;
use crate::models::audit_log::{AuditAction, TargetType};
use crate::models::user_change::FieldChange;

/// Longest actor name stored; failed logins record whatever was typed.
pub const MAX_ACTOR_USERNAME_CHARS: usize = 150;

#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub action: AuditAction,
    pub actor_id: Option<i64>,
    pub actor_username: Option<String>,
    pub target_type: Option<TargetType>,
    pub target_id: Option<i64>,
    pub details: Option<String>,
    pub ip_address: Option<String>,
}

impl AuditRecord {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            actor_id: None,
            actor_username: None,
            target_type: None,
            target_id: None,
            details: None,
            ip_address: None,
        }
    }

    pub fn by(mut self, auth: &AuthContext) -> Self {
        self.actor_id = Some(auth.user_id);
        self.actor_username = Some(auth.username.clone());
        self
    }

    pub fn actor(mut self, actor_id: Option<i64>, username: &str) -> Self {
        self.actor_id = actor_id;
        self.actor_username = Some(clip_chars(username, MAX_ACTOR_USERNAME_CHARS).to_string());
        self
    }

    pub fn target(mut self, target_type: TargetType, target_id: i64) -> Self {
        self.target_type = Some(target_type);
        self.target_id = Some(target_id);
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn ip(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }
}

fn clip_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

pub async fn record(conn: &mut PgConnection, entry: AuditRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO audit_log (action, actor_id, actor_username, target_type, target_id, details, ip_address)
        VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
    )
    .bind(entry.action.as_str())
    .bind(entry.actor_id)
    .bind(entry.actor_username)
    .bind(entry.target_type.map(|t| t.as_str()))
    .bind(entry.target_id)
    .bind(entry.details)
    .bind(entry.ip_address)
    .execute(conn)
    .await?;

    tracing::debug!(action = %entry.action, "Audit entry recorded");
    Ok(())
}

pub async fn record_user_changes(
    conn: &mut PgConnection,
    user_id: i64,
    changed_by: i64,
    changes: &[FieldChange],
) -> Result<(), sqlx::Error> {
    for change in changes {
        sqlx::query(
            r#"INSERT INTO user_change_history (user_id, changed_by, field, old_value, new_value)
            VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(user_id)
        .bind(changed_by)
        .bind(change.field)
        .bind(&change.old_value)
        .bind(&change.new_value)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// "changed: a, b" summary used as audit details.
pub fn describe_changes<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let fields: Vec<&str> = fields.into_iter().collect();
    if fields.is_empty() {
        "no changes".to_string()
    } else {
        format!("changed: {}", fields.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;

    #[test]
    fn builder_fills_actor_and_target() {
        let auth = AuthContext { user_id: 7, role: Role::Admin, username: "root".into() };
        let entry = AuditRecord::new(AuditAction::ServiceDeleted)
            .by(&auth)
            .target(TargetType::Service, 12)
            .details("Accueil");
        assert_eq!(entry.actor_id, Some(7));
        assert_eq!(entry.actor_username.as_deref(), Some("root"));
        assert_eq!(entry.target_type, Some(TargetType::Service));
        assert_eq!(entry.target_id, Some(12));
        assert_eq!(entry.details.as_deref(), Some("Accueil"));
    }

    #[test]
    fn change_summary() {
        assert_eq!(describe_changes(["name", "location"]), "changed: name, location");
        assert_eq!(describe_changes(Vec::<&str>::new()), "no changes");
    }

    #[test]
    fn long_attempted_usernames_are_clipped() {
        let typed = "é".repeat(400);
        let entry = AuditRecord::new(AuditAction::LoginFailed).actor(None, &typed);
        let stored = entry.actor_username.unwrap();
        assert_eq!(stored.chars().count(), MAX_ACTOR_USERNAME_CHARS);
        assert!(typed.starts_with(&stored));

        let entry = AuditRecord::new(AuditAction::LoginFailed).actor(None, "jdoe");
        assert_eq!(entry.actor_username.as_deref(), Some("jdoe"));
    }
}
