use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserChange {
    pub id: i64,
    pub user_id: i64,
    pub changed_by: Option<i64>,
    pub changed_by_username: Option<String>,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// One changed column, before it is written to `user_change_history`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl FieldChange {
    pub fn new(field: &'static str, old_value: Option<String>, new_value: Option<String>) -> Self {
        Self { field, old_value, new_value }
    }

    /// Secrets are recorded as a change without their values.
    pub fn masked(field: &'static str) -> Self {
        Self { field, old_value: None, new_value: None }
    }
}
