use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct Service {
    pub id: i64,
    pub direction_id: i64,
    pub direction_name: String,
    pub name: String,
    pub service_type: String,
    pub responsible_person: Option<String>,
    pub phone_extension: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Select list for `Service`; expects `services s JOIN directions d`.
pub const SERVICE_SELECT: &str = "SELECT s.id, s.direction_id, d.name AS direction_name, s.name, \
    s.service_type, s.responsible_person, s.phone_extension, s.location, s.email, s.description, \
    s.is_active, s.created_by, s.updated_by, s.created_at, s.updated_at \
    FROM services s JOIN directions d ON d.id = s.direction_id";
