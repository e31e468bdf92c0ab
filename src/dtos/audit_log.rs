use chrono::{DateTime, Utc};
use serde::Deserialize;
use crate::pagination::PageParams;

#[derive(Deserialize, Default)]
pub struct AuditLogQuery {
    pub action: Option<String>,
    pub actor_id: Option<i64>,
    pub target_type: Option<String>,
    pub target_id: Option<i64>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl AuditLogQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams { page: self.page, per_page: self.per_page }
    }
}
