use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::dtos::service::ServiceSummary;

#[derive(Deserialize)]
pub struct CreateDirectionRequest {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct UpdateDirectionRequest {
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Serialize, sqlx::FromRow)]
pub struct DirectionSummary {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub service_count: i64,
}

#[derive(Serialize)]
pub struct DirectionResponse {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub services: Vec<ServiceSummary>,
}
