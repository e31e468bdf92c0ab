use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::models::service::Service;
use crate::pagination::PageParams;

#[derive(Deserialize)]
pub struct CreateServiceRequest {
    pub direction_id: i64,
    pub name: String,
    pub service_type: String,
    pub responsible_person: Option<String>,
    pub phone_extension: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// Partial update; blank optional fields are cleared.
#[derive(Deserialize, Default)]
pub struct UpdateServiceRequest {
    pub direction_id: Option<i64>,
    pub name: Option<String>,
    pub service_type: Option<String>,
    pub responsible_person: Option<String>,
    pub phone_extension: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Deserialize, Default)]
pub struct ServiceListQuery {
    pub direction_id: Option<i64>,
    pub service_type: Option<String>,
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ServiceListQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams { page: self.page, per_page: self.per_page }
    }
}

#[derive(Serialize)]
pub struct ServiceResponse {
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

#[derive(Serialize)]
pub struct ServiceSummary {
    pub id: i64,
    pub name: String,
    pub service_type: String,
    pub responsible_person: Option<String>,
    pub phone_extension: Option<String>,
    pub location: Option<String>,
    pub is_active: bool,
}

impl From<Service> for ServiceResponse {
    fn from(s: Service) -> Self {
        ServiceResponse {
            id: s.id,
            direction_id: s.direction_id,
            direction_name: s.direction_name,
            name: s.name,
            service_type: s.service_type,
            responsible_person: s.responsible_person,
            phone_extension: s.phone_extension,
            location: s.location,
            email: s.email,
            description: s.description,
            is_active: s.is_active,
            created_by: s.created_by,
            updated_by: s.updated_by,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

impl From<Service> for ServiceSummary {
    fn from(s: Service) -> Self {
        ServiceSummary {
            id: s.id,
            name: s.name,
            service_type: s.service_type,
            responsible_person: s.responsible_person,
            phone_extension: s.phone_extension,
            location: s.location,
            is_active: s.is_active,
        }
    }
}
