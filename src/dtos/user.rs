use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::models::user::User;
use crate::pagination::PageParams;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub direction_id: Option<i64>,
}

/// Profile update; absent fields are kept, blank optional fields are cleared.
#[derive(Deserialize, Default)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub direction_id: Option<i64>,
    #[serde(default)]
    pub clear_direction: bool,
    pub password: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct UserStatusRequest {
    pub is_active: Option<bool>,
    pub role: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct UserListQuery {
    pub search: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl UserListQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams { page: self.page, per_page: self.per_page }
    }
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub direction_id: Option<i64>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        UserResponse {
            id: u.id,
            username: u.username,
            email: u.email,
            role: u.role,
            first_name: u.first_name,
            last_name: u.last_name,
            phone: u.phone,
            position: u.position,
            direction_id: u.direction_id,
            is_active: u.is_active,
            last_login_at: u.last_login_at,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}
