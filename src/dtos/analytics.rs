use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Default)]
pub struct SecurityMetricsQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DirectionCount {
    pub direction_id: i64,
    pub direction_name: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct OverviewResponse {
    pub total_directions: i64,
    pub total_services: i64,
    pub active_services: i64,
    pub inactive_services: i64,
    pub services_by_direction: Vec<DirectionCount>,
    pub services_by_type: Vec<LabelCount>,
    pub total_users: i64,
    pub active_users: i64,
    pub inactive_users: i64,
    pub users_by_role: Vec<LabelCount>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DailyLogins {
    pub date: NaiveDate,
    pub successful: i64,
    pub failed: i64,
}

#[derive(Debug, Serialize)]
pub struct SecurityMetricsResponse {
    pub window_days: i64,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub successful_logins: i64,
    pub failed_logins: i64,
    pub failure_rate: f64,
    pub unique_users_logged_in: i64,
    pub admin_actions: i64,
    pub daily_logins: Vec<DailyLogins>,
    pub top_failed_usernames: Vec<LabelCount>,
    pub active_users: i64,
    pub inactive_users: i64,
    pub admin_users: i64,
}
