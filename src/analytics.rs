//! Dashboard aggregation over rows already fetched from the database.

use std::collections::{BTreeMap, HashMap, HashSet};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use crate::dtos::analytics::{DailyLogins, DirectionCount, LabelCount, OverviewResponse, SecurityMetricsResponse};
use crate::models::audit_log::AuditAction;
use crate::models::user::Role;

pub const DEFAULT_WINDOW_DAYS: i64 = 7;
pub const MAX_WINDOW_DAYS: i64 = 90;
pub const TOP_FAILED_LIMIT: usize = 5;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DirectionRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceStatRow {
    pub direction_id: i64,
    pub service_type: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserStatRow {
    pub role: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditStatRow {
    pub action: String,
    pub actor_id: Option<i64>,
    pub actor_username: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub fn clamp_window_days(days: Option<i64>) -> i64 {
    days.unwrap_or(DEFAULT_WINDOW_DAYS).clamp(1, MAX_WINDOW_DAYS)
}

/// Start of the window: midnight UTC of the oldest day included.
pub fn window_start(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    let first_day = now.date_naive() - Duration::days(days - 1);
    first_day.and_time(NaiveTime::MIN).and_utc()
}

/// Descending by count, ties by label.
fn sorted_counts(counts: HashMap<String, i64>) -> Vec<LabelCount> {
    let mut out: Vec<LabelCount> = counts
        .into_iter()
        .map(|(label, count)| LabelCount { label, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    out
}

pub fn overview(
    directions: &[DirectionRow],
    services: &[ServiceStatRow],
    users: &[UserStatRow],
) -> OverviewResponse {
    let mut per_direction: HashMap<i64, i64> = HashMap::new();
    let mut per_type: HashMap<String, i64> = HashMap::new();
    for s in services {
        *per_direction.entry(s.direction_id).or_default() += 1;
        *per_type.entry(s.service_type.clone()).or_default() += 1;
    }

    let mut services_by_direction: Vec<DirectionCount> = directions
        .iter()
        .map(|d| DirectionCount {
            direction_id: d.id,
            direction_name: d.name.clone(),
            count: per_direction.get(&d.id).copied().unwrap_or(0),
        })
        .collect();
    services_by_direction.sort_by(|a, b| {
        b.count.cmp(&a.count).then_with(|| a.direction_name.cmp(&b.direction_name))
    });

    let active_services = services.iter().filter(|s| s.is_active).count() as i64;
    let active_users = users.iter().filter(|u| u.is_active).count() as i64;

    let users_by_role = Role::ALL
        .iter()
        .map(|role| LabelCount {
            label: role.as_str().to_string(),
            count: users.iter().filter(|u| u.role == role.as_str()).count() as i64,
        })
        .collect();

    OverviewResponse {
        total_directions: directions.len() as i64,
        total_services: services.len() as i64,
        active_services,
        inactive_services: services.len() as i64 - active_services,
        services_by_direction,
        services_by_type: sorted_counts(per_type),
        total_users: users.len() as i64,
        active_users,
        inactive_users: users.len() as i64 - active_users,
        users_by_role,
    }
}

pub fn security_metrics(
    events: &[AuditStatRow],
    users: &[UserStatRow],
    now: DateTime<Utc>,
    days: i64,
) -> SecurityMetricsResponse {
    let days = days.clamp(1, MAX_WINDOW_DAYS);
    let from = window_start(now, days);
    let login = AuditAction::Login.as_str();
    let login_failed = AuditAction::LoginFailed.as_str();

    let mut daily: BTreeMap<NaiveDate, (i64, i64)> = (0..days)
        .map(|offset| (from.date_naive() + Duration::days(offset), (0, 0)))
        .collect();
    let mut successful_logins = 0;
    let mut failed_logins = 0;
    let mut admin_actions = 0;
    let mut logged_in: HashSet<i64> = HashSet::new();
    let mut failures: HashMap<String, i64> = HashMap::new();

    for e in events.iter().filter(|e| e.created_at >= from && e.created_at <= now) {
        let day = daily.entry(e.created_at.date_naive()).or_insert((0, 0));
        if e.action == login {
            successful_logins += 1;
            day.0 += 1;
            if let Some(id) = e.actor_id {
                logged_in.insert(id);
            }
        } else if e.action == login_failed {
            failed_logins += 1;
            day.1 += 1;
            let name = e.actor_username.clone().unwrap_or_else(|| "unknown".to_string());
            *failures.entry(name).or_default() += 1;
        } else if AuditAction::is_admin_mutation(&e.action) {
            admin_actions += 1;
        }
    }

    let attempts = successful_logins + failed_logins;
    let failure_rate = if attempts == 0 {
        0.0
    } else {
        (failed_logins as f64 / attempts as f64 * 10_000.0).round() / 10_000.0
    };

    let mut top_failed_usernames = sorted_counts(failures);
    top_failed_usernames.truncate(TOP_FAILED_LIMIT);

    let active_users = users.iter().filter(|u| u.is_active).count() as i64;

    SecurityMetricsResponse {
        window_days: days,
        from,
        to: now,
        successful_logins,
        failed_logins,
        failure_rate,
        unique_users_logged_in: logged_in.len() as i64,
        admin_actions,
        daily_logins: daily
            .into_iter()
            .map(|(date, (successful, failed))| DailyLogins { date, successful, failed })
            .collect(),
        top_failed_usernames,
        active_users,
        inactive_users: users.len() as i64 - active_users,
        admin_users: users
            .iter()
            .filter(|u| u.is_active && u.role == Role::Admin.as_str())
            .count() as i64,
    }
}
