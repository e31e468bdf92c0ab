use sqlx::postgres::{PgPool, PgPoolOptions};
use crate::auth::password::hash_password;
use crate::config::{BootstrapAdmin, Config};
use crate::error::AppError;

/// Create a connection pool from the configured database URL.
pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[derive(Debug, PartialEq, Eq)]
enum BootstrapStep {
    AdminPresent,
    /// The configured username belongs to an account that is left untouched.
    NameTaken(String),
    Create,
}

fn bootstrap_step(has_active_admin: bool, existing_role: Option<String>) -> BootstrapStep {
    match (has_active_admin, existing_role) {
        (true, _) => BootstrapStep::AdminPresent,
        (false, Some(role)) => BootstrapStep::NameTaken(role),
        (false, None) => BootstrapStep::Create,
    }
}

/// Creates the configured admin account when the database has no active
/// admin yet. An existing account with the configured username is never
/// promoted or reactivated. Returns whether an account was created.
pub async fn ensure_bootstrap_admin(pool: &PgPool, admin: &BootstrapAdmin) -> Result<bool, AppError> {
    let (has_admin, existing_role) = sqlx::query_as::<_, (bool, Option<String>)>(
        r#"SELECT EXISTS(SELECT 1 FROM users WHERE role = 'admin' AND is_active),
            (SELECT role FROM users WHERE username = $1)"#,
    )
    .bind(&admin.username)
    .fetch_one(pool)
    .await?;

    match bootstrap_step(has_admin, existing_role) {
        BootstrapStep::AdminPresent => return Ok(false),
        BootstrapStep::NameTaken(role) => {
            tracing::warn!(
                username = %admin.username,
                %role,
                "No active admin, but the bootstrap username is taken; leaving the account unchanged"
            );
            return Ok(false);
        }
        BootstrapStep::Create => {}
    }

    let password_hash = hash_password(&admin.password)?;
    let created = sqlx::query(
        r#"INSERT INTO users (username, email, password_hash, role)
        VALUES ($1, $2, $3, 'admin')
        ON CONFLICT DO NOTHING"#,
    )
    .bind(&admin.username)
    .bind(admin.email.to_lowercase())
    .bind(password_hash)
    .execute(pool)
    .await?
    .rows_affected()
        > 0;

    if created {
        tracing::info!(username = %admin.username, "Bootstrap admin account created");
    } else {
        tracing::warn!(username = %admin.username, "Bootstrap admin username or email already in use");
    }
    Ok(created)
}
