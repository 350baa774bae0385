use anyhow::{Context, Result};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use tracing::info;

use crate::api::role::{assign_roles, load_user_roles};
use crate::auth::password::hash_password;
use crate::config::Config;
use crate::model::role::SystemRole;

pub async fn init_db(config: &Config) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
        info!("Migrations applied");
    }

    Ok(pool)
}

/// Creates the bootstrap superadmin when configured and missing.
pub async fn ensure_superadmin(pool: &MySqlPool, config: &Config) -> Result<()> {
    let (Some(email), Some(password)) = (&config.superadmin_email, &config.superadmin_password)
    else {
        return Ok(());
    };
    let email = email.trim().to_lowercase();

    let existing = sqlx::query_scalar::<_, u64>("SELECT id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(pool)
        .await?;

    let user_id = match existing {
        Some(id) => id,
        None => {
            let hashed = hash_password(password)
                .map_err(|e| anyhow::anyhow!("Failed to hash superadmin password: {e}"))?;
            sqlx::query("INSERT INTO users (name, email, password) VALUES (?, ?, ?)")
                .bind("Superadmin")
                .bind(&email)
                .bind(hashed)
                .execute(pool)
                .await?
                .last_insert_id()
        }
    };

    let roles = load_user_roles(pool, user_id).await?;
    if !roles.iter().any(|r| r == SystemRole::Superadmin.as_ref()) {
        let mut wanted = roles;
        wanted.push(SystemRole::Superadmin.to_string());
        assign_roles(pool, user_id, &wanted).await?;
        info!(user_id, email = %email, "Bootstrap superadmin ready");
    }

    Ok(())
}
