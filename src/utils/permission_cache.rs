use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;

use crate::error::ApiError;

/// role name => permission names granted to it
static ROLE_PERMISSIONS: Lazy<Cache<String, Arc<HashSet<String>>>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(1_000)
        .time_to_live(Duration::from_secs(600))
        .build()
});

pub async fn permissions_for_role(
    pool: &MySqlPool,
    role: &str,
) -> Result<Arc<HashSet<String>>, ApiError> {
    if let Some(hit) = ROLE_PERMISSIONS.get(role).await {
        return Ok(hit);
    }

    let names = sqlx::query_scalar::<_, String>(
        r#"
        SELECT p.name
        FROM permissions p
        JOIN role_permissions rp ON rp.permission_id = p.id
        JOIN roles r ON r.id = rp.role_id
        WHERE r.name = ?
        "#,
    )
    .bind(role)
    .fetch_all(pool)
    .await
    .map_err(|e| {
        tracing::error!(error = %e, role, "Failed to load role permissions");
        ApiError::Internal
    })?;

    let set = Arc::new(names.into_iter().collect::<HashSet<_>>());
    ROLE_PERMISSIONS.insert(role.to_string(), set.clone()).await;
    Ok(set)
}

/// Drop every cached grant; called after any role or permission write.
pub fn invalidate_all() {
    ROLE_PERMISSIONS.invalidate_all();
}
