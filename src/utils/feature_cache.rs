use std::time::Duration;

use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;

use crate::auth::auth::AuthUser;
use crate::error::ApiError;

/// Feature keys seeded by the migrations and gated by the handlers.
pub const ATTENDANCE: &str = "attendance";
pub const ADVANCES: &str = "advances";
pub const CLAIMS: &str = "claims";

/// (business_id, feature_key) => enabled
static BUSINESS_FEATURES: Lazy<Cache<(u64, String), bool>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(50_000)
        .time_to_live(Duration::from_secs(300))
        .build()
});

pub async fn is_enabled(pool: &MySqlPool, business_id: u64, key: &str) -> Result<bool, ApiError> {
    let cache_key = (business_id, key.to_string());
    if let Some(enabled) = BUSINESS_FEATURES.get(&cache_key).await {
        return Ok(enabled);
    }

    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM business_features bf
        JOIN features f ON f.id = bf.feature_id
        WHERE bf.business_id = ? AND f.feature_key = ? AND bf.enabled = TRUE
        "#,
    )
    .bind(business_id)
    .bind(key)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        tracing::error!(error = %e, business_id, key, "Failed to load feature flag");
        ApiError::Internal
    })?;
    let enabled = count > 0;

    BUSINESS_FEATURES.insert(cache_key, enabled).await;
    Ok(enabled)
}

/// Superadmins act on any business regardless of its flags.
pub async fn require_feature(
    pool: &MySqlPool,
    auth: &AuthUser,
    business_id: u64,
    key: &str,
) -> Result<(), ApiError> {
    if auth.is_superadmin() || is_enabled(pool, business_id, key).await? {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!(
            "Feature '{key}' is not enabled for this business"
        )))
    }
}

pub fn invalidate_all() {
    BUSINESS_FEATURES.invalidate_all();
}
