use std::time::Duration;

use futures::future::join_all;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use tracing::info;

use super::email_filter::normalize;

/// Normalised email → id of the user holding it. Only taken addresses are kept.
static OWNERS: Lazy<Cache<String, u64>> = Lazy::new(|| {
    Cache::builder()
        .name("email_owners")
        .max_capacity(200_000)
        .time_to_idle(Duration::from_secs(12 * 60 * 60))
        .build()
});

pub async fn remember(email: &str, user_id: u64) {
    OWNERS.insert(normalize(email), user_id).await;
}

pub async fn forget(email: &str) {
    OWNERS.invalidate(&normalize(email)).await;
}

/// Cached holder of `email`, `None` when unknown to the cache.
pub async fn owner_of(email: &str) -> Option<u64> {
    OWNERS.get(&normalize(email)).await
}

/// Seeds the cache with addresses of users who signed in or registered
/// within `days`, `chunk` rows at a time.
pub async fn warmup_email_cache(pool: &MySqlPool, days: u32, chunk: usize) -> anyhow::Result<usize> {
    let mut chunks = sqlx::query_as::<_, (u64, String)>(
        r#"
        SELECT id, email
        FROM users
        WHERE COALESCE(last_login_at, created_at) >= NOW() - INTERVAL ? DAY
        "#,
    )
    .bind(days)
    .fetch(pool)
    .chunks(chunk.max(1));

    let mut loaded = 0;
    while let Some(rows) = chunks.next().await {
        let rows = rows.into_iter().collect::<Result<Vec<_>, _>>()?;
        loaded += rows.len();
        join_all(rows.iter().map(|(id, email)| remember(email, *id))).await;
    }

    info!(loaded, days, "Email cache warmed");
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn owners_are_remembered_until_forgotten() {
        assert_eq!(owner_of("ledger.keeper@acme.test").await, None);

        remember("Ledger.Keeper@acme.test", 17).await;
        assert_eq!(owner_of("ledger.keeper@acme.test").await, Some(17));

        remember("ledger.keeper@acme.test", 21).await;
        assert_eq!(owner_of("LEDGER.KEEPER@acme.test").await, Some(21));

        forget("ledger.keeper@ACME.test").await;
        assert_eq!(owner_of("ledger.keeper@acme.test").await, None);
    }
}
