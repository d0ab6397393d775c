use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::analytics::cache::{CacheEntry, CacheKey, CacheStore};

/// `analytics_cache` table, unique on (location, start, end, data type).
#[derive(Clone)]
pub struct PgCache {
    pool: PgPool,
}

impl PgCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for PgCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT data, created_at FROM orthodash.analytics_cache
            WHERE location_id = $1 AND start_date = $2 AND end_date = $3 AND data_type = $4
            "#,
        )
        .bind(key.location_id)
        .bind(key.start_date)
        .bind(key.end_date)
        .bind(key.data_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| CacheEntry {
            data: row.get("data"),
            created_at: row.get("created_at"),
        }))
    }

    async fn put(&self, key: &CacheKey, data: &Value) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO orthodash.analytics_cache
            (id, location_id, start_date, end_date, data_type, data, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (location_id, start_date, end_date, data_type) DO UPDATE
            SET data = EXCLUDED.data, created_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key.location_id)
        .bind(key.start_date)
        .bind(key.end_date)
        .bind(key.data_type.as_str())
        .bind(data)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub async fn clear_location_cache(pool: &PgPool, location_id: Uuid) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM orthodash.analytics_cache WHERE location_id = $1")
        .bind(location_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

pub async fn prune_expired(pool: &PgPool, ttl: Duration) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "DELETE FROM orthodash.analytics_cache WHERE created_at < NOW() - make_interval(secs => $1)",
    )
    .bind(ttl.as_secs_f64())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
