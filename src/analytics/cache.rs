use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::models::DataType;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheKey {
    pub location_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub data_type: DataType,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

/// Storage for memoized connector payloads, one row per key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, sqlx::Error>;

    /// Inserts or overwrites the row for `key`, resetting its age.
    async fn put(&self, key: &CacheKey, data: &Value) -> Result<(), sqlx::Error>;
}

pub fn is_fresh(created_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    chrono::Duration::from_std(ttl)
        .map(|ttl| now - created_at < ttl)
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_at_ttl() {
        let now = Utc::now();
        let ttl = Duration::from_secs(15 * 60);

        assert!(is_fresh(now - chrono::Duration::minutes(14), now, ttl));
        assert!(!is_fresh(now - chrono::Duration::minutes(15), now, ttl));
        assert!(!is_fresh(now - chrono::Duration::hours(3), now, ttl));
    }
}
