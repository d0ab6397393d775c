pub mod cache;
pub mod costs;
pub mod locations;
pub mod reports;
pub mod sessions;
pub mod users;

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, postgres::PgPoolOptions};
use uuid::Uuid;

use crate::{
    analytics::PeriodInputs,
    error::AppError,
    models::{AcquisitionCost, Location, ReferralType},
};

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

/// Pool that connects on first use, so the server can start while Postgres is down.
pub fn connect_lazy(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(3))
        .connect_lazy(database_url)
        .context("invalid DATABASE_URL")
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    for location in locations::sample_locations() {
        sqlx::query(
            r#"
            INSERT INTO orthodash.locations (id, name, external_id, active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (external_id) DO UPDATE
            SET name = EXCLUDED.name, active = EXCLUDED.active
            "#,
        )
        .bind(location.id)
        .bind(&location.name)
        .bind(&location.external_id)
        .bind(location.active)
        .bind(location.created_at)
        .execute(pool)
        .await?;
    }

    let sample_costs = [
        ("loc-downtown", ReferralType::Digital, "2025-01", 4200.0),
        ("loc-downtown", ReferralType::Professional, "2025-01", 1500.0),
        ("loc-downtown", ReferralType::Direct, "2025-01", 600.0),
        ("loc-downtown", ReferralType::Digital, "2025-02", 3900.0),
        ("loc-westside", ReferralType::Digital, "2025-01", 2800.0),
        ("loc-westside", ReferralType::Professional, "2025-02", 1750.0),
    ];

    for (external_id, referral_type, period, cost) in sample_costs {
        let location = locations::find_by_external_id(pool, external_id)
            .await?
            .with_context(|| format!("seeded location {external_id} missing"))?;
        costs::upsert_cost(pool, location.id, referral_type, period, cost).await?;
    }

    Ok(())
}

#[async_trait]
impl PeriodInputs for PgPool {
    async fn location(&self, id: Uuid) -> Result<Location, AppError> {
        locations::get_location_or_sample(self, id).await
    }

    async fn costs_for_range(
        &self,
        location_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> sqlx::Result<Vec<AcquisitionCost>> {
        costs::costs_for_range(self, location_id, start, end).await
    }
}

fn decode_error(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}
