use std::{collections::HashMap, io::Read, path::Path};

use chrono::NaiveDate;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::warn;
use uuid::Uuid;

use super::{decode_error, locations};
use crate::{
    analytics::period::{months_in_range, validate_month},
    models::{AcquisitionCost, ReferralType},
};

const SELECT_COST: &str = "SELECT id, location_id, referral_type, cost, period, created_at, updated_at \
     FROM orthodash.acquisition_costs";

fn cost_from_row(row: &PgRow) -> sqlx::Result<AcquisitionCost> {
    let referral_type: String = row.try_get("referral_type")?;

    Ok(AcquisitionCost {
        id: row.try_get("id")?,
        location_id: row.try_get("location_id")?,
        referral_type: referral_type.parse().map_err(decode_error)?,
        cost: row.try_get("cost")?,
        period: row.try_get("period")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn list_costs(
    pool: &PgPool,
    location_id: Option<Uuid>,
    period: Option<&str>,
) -> sqlx::Result<Vec<AcquisitionCost>> {
    let rows = sqlx::query(&format!(
        "{SELECT_COST} \
         WHERE ($1::uuid IS NULL OR location_id = $1) \
         AND ($2::text IS NULL OR period = $2) \
         ORDER BY period DESC, referral_type"
    ))
    .bind(location_id)
    .bind(period)
    .fetch_all(pool)
    .await?;

    rows.iter().map(cost_from_row).collect()
}

/// Costs for one location whose month falls inside the inclusive date range.
pub async fn costs_for_range(
    pool: &PgPool,
    location_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> sqlx::Result<Vec<AcquisitionCost>> {
    let months = months_in_range(start, end);
    if months.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query(&format!(
        "{SELECT_COST} WHERE location_id = $1 AND period = ANY($2) ORDER BY period, referral_type"
    ))
    .bind(location_id)
    .bind(&months)
    .fetch_all(pool)
    .await?;

    rows.iter().map(cost_from_row).collect()
}

pub async fn upsert_cost(
    pool: &PgPool,
    location_id: Uuid,
    referral_type: ReferralType,
    period: &str,
    cost: f64,
) -> sqlx::Result<AcquisitionCost> {
    let row = sqlx::query(
        r#"
        INSERT INTO orthodash.acquisition_costs (id, location_id, referral_type, cost, period)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (location_id, referral_type, period) DO UPDATE
        SET cost = EXCLUDED.cost, updated_at = NOW()
        RETURNING id, location_id, referral_type, cost, period, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(location_id)
    .bind(referral_type.as_str())
    .bind(cost)
    .bind(period)
    .fetch_one(pool)
    .await?;

    cost_from_row(&row)
}

pub async fn delete_cost(pool: &PgPool, id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM orthodash.acquisition_costs WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[derive(Debug, serde::Deserialize)]
pub struct CostCsvRow {
    pub location_external_id: String,
    pub referral_type: String,
    pub period: String,
    pub cost: f64,
}

#[derive(Debug, Default, PartialEq)]
pub struct ImportOutcome {
    pub upserted: usize,
    pub skipped: usize,
}

/// A CSV row checked and normalized, ready to upsert.
#[derive(Debug, PartialEq)]
pub struct ValidCostRow {
    pub location_external_id: String,
    pub referral_type: ReferralType,
    pub period: String,
    pub cost: f64,
}

pub fn validate_amount(cost: f64) -> Result<f64, String> {
    if !cost.is_finite() || cost < 0.0 {
        return Err(format!("cost {cost} must be a non-negative amount"));
    }
    Ok(cost)
}

pub fn validate_csv_row(row: CostCsvRow) -> Result<ValidCostRow, String> {
    let referral_type = row.referral_type.parse::<ReferralType>()?;
    let period = validate_month(&row.period).map_err(|e| e.to_string())?;

    Ok(ValidCostRow {
        location_external_id: row.location_external_id.trim().to_string(),
        referral_type,
        period,
        cost: validate_amount(row.cost)?,
    })
}

/// Rows ready to upsert, each resolved to its location id.
#[derive(Debug, Default)]
pub struct ImportPlan {
    pub rows: Vec<(Uuid, ValidCostRow)>,
    pub skipped: usize,
}

/// Validates every row and resolves its location by external id. Invalid rows
/// and rows for unknown locations are skipped and counted.
pub fn plan_import<R: Read>(
    reader: &mut csv::Reader<R>,
    location_ids: &HashMap<String, Uuid>,
) -> csv::Result<ImportPlan> {
    let mut plan = ImportPlan::default();

    for (index, result) in reader.deserialize::<CostCsvRow>().enumerate() {
        let line = index + 2;
        let row = match validate_csv_row(result?) {
            Ok(row) => row,
            Err(reason) => {
                warn!(line, "Skipping cost row: {reason}");
                plan.skipped += 1;
                continue;
            }
        };

        let Some(location_id) = location_ids.get(&row.location_external_id) else {
            warn!(
                line,
                external_id = %row.location_external_id,
                "Skipping cost row for unknown location"
            );
            plan.skipped += 1;
            continue;
        };

        plan.rows.push((*location_id, row));
    }

    Ok(plan)
}

pub async fn import_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<ImportOutcome> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let location_ids = locations::location_ids_by_external_id(pool).await?;
    let plan = plan_import(&mut reader, &location_ids)?;

    let mut outcome = ImportOutcome {
        upserted: 0,
        skipped: plan.skipped,
    };
    for (location_id, row) in &plan.rows {
        upsert_cost(pool, *location_id, row.referral_type, &row.period, row.cost).await?;
        outcome.upserted += 1;
    }

    Ok(outcome)
}
