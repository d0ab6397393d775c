use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::decode_error;
use crate::models::{ReportSummary, ReportType};

fn summary_from_row(row: &PgRow) -> sqlx::Result<ReportSummary> {
    let report_type: String = row.try_get("report_type")?;

    Ok(ReportSummary {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        name: row.try_get("name")?,
        report_type: report_type.parse().map_err(decode_error)?,
        size_bytes: row.try_get("size_bytes")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn create_report(
    pool: &PgPool,
    user_id: Uuid,
    session_id: Uuid,
    name: &str,
    report_type: ReportType,
    data: &[u8],
) -> sqlx::Result<ReportSummary> {
    let row = sqlx::query(
        r#"
        INSERT INTO orthodash.reports (id, user_id, session_id, name, report_type, data)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, session_id, name, report_type,
                  octet_length(data)::bigint AS size_bytes, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(session_id)
    .bind(name)
    .bind(report_type.as_str())
    .bind(data)
    .fetch_one(pool)
    .await?;

    summary_from_row(&row)
}

pub async fn list_reports(pool: &PgPool, user_id: Uuid) -> sqlx::Result<Vec<ReportSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT id, session_id, name, report_type,
               octet_length(data)::bigint AS size_bytes, created_at
        FROM orthodash.reports
        WHERE user_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(summary_from_row).collect()
}

pub async fn get_report(
    pool: &PgPool,
    user_id: Uuid,
    id: Uuid,
) -> sqlx::Result<Option<ReportSummary>> {
    let row = sqlx::query(
        r#"
        SELECT id, session_id, name, report_type,
               octet_length(data)::bigint AS size_bytes, created_at
        FROM orthodash.reports
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(summary_from_row).transpose()
}

pub async fn report_data(
    pool: &PgPool,
    user_id: Uuid,
    id: Uuid,
) -> sqlx::Result<Option<(ReportSummary, Vec<u8>)>> {
    let row = sqlx::query(
        r#"
        SELECT id, session_id, name, report_type,
               octet_length(data)::bigint AS size_bytes, created_at, data
        FROM orthodash.reports
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some((summary_from_row(&row)?, row.try_get("data")?))),
        None => Ok(None),
    }
}
