use serde_json::Value;
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};
use uuid::Uuid;

use crate::models::{AiSummary, Period, Session};

const SELECT_SESSION: &str = "SELECT id, user_id, name, periods, data, ai_summary, metadata, active, \
     created_at, updated_at FROM orthodash.sessions";

/// Writable fields of a session; a re-save replaces all of them.
#[derive(Debug, Clone)]
pub struct SessionInput {
    pub name: String,
    pub periods: Vec<Period>,
    pub data: Value,
    pub ai_summary: Option<AiSummary>,
    pub metadata: Value,
}

fn session_from_row(row: &PgRow) -> sqlx::Result<Session> {
    let Json(periods): Json<Vec<Period>> = row.try_get("periods")?;
    let ai_summary: Option<Json<AiSummary>> = row.try_get("ai_summary")?;

    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        periods,
        data: row.try_get("data")?,
        ai_summary: ai_summary.map(|Json(summary)| summary),
        metadata: row.try_get("metadata")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn create_session(
    pool: &PgPool,
    user_id: Uuid,
    input: &SessionInput,
) -> sqlx::Result<Session> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO orthodash.sessions (id, user_id, name, periods, data, ai_summary, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {}
        "#,
        returning_columns()
    ))
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&input.name)
    .bind(Json(&input.periods))
    .bind(&input.data)
    .bind(input.ai_summary.as_ref().map(Json))
    .bind(&input.metadata)
    .fetch_one(pool)
    .await?;

    session_from_row(&row)
}

pub async fn list_sessions(pool: &PgPool, user_id: Uuid) -> sqlx::Result<Vec<Session>> {
    let rows = sqlx::query(&format!(
        "{SELECT_SESSION} WHERE user_id = $1 AND active ORDER BY updated_at DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(session_from_row).collect()
}

pub async fn get_session(pool: &PgPool, user_id: Uuid, id: Uuid) -> sqlx::Result<Option<Session>> {
    let row = sqlx::query(&format!(
        "{SELECT_SESSION} WHERE id = $1 AND user_id = $2 AND active"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(session_from_row).transpose()
}

/// Looks a session up without an owner check; used by the CLI.
pub async fn get_session_any_owner(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<Session>> {
    let row = sqlx::query(&format!("{SELECT_SESSION} WHERE id = $1 AND active"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(session_from_row).transpose()
}

pub async fn update_session(
    pool: &PgPool,
    user_id: Uuid,
    id: Uuid,
    input: &SessionInput,
) -> sqlx::Result<Option<Session>> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE orthodash.sessions
        SET name = $3, periods = $4, data = $5, ai_summary = $6, metadata = $7, updated_at = NOW()
        WHERE id = $1 AND user_id = $2 AND active
        RETURNING {}
        "#,
        returning_columns()
    ))
    .bind(id)
    .bind(user_id)
    .bind(&input.name)
    .bind(Json(&input.periods))
    .bind(&input.data)
    .bind(input.ai_summary.as_ref().map(Json))
    .bind(&input.metadata)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(session_from_row).transpose()
}

pub async fn delete_session(pool: &PgPool, user_id: Uuid, id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE orthodash.sessions SET active = FALSE, updated_at = NOW()
        WHERE id = $1 AND user_id = $2 AND active
        "#,
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn returning_columns() -> &'static str {
    "id, user_id, name, periods, data, ai_summary, metadata, active, created_at, updated_at"
}
