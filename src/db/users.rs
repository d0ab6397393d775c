use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::User;

pub async fn upsert_user(pool: &PgPool, email: &str) -> sqlx::Result<User> {
    let row = sqlx::query(
        r#"
        INSERT INTO orthodash.users (id, email)
        VALUES ($1, $2)
        ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
        RETURNING id, email, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .fetch_one(pool)
    .await?;

    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        created_at: row.get("created_at"),
    })
}

pub async fn insert_auth_session(
    pool: &PgPool,
    token_hash: &str,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO orthodash.auth_sessions (token_hash, user_id, expires_at)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(token_hash)
    .bind(user_id)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// User owning an unexpired token, with the token's expiry.
pub async fn find_session_user(
    pool: &PgPool,
    token_hash: &str,
) -> sqlx::Result<Option<(User, DateTime<Utc>)>> {
    let row = sqlx::query(
        r#"
        SELECT u.id, u.email, u.created_at, s.expires_at
        FROM orthodash.auth_sessions s
        JOIN orthodash.users u ON u.id = s.user_id
        WHERE s.token_hash = $1 AND s.expires_at > NOW()
        "#,
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| {
        let user = User {
            id: row.get("id"),
            email: row.get("email"),
            created_at: row.get("created_at"),
        };
        (user, row.get("expires_at"))
    }))
}

pub async fn delete_auth_session(pool: &PgPool, token_hash: &str) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM orthodash.auth_sessions WHERE token_hash = $1")
        .bind(token_hash)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete_expired_auth_sessions(pool: &PgPool) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM orthodash.auth_sessions WHERE expires_at <= NOW()")
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
