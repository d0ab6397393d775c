use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{config::AuthConfig, db::users, error::AppError, state::State};

#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

struct CachedLogin {
    user: AuthUser,
    expires_at: DateTime<Utc>,
}

/// Tokens already resolved against `auth_sessions`, keyed by digest, so
/// authenticated requests keep working while the database is unreachable.
#[derive(Default)]
pub struct LoginCache {
    entries: DashMap<String, CachedLogin>,
}

impl LoginCache {
    pub fn insert(&self, digest: String, user: AuthUser, expires_at: DateTime<Utc>) {
        self.entries.insert(digest, CachedLogin { user, expires_at });
    }

    pub fn get(&self, digest: &str, now: DateTime<Utc>) -> Option<AuthUser> {
        let entry = self.entries.get(digest)?;
        if entry.expires_at > now {
            return Some(entry.user.clone());
        }
        drop(entry);

        self.entries.remove(digest);
        None
    }

    pub fn remove(&self, digest: &str) {
        self.entries.remove(digest);
    }
}

/// Validates a login attempt and returns the normalized email.
pub fn check_credentials(config: &AuthConfig, email: &str, password: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();

    let domain_ok = email
        .rsplit_once('@')
        .map(|(local, domain)| !local.is_empty() && domain == config.email_domain)
        .unwrap_or(false);
    if !domain_ok {
        return Err(AppError::Forbidden("email domain not allowed".to_string()));
    }

    if email != config.email || !same_digest(password, &config.password) {
        return Err(AppError::Unauthorized);
    }

    Ok(email)
}

/// Compares SHA-256 digests without short-circuiting on the first differing byte.
fn same_digest(given: &str, expected: &str) -> bool {
    let given = Sha256::digest(given.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());

    given
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub async fn login(state: &State, email: &str, password: &str) -> Result<IssuedSession, AppError> {
    let email = check_credentials(&state.config.auth, email, password).map_err(|e| {
        warn!("Rejected login: {e}");
        e
    })?;

    let user = users::upsert_user(&state.pool, &email).await?;
    let token = generate_token();
    let expires_at = Utc::now() + Duration::hours(state.config.auth.session_hours);
    let digest = hash_token(&token);
    users::insert_auth_session(&state.pool, &digest, user.id, expires_at).await?;

    let user = AuthUser {
        user_id: user.id,
        email: user.email,
    };
    state.logins.insert(digest, user.clone(), expires_at);

    info!(user_id = %user.user_id, "User logged in");
    Ok(IssuedSession {
        token,
        expires_at,
        user,
    })
}

pub async fn logout(state: &State, token: &str) -> Result<(), AppError> {
    let digest = hash_token(token);
    state.logins.remove(&digest);
    users::delete_auth_session(&state.pool, &digest).await?;
    Ok(())
}

impl FromRequestParts<Arc<State>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<State>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AppError::Unauthorized)?;
        let digest = hash_token(token);
        if let Some(user) = state.logins.get(&digest, Utc::now()) {
            return Ok(user);
        }

        let (user, expires_at) = users::find_session_user(&state.pool, &digest)
            .await?
            .ok_or(AppError::Unauthorized)?;

        let user = AuthUser {
            user_id: user.id,
            email: user.email,
        };
        state.logins.insert(digest, user.clone(), expires_at);
        Ok(user)
    }
}
