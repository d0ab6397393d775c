use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::{Context, anyhow};
use tracing::info;

const MAX_SESSION_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub frontend_origin: String,
    pub auth: AuthConfig,
    pub practice: PracticeApiConfig,
    pub accounting: AccountingApiConfig,
    pub llm: LlmConfig,
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub email_domain: String,
    pub email: String,
    pub password: String,
    pub session_hours: i64,
}

#[derive(Debug, Clone)]
pub struct PracticeApiConfig {
    pub url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AccountingApiConfig {
    pub base_url: String,
    pub token_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let cache_minutes: u64 = try_load(&lookup, "CACHE_TTL_MINUTES", "15")?;
        let timeout_secs: u64 = try_load(&lookup, "REQUEST_TIMEOUT_SECS", "20")?;
        let session_hours: i64 = try_load(&lookup, "AUTH_SESSION_HOURS", "24")?;

        let email_domain: String = try_load(&lookup, "AUTH_EMAIL_DOMAIN", "orthodash.io")?;
        let email: String = try_load(&lookup, "AUTH_EMAIL", "admin@orthodash.io")?;

        if !(1..=MAX_SESSION_HOURS).contains(&session_hours) {
            return Err(anyhow!(
                "AUTH_SESSION_HOURS must be between 1 and {MAX_SESSION_HOURS}"
            ));
        }

        Ok(Self {
            port: try_load(&lookup, "PORT", "3000")?,
            frontend_origin: try_load(&lookup, "FRONTEND_ORIGIN", "http://localhost:5173")?,
            auth: AuthConfig {
                email_domain: email_domain.trim_start_matches('@').to_lowercase(),
                email: email.to_lowercase(),
                password: try_load(&lookup, "AUTH_PASSWORD", "orthodash")?,
                session_hours,
            },
            practice: PracticeApiConfig {
                url: try_load(
                    &lookup,
                    "PRACTICE_API_URL",
                    "https://api.practice.example.com/graphql",
                )?,
                api_key: optional(&lookup, "PRACTICE_API_KEY"),
            },
            accounting: AccountingApiConfig {
                base_url: try_load(
                    &lookup,
                    "ACCOUNTING_API_URL",
                    "https://api.accounting.example.com/v1",
                )?,
                token_url: try_load(
                    &lookup,
                    "ACCOUNTING_TOKEN_URL",
                    "https://auth.accounting.example.com/oauth2/token",
                )?,
                client_id: optional(&lookup, "ACCOUNTING_CLIENT_ID"),
                client_secret: optional(&lookup, "ACCOUNTING_CLIENT_SECRET"),
            },
            llm: LlmConfig {
                url: optional(&lookup, "LLM_API_URL"),
                api_key: optional(&lookup, "LLM_API_KEY"),
                model: try_load(&lookup, "LLM_MODEL", "gpt-4o-mini")?,
            },
            cache_ttl: Duration::from_secs(cache_minutes.saturating_mul(60)),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = optional(lookup, key).unwrap_or_else(|| {
        info!("{key} not set, using default");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| anyhow!("{e}"))
        .with_context(|| format!("invalid {key} value"))
}
