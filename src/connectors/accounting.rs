use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{AccountingSource, ConnectorError, error_for_status};
use crate::models::AccountingSnapshot;

const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;
const MAX_TOKEN_LIFETIME_SECS: i64 = 86_400;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_usable(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Expiry for a freshly issued token, with `expires_in` clamped to at most a day.
fn token_expiry(now: DateTime<Utc>, expires_in: i64) -> Result<DateTime<Utc>, ConnectorError> {
    Duration::try_seconds(expires_in.clamp(0, MAX_TOKEN_LIFETIME_SECS))
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| ConnectorError::Decode(format!("token lifetime {expires_in}s out of range")))
}

#[derive(Debug, Deserialize)]
pub struct ProfitAndLoss {
    #[serde(default)]
    pub sections: Vec<ReportSection>,
}

#[derive(Debug, Deserialize)]
pub struct ReportSection {
    #[serde(rename = "type")]
    pub section_type: String,
    #[serde(default)]
    pub total: f64,
}

pub struct AccountingClient {
    client: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    token: Mutex<Option<CachedToken>>,
}

impl AccountingClient {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        token_url: &str,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token_url: token_url.to_string(),
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, ConnectorError> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret)
        else {
            return Err(ConnectorError::MissingCredentials("accounting API"));
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_usable(Utc::now())) {
            return Ok(token.access_token.clone());
        }

        let resp = self
            .client
            .post(&self.token_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let token: TokenResponse = error_for_status(resp).await?.json().await?;
        info!(expires_in = token.expires_in, "Refreshed accounting access token");

        let fresh = CachedToken {
            access_token: token.access_token,
            expires_at: token_expiry(Utc::now(), token.expires_in)?,
        };
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);

        Ok(access_token)
    }
}

/// Sums income sections into revenue and cost sections into expenses.
pub fn shape_profit_and_loss(report: &ProfitAndLoss) -> AccountingSnapshot {
    let mut revenue = 0.0;
    let mut expenses = 0.0;

    for section in &report.sections {
        match section.section_type.to_lowercase().as_str() {
            "income" | "other_income" => revenue += section.total,
            "expenses" | "cost_of_goods_sold" | "other_expenses" => expenses += section.total,
            _ => {}
        }
    }

    AccountingSnapshot {
        revenue,
        expenses,
        net_income: revenue - expenses,
    }
}

#[async_trait]
impl AccountingSource for AccountingClient {
    async fn fetch_accounting(
        &self,
        external_location_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AccountingSnapshot, ConnectorError> {
        let token = self.access_token().await?;
        let url = format!("{}/reports/profit-and-loss", self.base_url);

        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("location_id", external_location_id.to_string()),
                ("start_date", start.to_string()),
                ("end_date", end.to_string()),
            ])
            .send()
            .await?;

        let report: ProfitAndLoss = error_for_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| ConnectorError::Decode(e.to_string()))?;
        debug!(
            location = external_location_id,
            sections = report.sections.len(),
            "Fetched profit and loss"
        );

        Ok(shape_profit_and_loss(&report))
    }
}
