pub mod accounting;
pub mod practice;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{AccountingSnapshot, PracticeSnapshot};

pub use accounting::AccountingClient;
pub use practice::PracticeClient;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("{0} credentials are not configured")]
    MissingCredentials(&'static str),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("GraphQL errors: {0}")]
    GraphQl(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait PracticeSource: Send + Sync {
    async fn fetch_practice(
        &self,
        external_location_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PracticeSnapshot, ConnectorError>;
}

#[async_trait]
pub trait AccountingSource: Send + Sync {
    async fn fetch_accounting(
        &self,
        external_location_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AccountingSnapshot, ConnectorError>;
}

/// Zeroed practice data used when the practice API is unavailable.
pub fn fallback_practice() -> PracticeSnapshot {
    PracticeSnapshot::default()
}

/// Zeroed accounting data used when the accounting API is unavailable.
pub fn fallback_accounting() -> AccountingSnapshot {
    AccountingSnapshot::default()
}

pub fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("orthodash/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response, ConnectorError> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(ConnectorError::Status { status, body })
}

/// Ratio with a zero denominator mapped to zero.
pub(crate) fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallbacks_are_zeroed() {
        let practice = fallback_practice();
        assert_eq!(practice.new_patients, 0);
        assert_eq!(practice.conversion_rate, 0.0);
        assert_eq!(fallback_accounting().revenue, 0.0);
    }

    #[test]
    fn ratio_guards_zero_denominator() {
        assert_eq!(ratio(3.0, 0.0), 0.0);
        assert_eq!(ratio(1.0, 4.0), 0.25);
    }
}
