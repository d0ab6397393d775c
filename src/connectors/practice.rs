use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{ConnectorError, PracticeSource, error_for_status, ratio};
use crate::models::{ByReferral, PracticeSnapshot, ReferralType};

const ACTIVITY_QUERY: &str = r#"
query PracticeActivity($locationId: ID!, $startDate: Date!, $endDate: Date!) {
    leads(locationId: $locationId, startDate: $startDate, endDate: $endDate) {
        nodes { id status referralSource }
    }
    consultations: appointments(
        locationId: $locationId
        startDate: $startDate
        endDate: $endDate
        type: CONSULTATION
    ) {
        totalCount
    }
}"#;

const STARTED_STATUSES: [&str; 3] = ["started", "in_treatment", "active"];

#[derive(Debug, Deserialize)]
pub struct PracticeActivity {
    pub leads: LeadConnection,
    pub consultations: CountConnection,
}

#[derive(Debug, Deserialize)]
pub struct LeadConnection {
    pub nodes: Vec<LeadNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadNode {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub referral_source: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountConnection {
    pub total_count: i64,
}

pub struct PracticeClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl PracticeClient {
    pub fn new(client: reqwest::Client, url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            url: url.to_string(),
            api_key,
        }
    }

    async fn graphql<T: serde::de::DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, ConnectorError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ConnectorError::MissingCredentials("practice API"))?;

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let body: Value = error_for_status(resp).await?.json().await?;
        decode_graphql(body)
    }
}

/// Pulls `data` out of a GraphQL envelope, treating any `errors` entry as failure.
pub fn decode_graphql<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, ConnectorError> {
    if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
        return Err(ConnectorError::GraphQl(errors.to_string()));
    }

    let data = body
        .get("data")
        .cloned()
        .ok_or_else(|| ConnectorError::Decode("missing 'data' in GraphQL response".to_string()))?;

    serde_json::from_value(data).map_err(|e| ConnectorError::Decode(e.to_string()))
}

/// Reduces raw leads and appointment counts to the metrics the dashboard charts.
pub fn shape_activity(activity: &PracticeActivity) -> PracticeSnapshot {
    let mut referrals = ByReferral::<i64>::default();
    let mut starts = 0;

    for lead in &activity.leads.nodes {
        let channel = ReferralType::classify(lead.referral_source.as_deref().unwrap_or_default());
        *referrals.get_mut(channel) += 1;

        let started = lead
            .status
            .as_deref()
            .map(|status| STARTED_STATUSES.contains(&status.trim().to_lowercase().as_str()))
            .unwrap_or(false);
        if started {
            starts += 1;
        }
    }

    let new_patients = activity.leads.nodes.len() as i64;
    let consultations = activity.consultations.total_count.max(0);

    let mut referral_rates = ByReferral::<f64>::default();
    for channel in ReferralType::ALL {
        *referral_rates.get_mut(channel) =
            ratio(referrals.get(channel) as f64, new_patients as f64);
    }

    PracticeSnapshot {
        new_patients,
        consultations,
        starts,
        referrals,
        referral_rates,
        conversion_rate: ratio(starts as f64, consultations as f64),
    }
}

#[async_trait]
impl PracticeSource for PracticeClient {
    async fn fetch_practice(
        &self,
        external_location_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PracticeSnapshot, ConnectorError> {
        let variables = json!({
            "locationId": external_location_id,
            "startDate": start.to_string(),
            "endDate": end.to_string(),
        });

        let activity: PracticeActivity = self.graphql(ACTIVITY_QUERY, variables).await?;
        debug!(
            location = external_location_id,
            leads = activity.leads.nodes.len(),
            "Fetched practice activity"
        );

        Ok(shape_activity(&activity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity() -> PracticeActivity {
        serde_json::from_value(json!({
            "leads": { "nodes": [
                { "id": "1", "status": "STARTED", "referralSource": "Google" },
                { "id": "2", "status": "pending", "referralSource": "Dr. Patel DDS" },
                { "id": "3", "status": "in_treatment", "referralSource": "Instagram" },
                { "id": "4", "status": null, "referralSource": null }
            ]},
            "consultations": { "totalCount": 3 }
        }))
        .unwrap()
    }

    #[test]
    fn shapes_referrals_and_conversion() {
        let snapshot = shape_activity(&activity());

        assert_eq!(snapshot.new_patients, 4);
        assert_eq!(snapshot.consultations, 3);
        assert_eq!(snapshot.starts, 2);
        assert_eq!(snapshot.referrals.digital, 2);
        assert_eq!(snapshot.referrals.professional, 1);
        assert_eq!(snapshot.referrals.direct, 1);
        assert!((snapshot.referral_rates.digital - 0.5).abs() < 1e-9);
        assert!((snapshot.conversion_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_activity_has_zero_rates() {
        let empty = PracticeActivity {
            leads: LeadConnection { nodes: Vec::new() },
            consultations: CountConnection { total_count: 0 },
        };
        let snapshot = shape_activity(&empty);

        assert_eq!(snapshot, PracticeSnapshot::default());
    }

    #[test]
    fn graphql_errors_are_failures() {
        let body = json!({ "data": null, "errors": [{ "message": "location not found" }] });
        let result: Result<PracticeActivity, _> = decode_graphql(body);
        assert!(matches!(result, Err(ConnectorError::GraphQl(msg)) if msg.contains("location not found")));
    }

    #[test]
    fn missing_data_is_a_decode_error() {
        let result: Result<PracticeActivity, _> = decode_graphql(json!({}));
        assert!(matches!(result, Err(ConnectorError::Decode(_))));
    }

    #[tokio::test]
    async fn refuses_to_call_without_api_key() {
        let client = PracticeClient::new(reqwest::Client::new(), "http://127.0.0.1:9", None);
        let today = chrono::Utc::now().date_naive();
        let result = client.fetch_practice("loc-1", today, today).await;
        assert!(matches!(result, Err(ConnectorError::MissingCredentials(_))));
    }
}
