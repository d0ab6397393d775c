pub mod rules;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{AiSummary, PeriodMetrics, Priority, Recommendation};

const SYSTEM_PROMPT: &str = "You are an analyst for orthodontic practices. You receive JSON \
    metrics for one or more periods: new patients, consultations, starts, referral counts and \
    rates by channel (digital, professional, direct), revenue, expenses and acquisition costs. \
    Reply with a single JSON object: {\"summary\": string, \"recommendations\": [{\"title\": \
    string, \"detail\": string, \"priority\": \"high\" | \"medium\" | \"low\"}]}. Keep the \
    summary under 120 words and give at most five recommendations.";

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unreadable LLM reply: {0}")]
    Reply(String),
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, metrics: &[PeriodMetrics]) -> Result<AiSummary, SummaryError>;
}

/// Chat-completions style client for a hosted model.
pub struct LlmSummarizer {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl LlmSummarizer {
    pub fn new(client: reqwest::Client, url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn request_body(&self, metrics: &[PeriodMetrics]) -> Result<Value, SummaryError> {
        let metrics_json =
            serde_json::to_string(metrics).map_err(|e| SummaryError::Reply(e.to_string()))?;

        Ok(json!({
            "model": self.model,
            "temperature": 0.2,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": metrics_json },
            ],
        }))
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, metrics: &[PeriodMetrics]) -> Result<AiSummary, SummaryError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(metrics)?)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SummaryError::Status { status, body });
        }

        let body: Value = resp.json().await?;
        let content = body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| SummaryError::Reply("missing choices[0].message.content".to_string()))?;

        parse_reply(content)
    }
}

#[derive(Debug, Deserialize)]
struct LlmReply {
    summary: String,
    #[serde(default)]
    recommendations: Vec<LlmRecommendation>,
}

#[derive(Debug, Deserialize)]
struct LlmRecommendation {
    title: String,
    #[serde(default)]
    detail: String,
    #[serde(default)]
    priority: String,
}

fn parse_priority(value: &str) -> Priority {
    match value.trim().to_lowercase().as_str() {
        "high" | "urgent" | "critical" => Priority::High,
        "low" => Priority::Low,
        _ => Priority::Medium,
    }
}

/// Strips an optional markdown code fence around the JSON object.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

pub fn parse_reply(content: &str) -> Result<AiSummary, SummaryError> {
    let reply: LlmReply = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| SummaryError::Reply(e.to_string()))?;

    let mut recommendations: Vec<Recommendation> = reply
        .recommendations
        .into_iter()
        .map(|r| Recommendation {
            title: r.title,
            detail: r.detail,
            priority: parse_priority(&r.priority),
        })
        .collect();
    recommendations.sort_by_key(|r| r.priority);

    Ok(AiSummary {
        summary: reply.summary,
        recommendations,
        generated_by: "llm".to_string(),
        generated_at: Utc::now(),
    })
}

/// Entry point used by the HTTP layer; never fails.
pub struct SummaryService {
    llm: Option<Arc<dyn Summarizer>>,
}

impl SummaryService {
    pub fn new(llm: Option<Arc<dyn Summarizer>>) -> Self {
        Self { llm }
    }

    pub async fn summarize(&self, metrics: &[PeriodMetrics]) -> AiSummary {
        if let Some(llm) = &self.llm {
            match llm.summarize(metrics).await {
                Ok(summary) => {
                    info!(
                        recommendations = summary.recommendations.len(),
                        "LLM summary generated"
                    );
                    return summary;
                }
                Err(e) => warn!("LLM summary failed, using rule-based summary: {e}"),
            }
        }

        rules::rule_based_summary(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _metrics: &[PeriodMetrics]) -> Result<AiSummary, SummaryError> {
            Err(SummaryError::Reply("offline".to_string()))
        }
    }

    struct CannedSummarizer;

    #[async_trait]
    impl Summarizer for CannedSummarizer {
        async fn summarize(&self, _metrics: &[PeriodMetrics]) -> Result<AiSummary, SummaryError> {
            parse_reply(r#"{"summary": "All good.", "recommendations": []}"#)
        }
    }

    #[test]
    fn parses_fenced_reply_and_normalizes_priorities() {
        let content = "```json\n{\"summary\": \"Strong quarter.\", \"recommendations\": [\
            {\"title\": \"Keep it up\", \"detail\": \"\", \"priority\": \"Low\"},\
            {\"title\": \"Follow up consults\", \"detail\": \"Call within 48h\", \"priority\": \"HIGH\"},\
            {\"title\": \"Review spend\"}]}\n```";

        let summary = parse_reply(content).unwrap();
        assert_eq!(summary.summary, "Strong quarter.");
        assert_eq!(summary.generated_by, "llm");

        let priorities: Vec<Priority> = summary.recommendations.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![Priority::High, Priority::Medium, Priority::Low]);
        assert_eq!(summary.recommendations[0].title, "Follow up consults");
    }

    #[test]
    fn rejects_non_json_reply() {
        assert!(matches!(
            parse_reply("Sorry, I cannot help with that."),
            Err(SummaryError::Reply(_))
        ));
    }

    #[test]
    fn request_body_carries_model_and_metrics() {
        let llm = LlmSummarizer::new(reqwest::Client::new(), "http://localhost", "key", "test-model");
        let body = llm.request_body(&[]).unwrap();

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][1]["content"], "[]");
    }

    #[tokio::test]
    async fn falls_back_to_rules_when_llm_fails() {
        let service = SummaryService::new(Some(Arc::new(FailingSummarizer)));
        let summary = service.summarize(&[]).await;
        assert_eq!(summary.generated_by, rules::GENERATED_BY);
    }

    #[tokio::test]
    async fn uses_rules_without_llm() {
        let summary = SummaryService::new(None).summarize(&[]).await;
        assert_eq!(summary.generated_by, "rules");
    }

    #[tokio::test]
    async fn prefers_llm_when_it_answers() {
        let service = SummaryService::new(Some(Arc::new(CannedSummarizer)));
        let summary = service.summarize(&[]).await;
        assert_eq!(summary.generated_by, "llm");
        assert_eq!(summary.summary, "All good.");
    }
}
