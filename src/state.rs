use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use crate::{
    analytics::Aggregator,
    auth::LoginCache,
    config::Config,
    connectors::{AccountingClient, PracticeClient, http_client},
    db::cache::PgCache,
    summarizer::{LlmSummarizer, Summarizer, SummaryService},
};

pub struct State {
    pub config: Config,
    pub pool: PgPool,
    pub aggregator: Aggregator,
    pub summaries: SummaryService,
    pub logins: LoginCache,
}

impl State {
    pub fn new(config: Config, pool: PgPool) -> Arc<Self> {
        let client = http_client(config.request_timeout);

        let practice = PracticeClient::new(
            client.clone(),
            &config.practice.url,
            config.practice.api_key.clone(),
        );
        let accounting = AccountingClient::new(
            client.clone(),
            &config.accounting.base_url,
            &config.accounting.token_url,
            config.accounting.client_id.clone(),
            config.accounting.client_secret.clone(),
        );
        let aggregator = Aggregator::new(
            Arc::new(practice),
            Arc::new(accounting),
            Arc::new(PgCache::new(pool.clone())),
            config.cache_ttl,
        );

        let llm: Option<Arc<dyn Summarizer>> = match (&config.llm.url, &config.llm.api_key) {
            (Some(url), Some(api_key)) => {
                info!(model = %config.llm.model, "LLM summaries enabled");
                Some(Arc::new(LlmSummarizer::new(client, url, api_key, &config.llm.model)))
            }
            _ => {
                info!("LLM not configured, summaries will be rule-based");
                None
            }
        };

        Arc::new(Self {
            config,
            pool,
            aggregator,
            summaries: SummaryService::new(llm),
            logins: LoginCache::default(),
        })
    }
}
