use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State as AxumState},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use crate::{
    analytics::check_period_count,
    auth::AuthUser,
    db::cache,
    error::AppError,
    models::{AiSummary, Period, PeriodMetrics},
    state::State,
};

#[derive(Deserialize)]
pub struct AnalyticsRequest {
    periods: Vec<Period>,
    #[serde(default)]
    force_refresh: bool,
}

#[derive(Deserialize)]
pub struct SummaryRequest {
    metrics: Vec<PeriodMetrics>,
}

pub async fn compare_periods(
    AxumState(state): AxumState<Arc<State>>,
    user: AuthUser,
    Json(payload): Json<AnalyticsRequest>,
) -> Result<Json<Vec<PeriodMetrics>>, AppError> {
    let results = state
        .aggregator
        .compare(&state.pool, &payload.periods, payload.force_refresh)
        .await?;

    info!(
        user_id = %user.user_id,
        periods = results.len(),
        force_refresh = payload.force_refresh,
        "Computed period analytics"
    );
    Ok(Json(results))
}

pub async fn summarize(
    AxumState(state): AxumState<Arc<State>>,
    _user: AuthUser,
    Json(payload): Json<SummaryRequest>,
) -> Result<Json<AiSummary>, AppError> {
    check_period_count(payload.metrics.len())?;
    Ok(Json(state.summaries.summarize(&payload.metrics).await))
}

pub async fn clear_cache(
    AxumState(state): AxumState<Arc<State>>,
    _user: AuthUser,
    Path(location_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let cleared = cache::clear_location_cache(&state.pool, location_id).await?;
    info!(%location_id, cleared, "Cleared analytics cache");
    Ok(Json(json!({ "cleared": cleared })))
}
