use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State as AxumState},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    analytics::period::validate_month,
    auth::AuthUser,
    db::{costs, locations},
    error::AppError,
    models::{AcquisitionCost, ReferralType},
    state::State,
};

#[derive(Deserialize)]
pub struct CostQuery {
    location_id: Option<Uuid>,
    period: Option<String>,
}

#[derive(Deserialize)]
pub struct UpsertCost {
    location_id: Uuid,
    referral_type: ReferralType,
    period: String,
    cost: f64,
}

pub async fn list_costs(
    AxumState(state): AxumState<Arc<State>>,
    _user: AuthUser,
    Query(query): Query<CostQuery>,
) -> Result<Json<Vec<AcquisitionCost>>, AppError> {
    let period = query.period.as_deref().map(validate_month).transpose()?;
    let rows = costs::list_costs(&state.pool, query.location_id, period.as_deref()).await?;
    Ok(Json(rows))
}

pub async fn upsert_cost(
    AxumState(state): AxumState<Arc<State>>,
    user: AuthUser,
    Json(payload): Json<UpsertCost>,
) -> Result<Json<AcquisitionCost>, AppError> {
    let period = validate_month(&payload.period)?;
    let cost = costs::validate_amount(payload.cost).map_err(AppError::BadRequest)?;

    if locations::find_location(&state.pool, payload.location_id).await?.is_none() {
        return Err(AppError::NotFound("Location"));
    }

    let row = costs::upsert_cost(
        &state.pool,
        payload.location_id,
        payload.referral_type,
        &period,
        cost,
    )
    .await?;
    info!(
        user_id = %user.user_id,
        location_id = %row.location_id,
        referral_type = %row.referral_type,
        period = %row.period,
        "Saved acquisition cost"
    );

    Ok(Json(row))
}

pub async fn delete_cost(
    AxumState(state): AxumState<Arc<State>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if costs::delete_cost(&state.pool, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Acquisition cost"))
    }
}
