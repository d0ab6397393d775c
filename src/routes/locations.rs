use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State as AxumState},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    db::locations,
    error::{AppError, conflict_on_unique},
    models::Location,
    state::State,
};

#[derive(Deserialize)]
pub struct CreateLocation {
    name: String,
    external_id: String,
}

#[derive(Deserialize)]
pub struct UpdateLocation {
    name: Option<String>,
    external_id: Option<String>,
    active: Option<bool>,
}

fn required(value: &str, field: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

pub async fn list_locations(
    AxumState(state): AxumState<Arc<State>>,
    _user: AuthUser,
) -> Json<Vec<Location>> {
    Json(locations::list_locations_or_samples(&state.pool).await)
}

pub async fn get_location(
    AxumState(state): AxumState<Arc<State>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Location>, AppError> {
    Ok(Json(locations::get_location_or_sample(&state.pool, id).await?))
}

pub async fn create_location(
    AxumState(state): AxumState<Arc<State>>,
    _user: AuthUser,
    Json(payload): Json<CreateLocation>,
) -> Result<(StatusCode, Json<Location>), AppError> {
    let name = required(&payload.name, "name")?;
    let external_id = required(&payload.external_id, "external_id")?;

    let location = locations::create_location(&state.pool, &name, &external_id)
        .await
        .map_err(|e| conflict_on_unique(e, "a location with this external_id already exists"))?;

    Ok((StatusCode::CREATED, Json(location)))
}

pub async fn update_location(
    AxumState(state): AxumState<Arc<State>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocation>,
) -> Result<Json<Location>, AppError> {
    let name = payload.name.as_deref().map(|n| required(n, "name")).transpose()?;
    let external_id = payload
        .external_id
        .as_deref()
        .map(|e| required(e, "external_id"))
        .transpose()?;

    let location = locations::update_location(
        &state.pool,
        id,
        name.as_deref(),
        external_id.as_deref(),
        payload.active,
    )
    .await
    .map_err(|e| conflict_on_unique(e, "a location with this external_id already exists"))?
    .ok_or(AppError::NotFound("Location"))?;

    Ok(Json(location))
}

pub async fn deactivate_location(
    AxumState(state): AxumState<Arc<State>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if locations::deactivate_location(&state.pool, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Location"))
    }
}
