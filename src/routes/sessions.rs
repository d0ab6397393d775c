use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State as AxumState},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    analytics::period::validate_period,
    auth::AuthUser,
    db::sessions::{self, SessionInput},
    error::AppError,
    models::{AiSummary, Period, Session},
    state::State,
};

#[derive(Deserialize)]
pub struct SessionPayload {
    name: String,
    #[serde(default)]
    periods: Vec<Period>,
    #[serde(default = "empty_array")]
    data: Value,
    #[serde(default)]
    ai_summary: Option<AiSummary>,
    #[serde(default = "empty_object")]
    metadata: Value,
}

fn empty_array() -> Value {
    json!([])
}

fn empty_object() -> Value {
    json!({})
}

impl SessionPayload {
    fn into_input(self) -> Result<SessionInput, AppError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("session name must not be empty".to_string()));
        }
        for period in &self.periods {
            validate_period(period)?;
        }
        if !self.metadata.is_object() {
            return Err(AppError::BadRequest("metadata must be a JSON object".to_string()));
        }

        Ok(SessionInput {
            name,
            periods: self.periods,
            data: self.data,
            ai_summary: self.ai_summary,
            metadata: self.metadata,
        })
    }
}

pub async fn list_sessions(
    AxumState(state): AxumState<Arc<State>>,
    user: AuthUser,
) -> Result<Json<Vec<Session>>, AppError> {
    Ok(Json(sessions::list_sessions(&state.pool, user.user_id).await?))
}

pub async fn create_session(
    AxumState(state): AxumState<Arc<State>>,
    user: AuthUser,
    Json(payload): Json<SessionPayload>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let input = payload.into_input()?;
    let session = sessions::create_session(&state.pool, user.user_id, &input).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_session(
    AxumState(state): AxumState<Arc<State>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Session>, AppError> {
    sessions::get_session(&state.pool, user.user_id, id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("Session"))
}

pub async fn update_session(
    AxumState(state): AxumState<Arc<State>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SessionPayload>,
) -> Result<Json<Session>, AppError> {
    let input = payload.into_input()?;
    sessions::update_session(&state.pool, user.user_id, id, &input)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("Session"))
}

pub async fn delete_session(
    AxumState(state): AxumState<Arc<State>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if sessions::delete_session(&state.pool, user.user_id, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Session"))
    }
}
