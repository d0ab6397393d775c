use std::sync::Arc;

use axum::{
    Json,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;

use crate::{
    auth::{self, AuthUser, IssuedSession},
    error::AppError,
    state::State,
};

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

pub async fn login(
    AxumState(state): AxumState<Arc<State>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<IssuedSession>, AppError> {
    let session = auth::login(&state, &payload.email, &payload.password).await?;
    Ok(Json(session))
}

pub async fn logout(
    AxumState(state): AxumState<Arc<State>>,
    _user: AuthUser,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let token = auth::bearer_token(&headers).ok_or(AppError::Unauthorized)?;
    auth::logout(&state, token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(user: AuthUser) -> Json<AuthUser> {
    Json(user)
}
