use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State as AxumState},
    http::{
        StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    db::{reports, sessions},
    error::AppError,
    models::{ReportSummary, ReportType},
    report,
    state::State,
};

#[derive(Deserialize)]
pub struct CreateReport {
    name: Option<String>,
    report_type: ReportType,
}

pub async fn create_report(
    AxumState(state): AxumState<Arc<State>>,
    user: AuthUser,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<CreateReport>,
) -> Result<(StatusCode, Json<ReportSummary>), AppError> {
    let session = sessions::get_session(&state.pool, user.user_id, session_id)
        .await?
        .ok_or(AppError::NotFound("Session"))?;

    let name = payload
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| session.name.clone());
    let data = report::render(&session, payload.report_type);

    let summary = reports::create_report(
        &state.pool,
        user.user_id,
        session.id,
        &name,
        payload.report_type,
        &data,
    )
    .await?;
    info!(
        report_id = %summary.id,
        session_id = %session.id,
        report_type = summary.report_type.as_str(),
        size = summary.size_bytes,
        "Report generated"
    );

    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn list_reports(
    AxumState(state): AxumState<Arc<State>>,
    user: AuthUser,
) -> Result<Json<Vec<ReportSummary>>, AppError> {
    Ok(Json(reports::list_reports(&state.pool, user.user_id).await?))
}

pub async fn get_report(
    AxumState(state): AxumState<Arc<State>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ReportSummary>, AppError> {
    reports::get_report(&state.pool, user.user_id, id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("Report"))
}

pub async fn download_report(
    AxumState(state): AxumState<Arc<State>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let (summary, data) = reports::report_data(&state.pool, user.user_id, id)
        .await?
        .ok_or(AppError::NotFound("Report"))?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        report::file_name(&summary.name, summary.report_type)
    );

    Ok((
        [
            (CONTENT_TYPE, summary.report_type.content_type().to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}
