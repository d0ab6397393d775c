pub mod analytics;
pub mod auth;
pub mod costs;
pub mod locations;
pub mod reports;
pub mod sessions;

use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{delete, get, post},
};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::state::State;

pub fn router(state: Arc<State>) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    match HeaderValue::from_str(&state.config.frontend_origin) {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(e) => warn!("Ignoring invalid FRONTEND_ORIGIN: {e}"),
    }

    Router::new()
        .route("/health", get(health))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route(
            "/api/locations",
            get(locations::list_locations).post(locations::create_location),
        )
        .route(
            "/api/locations/{id}",
            get(locations::get_location)
                .put(locations::update_location)
                .delete(locations::deactivate_location),
        )
        .route("/api/costs", get(costs::list_costs).put(costs::upsert_cost))
        .route("/api/costs/{id}", delete(costs::delete_cost))
        .route("/api/analytics", post(analytics::compare_periods))
        .route("/api/analytics/summary", post(analytics::summarize))
        .route(
            "/api/analytics/cache/{location_id}",
            delete(analytics::clear_cache),
        )
        .route(
            "/api/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/api/sessions/{id}",
            get(sessions::get_session)
                .put(sessions::update_session)
                .delete(sessions::delete_session),
        )
        .route("/api/sessions/{id}/reports", post(reports::create_report))
        .route("/api/reports", get(reports::list_reports))
        .route("/api/reports/{id}", get(reports::get_report))
        .route("/api/reports/{id}/download", get(reports::download_report))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
