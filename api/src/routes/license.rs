//! `POST /license/update`, `GET /license/status` (spec §6, §4.5).

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::core::app_state::{gate_state_from_status, AppState};
use crate::core::http::response_envelope::ApiResponse;
use crate::error_handler::AppError;

#[derive(Debug, Deserialize)]
pub struct LicenseUpdateRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct LicenseStatusResponse {
    pub status: String,
    pub unlimited: bool,
    pub expires_at: Option<String>,
    pub days_remaining: Option<i64>,
}

impl From<licensing::LicenceState> for LicenseStatusResponse {
    fn from(state: licensing::LicenceState) -> Self {
        let days_remaining = state.days_remaining(Utc::now());
        Self {
            status: format!("{:?}", state.status).to_lowercase(),
            unlimited: state.unlimited,
            expires_at: state.expires_at.map(|t| t.to_rfc3339()),
            days_remaining,
        }
    }
}

#[instrument(name = "license::update", skip(state, body))]
pub async fn update(State(state): State<Arc<AppState>>, Json(body): Json<LicenseUpdateRequest>) -> Response {
    match state.licence.enter_license(&body.token).await {
        Ok(license_state) => {
            persist_snapshot(&state, &license_state).await;
            let gate_status = format!("{:?}", license_state.status).to_lowercase();
            state.orchestrator.licence.set_state(gate_state_from_status(&gate_status));
            ApiResponse::success(LicenseStatusResponse::from(license_state))
                .into_response_with_status(StatusCode::OK)
        }
        Err(e) => AppError::from(e).into_response(),
    }
}

#[instrument(name = "license::status", skip(state))]
pub async fn status(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.licence.snapshot().await;
    ApiResponse::success(LicenseStatusResponse::from(snapshot)).into_response_with_status(StatusCode::OK)
}

/// Mirrors the in-memory snapshot into the `license_state` table so other
/// processes (and restarts, once a restore path exists) can read it
/// without talking to the licence service directly.
async fn persist_snapshot(state: &Arc<AppState>, license_state: &licensing::LicenceState) {
    let pool = state.pool.clone();
    let status = format!("{:?}", license_state.status).to_lowercase();
    let subject = license_state.subject.clone();
    let seats = license_state.seat_count.map(|s| s as i32);
    let expires_at = license_state.expires_at.map(|t| t.to_rfc3339());
    let last_validated_at = license_state
        .last_validated_at
        .unwrap_or_else(Utc::now)
        .to_rfc3339();

    let result = tokio::task::spawn_blocking(move || -> persistence::Result<()> {
        let mut conn = pool.get().map_err(persistence::PersistenceError::Pool)?;
        persistence::license_state::upsert(
            &mut conn,
            &status,
            subject.as_deref(),
            seats,
            expires_at.as_deref(),
            &last_validated_at,
        )
    })
    .await;

    if let Ok(Err(e)) = result {
        tracing::warn!(error = %e, "failed to persist licence state snapshot");
    }
}
