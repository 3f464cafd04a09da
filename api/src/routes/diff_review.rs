//! `POST /diff-review`, `GET /diff-review/{id}`,
//! `GET /diff-review/{id}/events`, `GET /review` (spec §6).

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use orchestrator::review::{ReviewId, SourceKind};
use orchestrator::SubmitRequest;
use provider_adapters::{parser, ChangeRequestId};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::core::app_state::AppState;
use crate::core::http::response_envelope::ApiResponse;
use crate::error_handler::AppError;

fn org_id(headers: &HeaderMap) -> String {
    headers
        .get("X-Org-Id")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("default")
        .to_string()
}

fn initiator(headers: &HeaderMap) -> String {
    headers
        .get("X-Initiator")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("lrc")
        .to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DiffSource {
    Staged,
    Working,
    Range,
    File,
    Remote,
}

#[derive(Debug, Deserialize)]
pub struct DiffReviewRequest {
    pub repo_name: String,
    #[allow(dead_code)]
    pub diff_source: DiffSource,
    pub diff: String,
    #[allow(dead_code)]
    pub range: Option<String>,
    /// Accepted but not verified — real request authentication is resolved
    /// upstream of this crate (out of scope here, see spec's Non-goals).
    #[allow(dead_code)]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitReviewResponse {
    pub review_id: ReviewId,
}

#[instrument(name = "diff_review::submit", skip(state, headers, body), fields(repo = %body.repo_name))]
pub async fn submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<DiffReviewRequest>,
) -> Response {
    match submit_inner(state, headers, body).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn submit_inner(
    state: Arc<AppState>,
    headers: HeaderMap,
    body: DiffReviewRequest,
) -> Result<Response, AppError> {
    let files = parser::split_unified_diff_to_files(&body.diff)
        .map_err(|e| AppError::BadRequest(format!("invalid diff: {e}")))?;
    if files.is_empty() {
        return Err(AppError::BadRequest("diff contained no file sections".into()));
    }

    let cr_id = ChangeRequestId { project: body.repo_name.clone(), iid: 0 };
    let req = SubmitRequest {
        org_id: org_id(&headers),
        initiator: initiator(&headers),
        source_kind: SourceKind::Diff,
        target_ref: body.repo_name.clone(),
        friendly_name: body.repo_name.clone(),
        cr_id: cr_id.clone(),
        files,
    };

    let outcome = state.orchestrator.submit_review(req).await?;
    info!(review_id = %outcome.review_id, "review submitted");

    let orchestrator = state.orchestrator.clone();
    let provider_cfg = state.provider_cfg.clone();
    let review_id = outcome.review_id;
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run_review(review_id, cr_id, provider_cfg).await {
            tracing::warn!(review_id = %review_id, error = %e, "review run failed");
        }
    });

    let resp: ApiResponse<SubmitReviewResponse> =
        ApiResponse::success(SubmitReviewResponse { review_id });
    Ok(resp.into_response_with_status(StatusCode::ACCEPTED))
}

#[instrument(name = "diff_review::get", skip(state))]
pub async fn get(State(state): State<Arc<AppState>>, Path(id): Path<ReviewId>) -> Response {
    match state.orchestrator.get_review(id).await {
        Ok(review) => ApiResponse::success(review).into_response_with_status(StatusCode::OK),
        Err(e) => AppError::from(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: u64,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

#[instrument(name = "diff_review::events", skip(state))]
pub async fn events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ReviewId>,
    Query(q): Query<EventsQuery>,
) -> Response {
    match state.orchestrator.get_events(id, q.since, q.limit).await {
        Ok(events) => ApiResponse::success(events).into_response_with_status(StatusCode::OK),
        Err(e) => AppError::from(e).into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct ReviewSummary {
    pub review_id: String,
    pub friendly_name: String,
    pub status: String,
    pub created_at: String,
}

#[instrument(name = "diff_review::most_recent", skip(state, headers))]
pub async fn most_recent(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let org = org_id(&headers);
    let pool = state.pool.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| AppError::Http {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "DB_POOL",
            message: e.to_string(),
        })?;
        persistence::reviews::most_recent_in_flight(&mut conn, &org).map_err(AppError::from)
    })
    .await;

    match result {
        Ok(Ok(Some(row))) => ApiResponse::success(ReviewSummary {
            review_id: row.id,
            friendly_name: row.friendly_name,
            status: row.status,
            created_at: row.created_at,
        })
        .into_response_with_status(StatusCode::OK),
        Ok(Ok(None)) => {
            ApiResponse::<()>::success(()).into_response_with_status(StatusCode::NO_CONTENT)
        }
        Ok(Err(e)) => e.into_response(),
        Err(e) => AppError::Http {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "JOIN_ERROR",
            message: e.to_string(),
        }
        .into_response(),
    }
}
