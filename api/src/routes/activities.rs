//! `GET /activities?limit=&offset=` (spec §6, §4.6).

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::core::app_state::AppState;
use crate::core::http::response_envelope::ApiResponse;
use crate::error_handler::AppError;

#[derive(Debug, Deserialize)]
pub struct ActivitiesQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub review_id: Option<String>,
    pub kind: String,
    pub message: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ActivitiesResponse {
    pub activities: Vec<ActivityEntry>,
    pub total_count: i64,
    pub has_more: bool,
}

#[instrument(name = "activities::list", skip(state, headers))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<ActivitiesQuery>,
) -> Response {
    let org = headers
        .get("X-Org-Id")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("default")
        .to_string();
    let pool = state.pool.clone();

    let result = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| AppError::Http {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "DB_POOL",
            message: e.to_string(),
        })?;
        persistence::activities::list(&mut conn, &org, q.limit, q.offset).map_err(AppError::from)
    })
    .await;

    match result {
        Ok(Ok(page)) => ApiResponse::success(ActivitiesResponse {
            activities: page
                .items
                .into_iter()
                .map(|r| ActivityEntry {
                    id: r.id,
                    review_id: r.review_id,
                    kind: r.kind,
                    message: r.message,
                    created_at: r.created_at,
                })
                .collect(),
            total_count: page.total_count,
            has_more: page.has_more,
        })
        .into_response_with_status(StatusCode::OK),
        Ok(Err(e)) => e.into_response(),
        Err(e) => AppError::Http {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "JOIN_ERROR",
            message: e.to_string(),
        }
        .into_response(),
    }
}
