//! `GET /api/v1/providers/{kind}/repos` — repo discovery (SPEC_FULL.md §10.6 supplement).

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use provider_adapters::{ProviderClient, ProviderConfig, ProviderKind, RepoSummary};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::core::app_state::AppState;
use crate::core::http::response_envelope::ApiResponse;
use crate::error_handler::AppError;

#[derive(Debug, Deserialize)]
pub struct ReposQuery {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    50
}

#[derive(Debug, Serialize)]
pub struct ReposResponse {
    pub repos: Vec<RepoSummary>,
}

#[instrument(name = "discovery::repos", skip(state), fields(kind = %kind))]
pub async fn repos(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(q): Query<ReposQuery>,
) -> Response {
    let provider_kind = match kind.as_str() {
        "gitlab" => ProviderKind::GitLab,
        "github" => ProviderKind::GitHub,
        "gitea" => ProviderKind::Gitea,
        other => return AppError::BadRequest(format!("unknown provider {other}")).into_response(),
    };

    let cfg = ProviderConfig {
        kind: provider_kind,
        ..state.provider_cfg.clone()
    };

    let client = match ProviderClient::from_config(cfg) {
        Ok(c) => c,
        Err(e) => return AppError::from(e).into_response(),
    };

    match client.discover_repos(q.page_size).await {
        Ok(repos) => ApiResponse::success(ReposResponse { repos }).into_response_with_status(StatusCode::OK),
        Err(e) => AppError::from(e).into_response(),
    }
}
