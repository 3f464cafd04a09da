//! `POST /webhooks/{provider}/{kind}` (spec §6, §4.4 webhook ingestion).

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use orchestrator::review::SourceKind;
use orchestrator::SubmitRequest;
use provider_adapters::{webhook, ProviderClient, ProviderKind};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::core::app_state::AppState;
use crate::core::http::response_envelope::ApiResponse;
use crate::error_handler::AppError;

fn parse_provider(raw: &str) -> Result<ProviderKind, AppError> {
    match raw {
        "gitlab" => Ok(ProviderKind::GitLab),
        "github" => Ok(ProviderKind::GitHub),
        "gitea" => Ok(ProviderKind::Gitea),
        other => Err(AppError::BadRequest(format!("unknown provider {other}"))),
    }
}

#[instrument(name = "webhooks::receive", skip(state, body), fields(provider, kind))]
pub async fn receive(
    State(state): State<Arc<AppState>>,
    Path((provider, kind)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let provider_kind = match parse_provider(&provider) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let mut event = match webhook::normalize(provider_kind, &kind, &body) {
        Ok(e) => e,
        Err(e) => return AppError::from(e).into_response(),
    };

    let cfg = provider_adapters::ProviderConfig {
        kind: provider_kind,
        ..state.provider_cfg.clone()
    };
    let client = match ProviderClient::from_config(cfg) {
        Ok(c) => c,
        Err(e) => return AppError::from(e).into_response(),
    };
    if let Err(e) = webhook::enrich_if_needed(&client, &mut event).await {
        warn!(error = %e, "webhook enrichment failed, proceeding with raw event");
    }

    info!(
        provider = ?event.provider,
        repository = %event.repository,
        "webhook event normalised"
    );

    // A webhook event re-triggers the full pipeline for its merge/pull
    // request: fetch its current diff and submit it as a new review.
    // Anchoring a reply comment to an in-flight review (rather than
    // starting a fresh one) is left as an open question in DESIGN.md;
    // every event lands here as a new submission in the meantime.
    let bundle = match client.fetch_bundle(&event.merge_request).await {
        Ok(b) => b,
        Err(e) => return AppError::from(e).into_response(),
    };
    if bundle.changes.files.is_empty() {
        return ApiResponse::success(()).into_response_with_status(StatusCode::ACCEPTED);
    }

    let source_kind = match provider_kind {
        ProviderKind::GitLab => SourceKind::Mr,
        ProviderKind::GitHub | ProviderKind::Gitea => SourceKind::Pr,
    };
    let target_ref = format!("{}!{}", event.merge_request.project, event.merge_request.iid);
    let req = SubmitRequest {
        org_id: "default".into(),
        initiator: format!("webhook:{:?}", event.provider).to_lowercase(),
        source_kind,
        target_ref: target_ref.clone(),
        friendly_name: target_ref,
        cr_id: event.merge_request.clone(),
        files: bundle.changes.files,
    };

    let outcome = match state.orchestrator.submit_review(req).await {
        Ok(o) => o,
        Err(e) => return AppError::from(e).into_response(),
    };
    info!(review_id = %outcome.review_id, "review submitted from webhook event");

    let orchestrator = state.orchestrator.clone();
    let provider_cfg = state.provider_cfg.clone();
    let cr_id = event.merge_request.clone();
    let review_id = outcome.review_id;
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run_review(review_id, cr_id, provider_cfg).await {
            warn!(review_id = %review_id, error = %e, "webhook-triggered review run failed");
        }
    });

    ApiResponse::success(()).into_response_with_status(StatusCode::ACCEPTED)
}
