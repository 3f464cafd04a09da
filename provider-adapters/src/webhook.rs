//! Inbound webhook normalisation (spec §4.4 "Webhook/event ingestion").

use crate::errors::Result;
use crate::git_providers::types::{ChangeRequestId, CommentSide, ProviderKind};
use crate::git_providers::{GiteaClient, ProviderClient};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// A provider-agnostic position anchor for a webhook-carried comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedPosition {
    pub file: String,
    pub line: u32,
    pub side: CommentSide,
}

/// Normalised shape every webhook payload is converted into before it
/// reaches the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedWebhookEvent {
    pub provider: ProviderKind,
    pub repository: String,
    pub merge_request: ChangeRequestId,
    pub comment: Option<String>,
    pub position: Option<UnifiedPosition>,
    /// Populated by the Gitea metadata-enrichment scan when the inbound
    /// payload omitted thread context.
    pub review_id: Option<String>,
}

/// Parses the raw provider-specific JSON body into a [`UnifiedWebhookEvent`].
///
/// `kind` is the `{provider}` path segment from `POST /webhooks/{provider}/{kind}`.
pub fn normalize(provider: ProviderKind, kind: &str, body: &Value) -> Result<UnifiedWebhookEvent> {
    debug!(?provider, kind, "normalizing inbound webhook");
    match provider {
        ProviderKind::GitLab => normalize_gitlab(body),
        ProviderKind::GitHub => normalize_github(body),
        ProviderKind::Gitea => normalize_gitea(body),
    }
}

fn normalize_gitlab(body: &Value) -> Result<UnifiedWebhookEvent> {
    let project = body["project"]["path_with_namespace"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let iid = body["merge_request"]["iid"].as_u64().unwrap_or_default();
    let comment = body["object_attributes"]["note"]
        .as_str()
        .map(|s| s.to_string());
    let position = body["object_attributes"]["position"].as_object().map(|p| {
        let line = p
            .get("new_line")
            .and_then(|v| v.as_u64())
            .or_else(|| p.get("old_line").and_then(|v| v.as_u64()))
            .unwrap_or(0) as u32;
        let side = if p.contains_key("new_line") {
            CommentSide::Right
        } else {
            CommentSide::Left
        };
        UnifiedPosition {
            file: p
                .get("new_path")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            line,
            side,
        }
    });

    Ok(UnifiedWebhookEvent {
        provider: ProviderKind::GitLab,
        repository: project,
        merge_request: ChangeRequestId { project: body["project"]["path_with_namespace"].as_str().unwrap_or_default().to_string(), iid },
        comment,
        position,
        review_id: None,
    })
}

fn normalize_github(body: &Value) -> Result<UnifiedWebhookEvent> {
    let project = body["repository"]["full_name"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let iid = body["pull_request"]["number"]
        .as_u64()
        .or_else(|| body["issue"]["number"].as_u64())
        .unwrap_or_default();
    let comment = body["comment"]["body"].as_str().map(|s| s.to_string());
    let position = body["comment"]["line"].as_u64().map(|line| UnifiedPosition {
        file: body["comment"]["path"].as_str().unwrap_or_default().to_string(),
        line: line as u32,
        side: match body["comment"]["side"].as_str() {
            Some("LEFT") => CommentSide::Left,
            _ => CommentSide::Right,
        },
    });

    Ok(UnifiedWebhookEvent {
        provider: ProviderKind::GitHub,
        repository: project.clone(),
        merge_request: ChangeRequestId { project, iid },
        comment,
        position,
        review_id: None,
    })
}

fn normalize_gitea(body: &Value) -> Result<UnifiedWebhookEvent> {
    let project = body["repository"]["full_name"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let iid = body["pull_request"]["number"]
        .as_u64()
        .or_else(|| body["issue"]["number"].as_u64())
        .unwrap_or_default();
    let comment = body["comment"]["body"].as_str().map(|s| s.to_string());

    // Gitea reply webhooks commonly omit position/thread context entirely;
    // `enrich_gitea_reply` fills it in afterwards.
    Ok(UnifiedWebhookEvent {
        provider: ProviderKind::Gitea,
        repository: project.clone(),
        merge_request: ChangeRequestId { project, iid },
        comment,
        position: None,
        review_id: None,
    })
}

/// One inline comment as surfaced by Gitea's reviews/comments endpoints,
/// used only by the enrichment scan below.
#[derive(Debug, Clone, Deserialize)]
struct GiteaInlineComment {
    id: u64,
    path: Option<String>,
    position: Option<u32>,
    created_at: chrono::DateTime<chrono::Utc>,
}

/// Metadata-enrichment scan (spec §4.4, §9 open question): when a Gitea
/// reply webhook carries no thread context, list the PR's review comments
/// and pick the latest inline one as the anchor. Ties are broken by forge
/// comment id ascending, after `created_at` ascending (DESIGN.md §10.7).
pub async fn enrich_gitea_reply(
    client: &GiteaClient,
    event: &mut UnifiedWebhookEvent,
    owner: &str,
    repo: &str,
) -> Result<()> {
    if event.position.is_some() {
        return Ok(());
    }

    let comments = client
        .list_review_comments(owner, repo, event.merge_request.iid)
        .await?;

    let chosen = comments
        .into_iter()
        .filter(|(_, c)| c.path.as_deref().is_some_and(|p| !p.is_empty()) && c.position.unwrap_or(0) > 0)
        .max_by(|(_, a), (_, b)| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    if let Some((review_id, c)) = chosen {
        event.position = Some(UnifiedPosition {
            file: c.path.unwrap_or_default(),
            line: c.position.unwrap_or(0),
            side: CommentSide::Right,
        });
        event.review_id = Some(review_id.to_string());
    }

    Ok(())
}

impl GiteaClient {
    /// Lists inline review comments for a PR (used by [`enrich_gitea_reply`]).
    async fn list_review_comments(
        &self,
        owner: &str,
        repo: &str,
        iid: u64,
    ) -> Result<Vec<(u64, GiteaInlineComment)>> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}/reviews",
            self.base_api(),
            owner,
            repo,
            iid
        );
        let reviews: Vec<Value> = self
            .http_client()
            .get(url)
            .header("Authorization", format!("token {}", self.token()))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut out = Vec::new();
        for review in reviews {
            if let Some(id) = review["id"].as_u64() {
                let comments_url = format!(
                    "{}/repos/{}/{}/pulls/{}/reviews/{}/comments",
                    self.base_api(),
                    owner,
                    repo,
                    iid,
                    id
                );
                let batch: Vec<GiteaInlineComment> = self
                    .http_client()
                    .get(comments_url)
                    .header("Authorization", format!("token {}", self.token()))
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                out.extend(batch.into_iter().map(|c| (id, c)));
            }
        }
        Ok(out)
    }
}

/// Facade-level helper so callers do not need to branch on provider kind
/// before deciding whether enrichment applies.
pub async fn enrich_if_needed(
    client: &ProviderClient,
    event: &mut UnifiedWebhookEvent,
) -> Result<()> {
    if let ProviderClient::Gitea(c) = client {
        let mut parts = event.repository.splitn(2, '/');
        let owner = parts.next().unwrap_or_default();
        let repo = parts.next().unwrap_or_default();
        enrich_gitea_reply(c, event, owner, repo).await?;
    }
    Ok(())
}
