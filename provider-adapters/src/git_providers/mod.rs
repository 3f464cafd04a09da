//! Provider facade without async-trait or dynamic trait objects.
//!
//! Exposes an enum `ProviderClient` that wraps concrete implementations for
//! each Git provider, giving a uniform interface for fetching change
//! requests, posting comments, and discovering repositories.

pub mod gitea;
pub mod github;
pub mod gitlab;
pub mod types;

pub use types::*;

use crate::errors::Result;
use tracing::debug;

/// Runtime configuration for any provider client, usually injected from
/// environment or higher-level application settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// API base, e.g. "https://gitlab.com/api/v4" or "https://api.github.com".
    pub base_api: String,
    /// Access token for the provider (PAT or app token).
    pub token: String,
}

/// Concrete provider client with enum dispatch — no `Box<dyn Trait>`.
#[derive(Debug, Clone)]
pub enum ProviderClient {
    GitLab(gitlab::GitLabClient),
    GitHub(github::GitHubClient),
    Gitea(gitea::GiteaClient),
}

impl ProviderClient {
    pub fn from_config(cfg: ProviderConfig) -> Result<Self> {
        debug!(
            "Initializing provider client: kind={:?}, base_api={}",
            cfg.kind, cfg.base_api
        );

        let client = reqwest::Client::builder()
            .user_agent("livereview-provider-adapters/0.1")
            .cookie_store(true)
            .build()?;

        let client = match cfg.kind {
            ProviderKind::GitLab => {
                ProviderClient::GitLab(gitlab::GitLabClient::new(client, cfg.base_api, cfg.token))
            }
            ProviderKind::GitHub => {
                ProviderClient::GitHub(github::GitHubClient::new(client, cfg.base_api, cfg.token))
            }
            ProviderKind::Gitea => {
                ProviderClient::Gitea(gitea::GiteaClient::new(client, cfg.base_api, cfg.token))
            }
        };

        Ok(client)
    }

    pub async fn fetch_bundle(&self, id: &ChangeRequestId) -> Result<CrBundle> {
        debug!("Fetching bundle: project={}, iid={}", id.project, id.iid);
        match self {
            Self::GitLab(c) => c.fetch_all(id).await,
            Self::GitHub(c) => c.fetch_all(id).await,
            Self::Gitea(c) => c.fetch_all(id).await,
        }
    }

    pub async fn fetch_file_raw_at_ref(
        &self,
        id: &ChangeRequestId,
        repo_relative_path: &str,
        git_ref: &str,
    ) -> Result<Option<Vec<u8>>> {
        match self {
            Self::GitLab(c) => c.get_file_raw(id, repo_relative_path, git_ref).await,
            Self::GitHub(c) => c.get_file_raw(id, repo_relative_path, git_ref).await,
            Self::Gitea(c) => c.get_file_raw(id, repo_relative_path, git_ref).await,
        }
    }

    /// Posts a batch of inline comments; a single failure does not abort
    /// the rest (spec §4.4 `post_comments`).
    pub async fn post_inline_comments(
        &self,
        meta: &ChangeRequest,
        comments: &[InlineCommentDraft],
    ) -> Result<()> {
        debug!(
            "Posting inline comments: provider={:?}, project={}, iid={}, count={}",
            meta.provider,
            meta.id.project,
            meta.id.iid,
            comments.len()
        );
        match self {
            Self::GitLab(c) => c.post_inline_comments(meta, comments).await,
            Self::GitHub(c) => c.post_inline_comments(meta, comments).await,
            Self::Gitea(c) => c.post_inline_comments(meta, comments).await,
        }
    }

    /// Enumerates accessible repositories, paginating until an empty page
    /// (spec §4.4 Discovery).
    pub async fn discover_repos(&self, page_size: u32) -> Result<Vec<RepoSummary>> {
        match self {
            Self::GitHub(c) => c.discover_repos(page_size).await,
            Self::Gitea(c) => c.discover_repos(page_size).await,
            Self::GitLab(c) => c.discover_repos(page_size).await,
        }
    }
}
