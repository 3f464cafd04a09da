//! Gitea provider: a JSON REST API for plain inline comments, plus a
//! session/CSRF HTML-form fallback for replying inside an existing review
//! thread (spec §4.4, §9 "Session/CSRF flow").
//!
//! The fallback is modelled as the tiny state machine the design notes call
//! for: `{no_session → logging_in → active → reauth}`. Transitions are
//! serialised behind `&mut self` (the facade holds one `GiteaClient` per
//! configured token) so two logins never race.

use crate::errors::{Error, ProviderError, Result};
use crate::git_providers::types::*;
use crate::parser::{looks_like_binary_patch, parse_unified_diff_advanced};
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Session/CSRF state for the HTML-form fallback.
#[derive(Debug, Clone, Default)]
enum SessionState {
    #[default]
    NoSession,
    LoggingIn,
    Active {
        csrf_token: String,
    },
    Reauth,
}

#[derive(Default)]
struct SessionCache {
    state: SessionState,
}

/// Gitea HTTP client wrapper. `http` must have cookie storage enabled so the
/// session-form fallback can carry an authenticated cookie jar.
#[derive(Debug, Clone)]
pub struct GiteaClient {
    http: Client,
    base_api: String, // e.g. "https://gitea.example.com/api/v1"
    web_base: String, // e.g. "https://gitea.example.com" (derived from base_api)
    token: String,
    username: Option<String>,
    password: Option<String>,
    session: Arc<Mutex<SessionCache>>,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache").finish()
    }
}

impl GiteaClient {
    pub fn new(http: Client, base_api: String, token: String) -> Self {
        let web_base = base_api
            .strip_suffix("/api/v1")
            .unwrap_or(&base_api)
            .to_string();
        debug!("Creating GiteaClient with base_api={}", base_api);
        Self {
            http,
            base_api,
            web_base,
            token,
            username: std::env::var("GITEA_SESSION_USERNAME").ok(),
            password: std::env::var("GITEA_SESSION_PASSWORD").ok(),
            session: Arc::new(Mutex::new(SessionCache::default())),
        }
    }

    pub async fn fetch_all(&self, id: &ChangeRequestId) -> Result<CrBundle> {
        debug!("Gitea fetch_all: project={}, iid={}", id.project, id.iid);
        let (owner, repo) = split_owner_repo(&id.project)?;
        let meta = self.get_meta(&owner, &repo, id).await?;
        let commits = self.get_commits(&owner, &repo, id).await?;
        let changes = self.get_changeset(&owner, &repo, id).await?;
        Ok(CrBundle {
            meta,
            commits,
            changes,
        })
    }

    async fn get_meta(
        &self,
        owner: &str,
        repo: &str,
        id: &ChangeRequestId,
    ) -> Result<ChangeRequest> {
        let url = format!("{}/repos/{}/{}/pulls/{}", self.base_api, owner, repo, id.iid);
        let resp: GiteaPr = self
            .http
            .get(url)
            .header("Authorization", format!("token {}", self.token))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let diff_refs = DiffRefs {
            base_sha: resp.base.sha,
            start_sha: None,
            head_sha: resp.head.sha.clone(),
        };
        let author = AuthorInfo {
            id: resp.user.id.to_string(),
            username: Some(resp.user.login.clone()),
            name: Some(resp.user.login),
            web_url: None,
            avatar_url: resp.user.avatar_url,
        };

        Ok(ChangeRequest {
            provider: ProviderKind::Gitea,
            id: id.clone(),
            title: resp.title,
            description: resp.body,
            author,
            state: resp.state,
            web_url: resp.html_url,
            created_at: resp.created_at,
            updated_at: resp.updated_at,
            source_branch: Some(resp.head.r#ref),
            target_branch: Some(resp.base.r#ref),
            diff_refs,
        })
    }

    async fn get_commits(
        &self,
        owner: &str,
        repo: &str,
        id: &ChangeRequestId,
    ) -> Result<Vec<CrCommit>> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}/commits",
            self.base_api, owner, repo, id.iid
        );
        let raw: Vec<GiteaCommit> = self
            .http
            .get(url)
            .header("Authorization", format!("token {}", self.token))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(raw
            .into_iter()
            .map(|c| CrCommit {
                id: c.sha,
                title: c.commit.message.lines().next().unwrap_or("").to_string(),
                message: Some(c.commit.message),
                author_name: c.commit.author.as_ref().map(|a| a.name.clone()),
                authored_at: c.commit.author.map(|a| a.date),
                web_url: None,
            })
            .collect())
    }

    async fn get_changeset(
        &self,
        owner: &str,
        repo: &str,
        id: &ChangeRequestId,
    ) -> Result<ChangeSet> {
        let url = format!("{}/repos/{}/{}/pulls/{}.diff", self.base_api, owner, repo, id.iid);
        let raw = self
            .http
            .get(url)
            .header("Authorization", format!("token {}", self.token))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let mut files = Vec::new();
        for part in raw.split("\ndiff --git ").filter(|p| !p.trim().is_empty()) {
            let old_path = part
                .lines()
                .find_map(|l| l.strip_prefix("--- a/"))
                .map(|s| s.to_string());
            let new_path = part
                .lines()
                .find_map(|l| l.strip_prefix("+++ b/"))
                .map(|s| s.to_string());
            let is_binary = looks_like_binary_patch(part);
            let hunks = if is_binary {
                Vec::new()
            } else {
                parse_unified_diff_advanced(part).unwrap_or_default()
            };
            files.push(FileChange {
                old_path,
                new_path,
                is_new: false,
                is_deleted: false,
                is_renamed: false,
                is_binary,
                hunks,
                raw_unidiff: Some(part.to_string()),
            });
        }

        Ok(ChangeSet {
            files,
            is_truncated: false,
        })
    }

    pub async fn get_file_raw(
        &self,
        id: &ChangeRequestId,
        repo_relative_path: &str,
        git_ref: &str,
    ) -> Result<Option<Vec<u8>>> {
        let (owner, repo) = split_owner_repo(&id.project)?;
        let url = format!(
            "{}/repos/{}/{}/raw/{}/{}",
            self.base_api, owner, repo, git_ref, repo_relative_path
        );
        let resp = self
            .http
            .get(url)
            .header("Authorization", format!("token {}", self.token))
            .send()
            .await?;
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        Ok(Some(resp.bytes().await?.to_vec()))
    }

    /// Plain inline comment via the JSON API. Used when there is no existing
    /// review thread to reply inside.
    pub async fn post_inline_comments(
        &self,
        meta: &ChangeRequest,
        comments: &[InlineCommentDraft],
    ) -> Result<()> {
        let (owner, repo) = split_owner_repo(&meta.id.project)?;
        let url = format!(
            "{}/repos/{}/{}/pulls/{}/reviews",
            self.base_api, owner, repo, meta.id.iid
        );

        for draft in comments {
            let loc = &draft.location;
            let payload = GiteaReviewCreate {
                body: "",
                event: "COMMENT",
                comments: vec![GiteaReviewComment {
                    path: &loc.file_path,
                    new_position: Some(loc.line),
                    body: &draft.body,
                }],
            };

            let resp = self
                .http
                .post(&url)
                .header("Authorization", format!("token {}", self.token))
                .json(&payload)
                .send()
                .await?;

            let status = resp.status();
            if status.as_u16() == 404 {
                if let Some(fallback) = &draft.fallback_body {
                    warn!("Gitea inline position rejected (404); falling back to general issue comment");
                    self.post_general_comment(&owner, &repo, meta.id.iid, fallback)
                        .await?;
                }
                continue;
            }
            if status.as_u16() == 422 {
                warn!(path = %loc.file_path, line = loc.line, "Gitea rejected inline position (422); dropping comment");
                continue;
            }
            if let Err(err) = resp.error_for_status_ref() {
                warn!(?err, "Failed to post Gitea review comment");
                return Err(ProviderError::HttpStatus(status.as_u16()).into());
            }
        }
        Ok(())
    }

    async fn post_general_comment(&self, owner: &str, repo: &str, iid: u64, body: &str) -> Result<()> {
        let url = format!("{}/repos/{}/{}/issues/{}/comments", self.base_api, owner, repo, iid);
        #[derive(Serialize)]
        struct Comment<'a> {
            body: &'a str,
        }
        self.http
            .post(url)
            .header("Authorization", format!("token {}", self.token))
            .json(&Comment { body })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Reply inside an existing review thread via the session/CSRF HTML-form
    /// fallback, since Gitea's REST API has no "reply to comment" endpoint.
    pub async fn post_thread_reply(
        &self,
        owner: &str,
        repo: &str,
        iid: u64,
        comment_id: u64,
        body: &str,
    ) -> Result<()> {
        let csrf = self.ensure_session().await?;
        let url = format!(
            "{}/{}/{}/issues/{}/comments/{}/reply",
            self.web_base, owner, repo, iid, comment_id
        );

        let form = reqwest::multipart::Form::new()
            .text("_csrf", csrf.clone())
            .text("content", body.to_string());

        let resp = self.http.post(&url).multipart(form).send().await?;
        let status = resp.status().as_u16();

        if status == 401 || status == 403 {
            warn!("Gitea session rejected; re-authenticating once");
            self.force_reauth().await;
            let csrf = self.ensure_session().await?;
            let form = reqwest::multipart::Form::new()
                .text("_csrf", csrf)
                .text("content", body.to_string());
            let resp2 = self.http.post(&url).multipart(form).send().await?;
            if !resp2.status().is_success() {
                return Err(ProviderError::SessionAuth(
                    "persistent auth failure on Gitea session form".into(),
                )
                .into());
            }
            return Ok(());
        }

        if !(200..300).contains(&status) {
            return Err(ProviderError::HttpStatus(status).into());
        }
        Ok(())
    }

    pub(crate) fn base_api(&self) -> &str {
        &self.base_api
    }

    pub(crate) fn http_client(&self) -> &Client {
        &self.http
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    async fn force_reauth(&self) {
        let mut cache = self.session.lock().await;
        cache.state = SessionState::Reauth;
    }

    /// Drives the `{no_session → logging_in → active → reauth}` state
    /// machine, returning the current CSRF token once `Active`.
    async fn ensure_session(&self) -> Result<String> {
        let mut cache = self.session.lock().await;
        match &cache.state {
            SessionState::Active { csrf_token } => Ok(csrf_token.clone()),
            _ => {
                cache.state = SessionState::LoggingIn;
                let token = self.login_and_extract_csrf().await?;
                cache.state = SessionState::Active {
                    csrf_token: token.clone(),
                };
                Ok(token)
            }
        }
    }

    async fn login_and_extract_csrf(&self) -> Result<String> {
        let username = self.username.as_deref().ok_or_else(|| {
            ProviderError::SessionAuth("GITEA_SESSION_USERNAME not configured".into())
        })?;
        let password = self.password.as_deref().ok_or_else(|| {
            ProviderError::SessionAuth("GITEA_SESSION_PASSWORD not configured".into())
        })?;

        let login_page_url = format!("{}/user/login", self.web_base);
        let login_html = self
            .http
            .get(&login_page_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let csrf = extract_csrf_token(&login_html).ok_or_else(|| {
            ProviderError::SessionAuth("could not find CSRF token on login page".into())
        })?;

        let form = [
            ("_csrf", csrf.as_str()),
            ("user_name", username),
            ("password", password),
        ];
        let resp = self.http.post(&login_page_url).form(&form).send().await?;
        if !resp.status().is_success() && !resp.status().is_redirection() {
            return Err(ProviderError::SessionAuth(format!(
                "login form submit failed: status {}",
                resp.status()
            ))
            .into());
        }

        // Cookies are carried by the shared client's cookie jar; re-fetch a
        // page to read the refreshed CSRF token bound to the new session.
        let home_html = self
            .http
            .get(format!("{}/", self.web_base))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        extract_csrf_token(&home_html)
            .ok_or_else(|| ProviderError::SessionAuth("no CSRF token after login".into()).into())
    }

    /// Discovery: paginates the authenticated user's repo list (§4.4).
    pub async fn discover_repos(&self, page_size: u32) -> Result<Vec<RepoSummary>> {
        let mut out = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{}/repos/search?limit={}&page={}",
                self.base_api, page_size, page
            );
            let resp: GiteaRepoSearch = self
                .http
                .get(url)
                .header("Authorization", format!("token {}", self.token))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            if resp.data.is_empty() {
                break;
            }
            out.extend(resp.data.into_iter().map(|r| RepoSummary {
                full_name: r.full_name,
                web_url: r.html_url,
                default_branch: r.default_branch,
            }));
            page += 1;
        }
        Ok(out)
    }
}

fn extract_csrf_token(html: &str) -> Option<String> {
    let re = Regex::new(r#"name="_csrf"\s+value="([^"]+)""#).ok()?;
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn split_owner_repo(project: &str) -> Result<(String, String)> {
    let mut parts = project.split('/');
    let owner = parts.next().unwrap_or("").trim();
    let repo = parts.next().unwrap_or("").trim();
    if owner.is_empty() || repo.is_empty() || parts.next().is_some() {
        return Err(Error::Validation(format!(
            "invalid Gitea project id '{}', expected 'owner/repo'",
            project
        )));
    }
    Ok((owner.to_string(), repo.to_string()))
}

#[derive(Debug, Deserialize)]
struct GiteaPr {
    title: String,
    body: Option<String>,
    state: String,
    html_url: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    user: GiteaUser,
    base: GiteaRef,
    head: GiteaRef,
}

#[derive(Debug, Deserialize)]
struct GiteaUser {
    id: u64,
    login: String,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GiteaRef {
    #[serde(rename = "ref")]
    r#ref: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GiteaCommit {
    sha: String,
    commit: GiteaCommitInner,
}

#[derive(Debug, Deserialize)]
struct GiteaCommitInner {
    message: String,
    author: Option<GiteaCommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct GiteaCommitAuthor {
    name: String,
    date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct GiteaReviewComment<'a> {
    path: &'a str,
    new_position: Option<u32>,
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct GiteaReviewCreate<'a> {
    body: &'a str,
    event: &'a str,
    comments: Vec<GiteaReviewComment<'a>>,
}

#[derive(Debug, Deserialize)]
struct GiteaRepoSearch {
    data: Vec<GiteaRepo>,
}

#[derive(Debug, Deserialize)]
struct GiteaRepo {
    full_name: String,
    html_url: String,
    #[serde(default)]
    default_branch: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_csrf_token_from_hidden_input() {
        let html = r#"<form><input type="hidden" name="_csrf" value="abc123"></form>"#;
        assert_eq!(extract_csrf_token(html), Some("abc123".to_string()));
    }

    #[test]
    fn missing_csrf_token_is_none() {
        assert_eq!(extract_csrf_token("<html></html>"), None);
    }
}
