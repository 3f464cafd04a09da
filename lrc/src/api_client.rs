//! HTTP client for the `/api/v1` surface the CLI drives (spec §6).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    repo_name: &'a str,
    diff_source: &'a str,
    diff: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub review_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl ReviewStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReviewStatus::Completed | ReviewStatus::Failed | ReviewStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommentDto {
    pub path: String,
    pub line: u32,
    pub severity: String,
    pub body: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReviewSnapshot {
    pub id: String,
    pub status: ReviewStatus,
    pub summary: Option<String>,
    pub comments: Vec<CommentDto>,
    pub error_summary: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), api_key }
    }

    pub async fn submit(
        &self,
        repo_name: &str,
        diff_source: &str,
        diff: &str,
        range: Option<&str>,
    ) -> Result<SubmitResponse> {
        let url = format!("{}/api/v1/diff-review", self.base_url);
        let body = SubmitRequest {
            repo_name,
            diff_source,
            diff,
            range,
            api_key: self.api_key.as_deref(),
        };
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Request(url.clone(), e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Server(format!("{status}: {text}")));
        }
        Ok(resp.json().await.map_err(|e| Error::Request(url, e.to_string()))?)
    }

    pub async fn get_review(&self, id: &str) -> Result<ReviewSnapshot> {
        let url = format!("{}/api/v1/diff-review/{id}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Request(url.clone(), e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(Error::Server(format!("{status} fetching review {id}")));
        }
        Ok(resp.json().await.map_err(|e| Error::Request(url, e.to_string()))?)
    }

    /// Polls `get_review` until the review reaches a terminal status,
    /// backing off linearly up to a 5 second cap.
    pub async fn poll_until_terminal(&self, id: &str) -> Result<ReviewSnapshot> {
        let mut delay = Duration::from_millis(500);
        loop {
            let snapshot = self.get_review(id).await?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(Duration::from_secs(5));
        }
    }
}
