//! Online licence validation transport. spec.md §1 excludes the concrete
//! licence-server wire protocol from scope — only the state machine it
//! drives is specified (spec §4.5) — so this is a small injectable trait
//! an HTTP-backed implementation can satisfy later.

use crate::error::Result;

/// Result of an online re-validation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnlineOutcome {
    Valid,
    Rejected,
}

pub trait OnlineValidator: Send + Sync {
    fn validate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<OnlineOutcome>> + Send;
}

/// A validator that always reports success, for installs or tests that
/// never reach a real licence server.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysValid;

impl OnlineValidator for AlwaysValid {
    async fn validate(&self, _token: &str) -> Result<OnlineOutcome> {
        Ok(OnlineOutcome::Valid)
    }
}

/// Validates against a licence server over HTTP, expecting
/// `{"valid": bool}` in the response body.
pub struct HttpValidator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpValidator {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { client, endpoint: endpoint.into() }
    }
}

impl OnlineValidator for HttpValidator {
    async fn validate(&self, token: &str) -> Result<OnlineOutcome> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|e| crate::error::Error::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Ok(OnlineOutcome::Rejected);
        }

        #[derive(serde::Deserialize)]
        struct Body {
            valid: bool,
        }
        let body: Body = resp
            .json()
            .await
            .map_err(|e| crate::error::Error::Network(e.to_string()))?;

        Ok(if body.valid { OnlineOutcome::Valid } else { OnlineOutcome::Rejected })
    }
}
