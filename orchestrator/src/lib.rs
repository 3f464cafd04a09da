//! Review orchestrator: stateful review sessions driven through ingestion,
//! batch processing, and comment posting (spec §2 data flow, §4.1).
//!
//! No heap trait objects: provider and LLM dispatch are enum-based
//! ([`provider_adapters::ProviderClient`], [`llm_client::LlmServiceProfiles`]);
//! storage is generic over [`store::ReviewStore`] so the `persistence` crate
//! can supply a durable implementation without this crate depending on it.

pub mod batch;
pub mod cache;
pub mod errors;
pub mod licence_gate;
pub mod publish;
pub mod review;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use prompt_manager::chunk_source::ChunkResolver;
use prompt_manager::context::RenderContext;
use prompt_manager::template::PlaintextRegistry;
use prompt_manager::PromptRenderer;
use provider_adapters::{ChangeRequestId, ProviderClient, ProviderConfig};
use serde_json::json;
use tracing::{debug, info, warn};

use batch::{CancelToken, TokenBudget};
use errors::{Error, Result};
use licence_gate::{EnforcementMode, LicenceGate};
use review::{EventKind, Review, ReviewId, ReviewStatus, SourceKind};
use store::ReviewStore;

/// Prompt key for the final summary call (spec §4.1 step 3). Falls back to
/// this body when no org override chunk is configured for it.
const SUMMARY_PROMPT_KEY: &str = "review.summary";
const DEFAULT_SUMMARY_TEMPLATE: &str = "Summarise this code review in a few sentences for a \
    pull request description. {{VAR:comment_count}} comment(s) were raised across \
    {{VAR:file_count}} file(s).\n\nPer-file notes:\n{{VAR:file_notes|default=\"(none)\"}}";

/// Tunables for one review run (spec §4.1, §4.2, §5).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub token_budget: TokenBudget,
    /// Bounded worker pool size `W` (spec §4.2 "Concurrency").
    pub workers: usize,
    /// Retry cap for `Transient` batch failures (spec §4.1 "Failure semantics").
    pub batch_retry_cap: u32,
    pub enforcement: EnforcementMode,
    pub publish: publish::PublishConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            token_budget: TokenBudget::default(),
            workers: 4,
            batch_retry_cap: 3,
            enforcement: EnforcementMode::default(),
            publish: publish::PublishConfig::default(),
        }
    }
}

/// The subset of inputs needed to submit a review; diff ingestion (spec
/// §4.7) has already normalised the source into `FileChange`s by this point.
pub struct SubmitRequest {
    pub org_id: String,
    pub initiator: String,
    pub source_kind: SourceKind,
    /// Human-facing description of the change request (e.g. `"group/project!42"`).
    pub target_ref: String,
    pub friendly_name: String,
    pub cr_id: ChangeRequestId,
    pub files: Vec<provider_adapters::FileChange>,
}

/// Outcome of `submit_review`: the new review id plus a licence warning flag
/// (spec §8 scenario 6 "soft mode allows submit with warning").
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub review_id: ReviewId,
    pub licence_warning: bool,
}

/// Ties together the pieces a running orchestrator needs: a store, a
/// licence gate, the system prompt used for batch review requests, and the
/// chunk resolver backing org-scoped prompt rendering (spec §4.1 step 3,
/// §4.3). Built once and shared across submissions.
pub struct Orchestrator<S: ReviewStore, R: ChunkResolver> {
    pub store: S,
    pub licence: LicenceGate,
    pub system_prompt: String,
    pub resolver: R,
    pub config: OrchestratorConfig,
}

impl<S: ReviewStore, R: ChunkResolver> Orchestrator<S, R> {
    pub fn new(store: S, licence: LicenceGate, resolver: R, system_prompt: String) -> Self {
        Self {
            store,
            licence,
            system_prompt,
            resolver,
            config: OrchestratorConfig::default(),
        }
    }

    /// Validates the source, persists a `queued` Review, and emits the
    /// initial `queued` event (spec §4.1 `submit_review`). Does not itself
    /// run the pipeline — callers drive [`Orchestrator::run_review`]
    /// (typically on a background task) once this returns.
    pub async fn submit_review(&self, req: SubmitRequest) -> Result<SubmitOutcome> {
        if req.files.is_empty() {
            return Err(Error::InvalidDiff("no files in change set".into()));
        }

        let decision = self.licence.check(self.config.enforcement);
        if decision.blocked {
            return Err(Error::LicenceBlocked(decision.reason.unwrap_or_default()));
        }

        let mut review = Review::new(
            req.org_id,
            req.initiator,
            req.source_kind,
            req.target_ref,
            req.friendly_name,
            req.files,
        );
        review.push_event(EventKind::Queued, json!({ "cr_project": req.cr_id.project }));

        let review_id = review.id;
        self.store.insert(review).await?;

        Ok(SubmitOutcome {
            review_id,
            licence_warning: decision.warning,
        })
    }

    /// Returns a consistent snapshot of a Review (spec §4.1 `get_review`).
    pub async fn get_review(&self, id: ReviewId) -> Result<Review> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("review {id}")))
    }

    /// Events with `seq > since_seq`, ascending (spec §4.1 `get_events`).
    pub async fn get_events(
        &self,
        id: ReviewId,
        since_seq: u64,
        limit: usize,
    ) -> Result<Vec<review::ReviewEvent>> {
        let review = self.get_review(id).await?;
        Ok(review.events_since(since_seq, limit))
    }

    /// Moves a non-terminal review to `cancelled` and signals its
    /// cancellation token so in-flight work aborts at the next check point
    /// (spec §4.1 `cancel_review`, §5 "Cancellation").
    pub async fn cancel_review(&self, id: ReviewId) -> Result<()> {
        let mut review = self.get_review(id).await?;
        if review.status.is_terminal() {
            return Err(Error::Conflict(format!(
                "review {id} is already {:?}",
                review.status
            )));
        }
        review.transition(ReviewStatus::Cancelled)?;
        self.store.update(review).await?;
        self.store.cancel_token(id).cancel();
        Ok(())
    }

    /// Drives one Review through the full pipeline: batch processing then
    /// comment posting, recording every stage as an event (spec §4.1
    /// "Processing pipeline"). Intended to run on a background task per
    /// accepted submission; at most one worker should drive a given review
    /// at a time (spec §4.1 "gated by an advisory per-review lock").
    pub async fn run_review(
        &self,
        id: ReviewId,
        cr_id: ChangeRequestId,
        provider_cfg: ProviderConfig,
    ) -> Result<()> {
        let t0 = Instant::now();
        let mut review = self.get_review(id).await?;
        review.transition(ReviewStatus::InProgress)?;
        self.store.update(review.clone()).await?;

        let cancel = self.store.cancel_token(id);
        let outcome = self
            .run_pipeline(&mut review, &provider_cfg, &cr_id, &cancel)
            .await;

        match outcome {
            Ok(()) => {
                if review.status != ReviewStatus::Cancelled {
                    review.transition(ReviewStatus::Completed).ok();
                }
            }
            Err(e) => {
                warn!(review_id = %id, error = %e, "review failed");
                review.error_summary = Some(e.to_string());
                review.push_event(EventKind::Error, json!({ "error": e.to_string() }));
                if review.status != ReviewStatus::Cancelled {
                    review.transition(ReviewStatus::Failed).ok();
                }
            }
        }
        self.store.update(review).await?;
        info!(review_id = %id, elapsed_ms = t0.elapsed().as_millis(), "review pipeline done");
        Ok(())
    }

    async fn run_pipeline(
        &self,
        review: &mut Review,
        provider_cfg: &ProviderConfig,
        cr_id: &ChangeRequestId,
        cancel: &CancelToken,
    ) -> Result<()> {
        review.push_event(EventKind::BatchStarted, json!({ "files": review.files.len() }));

        let batches = batch::pack_files(&review.files, self.config.token_budget);
        debug!(review_id = %review.id, batches = batches.len(), "packed batches");

        let profiles = Arc::new(self.load_profiles()?);

        let results = batch::run_batches(
            review.id,
            batches,
            self.system_prompt.clone(),
            profiles.clone(),
            self.config.workers,
            self.config.batch_retry_cap,
            cancel.clone(),
        )
        .await;

        let mut file_summaries: Vec<batch::FileSummary> = Vec::new();
        for result in results {
            if cancel.is_cancelled() {
                review.transition(ReviewStatus::Cancelled).ok();
                return Ok(());
            }
            for comment in result.comments {
                if review.add_comment_deduped(comment.clone()) {
                    review.push_event(
                        EventKind::CommentProduced,
                        json!({ "path": comment.path, "line": comment.line }),
                    );
                }
            }
            if result.fatal {
                let detail = result
                    .diagnostics
                    .first()
                    .map(|d| d.message.clone())
                    .unwrap_or_else(|| "batch failed a hard invariant".into());
                return Err(Error::Internal(detail));
            }
            review.push_event(
                EventKind::BatchCompleted,
                json!({
                    "index": result.index,
                    "diagnostics": result.diagnostics.len(),
                }),
            );
            file_summaries.extend(result.file_summaries);
        }

        review.summary = self.render_summary(review, &file_summaries, &profiles).await;
        review.push_event(EventKind::SummaryProduced, json!({ "summary": review.summary }));

        if cancel.is_cancelled() {
            review.transition(ReviewStatus::Cancelled).ok();
            return Ok(());
        }

        // A `Diff` review (the CLI/direct-diff-upload path, spec §4.7) has
        // no forge merge/pull request behind it — there is nothing to fetch
        // a bundle from or post comments against; the caller retrieves
        // comments by polling `get_review`/`get_events` instead.
        if review.source_kind == SourceKind::Diff {
            return Ok(());
        }

        let client = ProviderClient::from_config(provider_cfg.clone())?;
        let kind = provider_cfg.kind;

        // `target_ref` is the only ref we know before fetching, so it is
        // tried as an optimistic cache key; on a miss the bundle is keyed
        // for next time under its real `head_sha` (spec §9 large-diff
        // cache: "re-running ingestion on the same head_sha is O(1)").
        let bundle = match cache::load_bundle(kind, cr_id, &review.target_ref).await? {
            Some(bundle) => bundle,
            None => {
                let bundle = client.fetch_bundle(cr_id).await?;
                cache::maybe_store_bundle(kind, cr_id, &bundle.meta.diff_refs.head_sha, &bundle)
                    .await?;
                bundle
            }
        };
        publish::publish_comments(&client, &bundle.meta, review, &self.config.publish).await;

        Ok(())
    }

    /// Renders the `review.summary` prompt (org-scoped overrides resolved
    /// through `self.resolver`, spec §4.3) and asks the slow profile for the
    /// final summary text (spec §4.1 step 3). Falls back to a plain
    /// count-based sentence if rendering or the LLM call fails, so a prompt
    /// or provider hiccup never fails an otherwise-complete review.
    async fn render_summary(
        &self,
        review: &Review,
        file_summaries: &[batch::FileSummary],
        profiles: &llm_client::LlmServiceProfiles,
    ) -> String {
        let fallback = || {
            format!(
                "{} comment(s) across {} file(s)",
                review.comments.len(),
                review.files.len()
            )
        };

        let mut registry = PlaintextRegistry::new();
        registry.insert(SUMMARY_PROMPT_KEY, DEFAULT_SUMMARY_TEMPLATE);
        let renderer = PromptRenderer::new(&self.resolver, registry);

        let ctx = RenderContext {
            org_id: review.org_id.clone(),
            ai_connector: None,
            integration_token: None,
            repository: Some(review.target_ref.clone()),
        };

        let file_notes = file_summaries
            .iter()
            .map(|s| format!("- {}: {}", s.path, s.summary))
            .collect::<Vec<_>>()
            .join("\n");

        let mut vars = HashMap::new();
        vars.insert("comment_count".to_string(), review.comments.len().to_string());
        vars.insert("file_count".to_string(), review.files.len().to_string());
        vars.insert("file_notes".to_string(), file_notes);

        let prompt = match renderer.render(&ctx, SUMMARY_PROMPT_KEY, None, &vars).await {
            Ok(p) => p,
            Err(e) => {
                warn!(review_id = %review.id, error = %e, "summary prompt render failed, using fallback");
                return fallback();
            }
        };

        match profiles.generate_slow(&prompt, Some(&self.system_prompt)).await {
            Ok(text) => text,
            Err(e) => {
                warn!(review_id = %review.id, error = %e, "summary LLM call failed, using fallback");
                fallback()
            }
        }
    }

    /// Loads `(fast, slow)` profiles from the environment, falling back to a
    /// local Ollama default so the pipeline still runs (e.g. under test with
    /// a mocked endpoint) without requiring `LLM_KIND` to be set.
    fn load_profiles(&self) -> Result<llm_client::LlmServiceProfiles> {
        match llm_client::load_profiles_from_env() {
            Ok((fast, slow)) => Ok(llm_client::LlmServiceProfiles::new(fast, Some(slow), None)?),
            Err(_) => {
                let cfg = llm_client::LlmModelConfig {
                    provider: llm_client::LlmProvider::Ollama,
                    model: "qwen2.5-coder:7b-instruct".into(),
                    endpoint: "http://127.0.0.1:11434".into(),
                    api_key: None,
                    max_tokens: Some(1024),
                    temperature: Some(0.2),
                    top_p: None,
                    timeout_secs: Some(60),
                };
                Ok(llm_client::LlmServiceProfiles::new(cfg.clone(), Some(cfg), None)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use licence_gate::LicenceState;
    use prompt_manager::context::ApplicationContext;
    use store::InMemoryReviewStore;

    #[derive(Default)]
    struct NoopResolver;

    impl ChunkResolver for NoopResolver {
        async fn chunks(
            &self,
            _org_id: &str,
            _app_ctx: &str,
            _prompt_key: &str,
            _name: &str,
        ) -> prompt_manager::error::Result<Vec<prompt_manager::chunk_source::ChunkBody>> {
            Ok(Vec::new())
        }

        async fn application_contexts(
            &self,
            _org_id: &str,
        ) -> prompt_manager::error::Result<Vec<ApplicationContext>> {
            Ok(Vec::new())
        }
    }

    fn test_orchestrator(
        licence_state: LicenceState,
        enforcement: EnforcementMode,
    ) -> Orchestrator<InMemoryReviewStore, NoopResolver> {
        let mut orch = Orchestrator::new(
            InMemoryReviewStore::new(),
            LicenceGate::new(licence_state),
            NoopResolver,
            "system prompt".into(),
        );
        orch.config.enforcement = enforcement;
        orch
    }

    fn submit_request(files: Vec<provider_adapters::FileChange>) -> SubmitRequest {
        SubmitRequest {
            org_id: "org".into(),
            initiator: "tester".into(),
            source_kind: SourceKind::Diff,
            target_ref: "group/repo".into(),
            friendly_name: "repo".into(),
            cr_id: provider_adapters::ChangeRequestId { project: "group/repo".into(), iid: 0 },
            files,
        }
    }

    fn one_file() -> provider_adapters::FileChange {
        provider_adapters::FileChange {
            old_path: Some("a.rs".into()),
            new_path: Some("a.rs".into()),
            is_new: false,
            is_deleted: false,
            is_renamed: false,
            is_binary: false,
            hunks: Vec::new(),
            raw_unidiff: None,
        }
    }

    #[tokio::test]
    async fn submit_review_rejects_empty_file_set() {
        let orch = test_orchestrator(LicenceState::Valid, EnforcementMode::Off);
        let err = orch.submit_review(submit_request(Vec::new())).await.unwrap_err();
        assert!(matches!(err, Error::InvalidDiff(_)));
    }

    #[tokio::test]
    async fn submit_review_persists_a_queued_review() {
        let orch = test_orchestrator(LicenceState::Valid, EnforcementMode::Off);
        let outcome = orch.submit_review(submit_request(vec![one_file()])).await.unwrap();
        let review = orch.get_review(outcome.review_id).await.unwrap();
        assert_eq!(review.status, ReviewStatus::Queued);
        assert_eq!(review.events.len(), 1);
        assert!(!outcome.licence_warning);
    }

    #[tokio::test]
    async fn strict_enforcement_blocks_submission_on_expired_licence() {
        let orch = test_orchestrator(LicenceState::Expired, EnforcementMode::Strict);
        let err = orch.submit_review(submit_request(vec![one_file()])).await.unwrap_err();
        assert!(matches!(err, Error::LicenceBlocked(_)));
    }

    #[tokio::test]
    async fn soft_enforcement_allows_submission_with_warning() {
        let orch = test_orchestrator(LicenceState::Missing, EnforcementMode::Soft);
        let outcome = orch.submit_review(submit_request(vec![one_file()])).await.unwrap();
        assert!(outcome.licence_warning);
    }

    #[tokio::test]
    async fn cancel_review_transitions_queued_to_cancelled() {
        let orch = test_orchestrator(LicenceState::Valid, EnforcementMode::Off);
        let outcome = orch.submit_review(submit_request(vec![one_file()])).await.unwrap();
        orch.cancel_review(outcome.review_id).await.unwrap();
        let review = orch.get_review(outcome.review_id).await.unwrap();
        assert_eq!(review.status, ReviewStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_review_rejects_an_already_terminal_review() {
        let orch = test_orchestrator(LicenceState::Valid, EnforcementMode::Off);
        let outcome = orch.submit_review(submit_request(vec![one_file()])).await.unwrap();
        orch.cancel_review(outcome.review_id).await.unwrap();
        let err = orch.cancel_review(outcome.review_id).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn get_events_only_returns_events_after_since_seq() {
        let orch = test_orchestrator(LicenceState::Valid, EnforcementMode::Off);
        let outcome = orch.submit_review(submit_request(vec![one_file()])).await.unwrap();
        let events = orch.get_events(outcome.review_id, 0, 10).await.unwrap();
        assert!(events.is_empty());
    }
}
