//! Shared application state: one instance built at boot and handed to
//! every handler behind an `Arc` (mirrors the teacher's original
//! `AppState`, generalised from a single-forge GitLab config to the full
//! set of shared services spec.md §6's HTTP surface needs).

use std::sync::Arc;

use licensing::{HttpValidator, LicenceService, PublicKeyCache, ServiceConfig};
use llm_client::error_handler::{env_opt_u32, must_env};
use llm_client::{ConfigError, HealthService, LlmModelConfig, LlmProvider};
use orchestrator::licence_gate::{EnforcementMode, LicenceGate, LicenceState as LicenceGateState};
use orchestrator::{Orchestrator, OrchestratorConfig};
use persistence::SqlitePool;
use provider_adapters::{ProviderConfig, ProviderKind};
use prompt_manager::template::PlaintextRegistry;

use crate::prompt_store::PersistenceChunkResolver;
use crate::store::PersistedReviewStore;

/// Deployment mode (spec §6 `LIVEREVIEW_MODE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    SelfHosted,
    Cloud,
}

impl Mode {
    fn from_env(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "self-hosted" => Ok(Self::SelfHosted),
            "cloud" => Ok(Self::Cloud),
            other => Err(ConfigError::UnsupportedProvider(format!("LIVEREVIEW_MODE={other}"))),
        }
    }
}

/// Shared state handed to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator<PersistedReviewStore, PersistenceChunkResolver>>,
    pub pool: SqlitePool,
    pub licence: Arc<LicenceService<HttpValidator>>,
    pub provider_cfg: ProviderConfig,
    pub chunk_resolver: PersistenceChunkResolver,
    pub registry: PlaintextRegistry,
    pub mode: Mode,
    pub jwt_secret: String,
    pub cloud_jwt_secret: Option<String>,
    pub backend_port: u16,
    pub frontend_port: u16,
    pub reverse_proxy: bool,
    pub trigger_secret: String,
    pub health_service: Arc<HealthService>,
    pub llm_configs: Vec<LlmModelConfig>,
}

impl AppState {
    /// Reads every setting spec.md §6 lists, connects the database (running
    /// embedded migrations), and wires the orchestrator/licence services.
    pub async fn from_env() -> Result<Self, ConfigError> {
        let database_url = must_env("DATABASE_URL")?;
        let jwt_secret = must_env("JWT_SECRET")?;

        let mode_raw = std::env::var("LIVEREVIEW_MODE").unwrap_or_else(|_| "self-hosted".into());
        let mode = Mode::from_env(&mode_raw)?;

        let cloud_jwt_secret = match mode {
            Mode::Cloud => Some(must_env("CLOUD_JWT_SECRET")?),
            Mode::SelfHosted => std::env::var("CLOUD_JWT_SECRET").ok(),
        };

        let backend_port = env_opt_u32("LIVEREVIEW_BACKEND_PORT")?.unwrap_or(8080) as u16;
        let frontend_port = env_opt_u32("LIVEREVIEW_FRONTEND_PORT")?.unwrap_or(5173) as u16;
        let reverse_proxy = std::env::var("LIVEREVIEW_REVERSE_PROXY")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let pool = persistence::connect(&database_url).map_err(|e| {
            tracing::error!(error = %e, "database connect failed");
            ConfigError::InvalidFormat {
                var: "DATABASE_URL",
                reason: "connection or migration failed",
            }
        })?;

        let provider_kind = match std::env::var("PROVIDER_KIND").unwrap_or_else(|_| "gitlab".into()).as_str() {
            "gitlab" => ProviderKind::GitLab,
            "github" => ProviderKind::GitHub,
            "gitea" => ProviderKind::Gitea,
            other => return Err(ConfigError::UnsupportedProvider(other.to_string())),
        };
        let provider_cfg = ProviderConfig {
            kind: provider_kind,
            base_api: must_env("PROVIDER_BASE_API")?,
            token: must_env("PROVIDER_TOKEN")?,
        };

        let licence_keys = PublicKeyCache::new();
        let validation_secs = env_opt_u32("LICENSE_VALIDATION_INTERVAL_SECS")?.unwrap_or(3600) as u64;
        let grace_days = env_opt_u32("LICENSE_GRACE_DAYS")?.unwrap_or(7) as i64;
        let licence_endpoint = std::env::var("LICENSE_SERVER_URL")
            .unwrap_or_else(|_| "https://licence.livereview.invalid/validate".into());
        let licence = Arc::new(LicenceService::new(
            licence_keys,
            HttpValidator::new(reqwest::Client::new(), licence_endpoint),
            ServiceConfig::new(std::time::Duration::from_secs(validation_secs), grace_days),
        ));

        let store = PersistedReviewStore::new(pool.clone());
        let enforcement = match std::env::var("LIVEREVIEW_LICENSE_ENFORCEMENT").as_deref() {
            Ok("off") => EnforcementMode::Off,
            Ok("strict") => EnforcementMode::Strict,
            _ => EnforcementMode::Soft,
        };

        let chunk_resolver = PersistenceChunkResolver::new(pool.clone());
        let seeded_gate = {
            let mut conn = pool.get().map_err(|e| {
                tracing::error!(error = %e, "database pool exhausted reading licence state");
                ConfigError::InvalidFormat { var: "DATABASE_URL", reason: "pool exhausted" }
            })?;
            match persistence::license_state::get(&mut conn) {
                Ok(Some(row)) => gate_state_from_status(&row.status),
                Ok(None) => LicenceGateState::Valid,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read persisted licence state, defaulting to valid");
                    LicenceGateState::Valid
                }
            }
        };
        let mut orchestrator = Orchestrator::new(
            store,
            LicenceGate::new(seeded_gate),
            chunk_resolver.clone(),
            default_system_prompt().to_string(),
        );
        orchestrator.config.enforcement = enforcement;

        let mut registry = PlaintextRegistry::new();
        registry.insert("review.system", default_system_prompt());

        let health_timeout = env_opt_u32("HEALTH_CHECK_TIMEOUT_SECS")?.map(u64::from);
        let health_service = Arc::new(HealthService::new(health_timeout).map_err(|e| {
            tracing::error!(error = %e, "failed to build health service");
            ConfigError::InvalidFormat {
                var: "HEALTH_CHECK_TIMEOUT_SECS",
                reason: "could not build HTTP client",
            }
        })?);
        let llm_configs = llm_configs_from_env()?;

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            chunk_resolver,
            pool,
            licence,
            provider_cfg,
            registry,
            mode,
            jwt_secret,
            cloud_jwt_secret,
            backend_port,
            frontend_port,
            reverse_proxy,
            trigger_secret: std::env::var("TRIGGER_SECRET").unwrap_or_default(),
            health_service,
            llm_configs,
        })
    }
}

/// Maps the `licensing` crate's richer status (persisted lowercase via
/// `persist_snapshot`/`license_state::upsert`) onto the orchestrator's
/// coarser gating tri-state. `warning`/`grace` still allow submission —
/// that is the point of a grace period — so both map to `Valid`; only a
/// hard `expired`/`invalid` status should trip soft/strict enforcement.
pub fn gate_state_from_status(status: &str) -> LicenceGateState {
    match status {
        "active" | "warning" | "grace" => LicenceGateState::Valid,
        "expired" | "invalid" => LicenceGateState::Expired,
        _ => LicenceGateState::Missing,
    }
}

fn default_system_prompt() -> &'static str {
    "You are an automated code reviewer. Review the supplied diff batch and \
     report concrete, actionable findings as structured comments."
}

/// Reads the single configured model off `LLM_PROVIDER`/`LLM_MODEL`/`LLM_ENDPOINT`
/// so `/health` has something to probe; absent the former, no models are probed.
fn llm_configs_from_env() -> Result<Vec<LlmModelConfig>, ConfigError> {
    let Ok(provider_raw) = std::env::var("LLM_PROVIDER") else {
        return Ok(Vec::new());
    };
    let provider = match provider_raw.as_str() {
        "ollama" => LlmProvider::Ollama,
        "openai" => LlmProvider::OpenAI,
        other => return Err(ConfigError::UnsupportedProvider(other.to_string())),
    };
    Ok(vec![LlmModelConfig {
        provider,
        model: must_env("LLM_MODEL")?,
        endpoint: must_env("LLM_ENDPOINT")?,
        api_key: std::env::var("LLM_API_KEY").ok(),
        max_tokens: env_opt_u32("LLM_MAX_TOKENS")?,
        temperature: None,
        top_p: None,
        timeout_secs: env_opt_u32("LLM_TIMEOUT_SECS")?.map(u64::from),
    }])
}
