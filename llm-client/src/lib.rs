//! Pluggable LLM backend (Ollama, OpenAI-compatible) with config-from-env
//! loading, pooled per-config HTTP clients, and best-effort health probing
//! (spec §4.2 "fast"/"slow" model profiles; §10.2 ambient logging).

pub mod config;
pub mod error_handler;
pub mod health_service;
pub mod service_profiles;
pub mod services;
pub mod telemetry;

pub use config::default_config::load_profiles_from_env;
pub use config::llm_model_config::LlmModelConfig;
pub use config::llm_provider::LlmProvider;
pub use error_handler::{AiLlmError, ConfigError};
pub use health_service::{HealthService, HealthStatus};
pub use service_profiles::LlmServiceProfiles;
