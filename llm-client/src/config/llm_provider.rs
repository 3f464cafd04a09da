use std::fmt;

/// Backend used for LLM inference: local Ollama or an OpenAI-compatible
/// HTTP API.
///
/// Adding another OpenAI-compatible backend (Azure OpenAI, a self-hosted
/// vLLM gateway, …) means extending [`crate::services::open_ai_service`]
/// rather than this enum, since the wire protocol is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmProvider {
    /// Local Ollama runtime for on-device inference.
    Ollama,
    /// OpenAI-compatible chat completions API.
    OpenAI,
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAI => write!(f, "openai"),
        }
    }
}
