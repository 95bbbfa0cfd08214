//! Generation engine abstraction and implementations.
//!
//! The session layer treats text generation as an opaque, blocking capability:
//! hand it a prompt view and sampling options, get back a lazy sequence of
//! text fragments. Everything about tokenization, model loading and decoding
//! lives behind the [`GenerationEngine`] trait.
//!
//! # Engines
//!
//! - [`EchoEngine`]: offline engine that streams a deterministic reply
//! - [`ChatCompletionsEngine`]: OpenAI-compatible `/v1/chat/completions` backend
//!
//! # Example
//!
//! ```rust
//! use chat_session_relay::llm::{EchoEngine, GenerationEngine, SamplingConfig, Turn};
//!
//! let engine = EchoEngine::new(std::time::Duration::ZERO);
//! let prompt = vec![Turn::system("Be brief."), Turn::user("hello")];
//! let reply: String = engine
//!     .generate(&prompt, &SamplingConfig::default())
//!     .unwrap()
//!     .map(Result::unwrap)
//!     .collect();
//! assert!(reply.contains("hello"));
//! ```

pub mod chat_completions;
pub mod echo;
pub mod provider;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use chat_completions::ChatCompletionsEngine;
pub use echo::EchoEngine;
pub use provider::{AuthStyle, Provider};

use crate::config::{EngineConfig, EngineKind};
use crate::error::EngineError;

/// Role of a conversation turn author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System preamble.
    System,
    /// User utterance.
    User,
    /// Assistant reply.
    Assistant,
}

/// One role-tagged message unit in a conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Author of the turn.
    pub role: Role,
    /// Text content.
    pub content: String,
}

impl Turn {
    /// Create a system turn.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant turn.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling options passed to the engine for one generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Upper bound on generated tokens.
    pub max_new_tokens: usize,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 500,
            temperature: 0.9,
        }
    }
}

/// Lazy, finite sequence of generated text fragments.
pub type Fragments = Box<dyn Iterator<Item = Result<String, EngineError>> + Send>;

/// Connection settings for an OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Base URL for the API (e.g., `http://localhost:8080`).
    pub base_url: String,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Provider type (auto-detected from `base_url`).
    pub provider: Provider,
}

/// A blocking text generator.
///
/// `generate` is called on a dedicated worker thread, never on the async
/// runtime. Implementations may block for as long as they need, both in the
/// call itself and in every pull from the returned iterator.
pub trait GenerationEngine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Start generating a reply for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns an error if the generation cannot be started at all. Faults
    /// that happen after the first fragment are reported through the
    /// iterator instead.
    fn generate(&self, prompt: &[Turn], sampling: &SamplingConfig)
    -> Result<Fragments, EngineError>;
}

/// Build the engine selected by `config`.
///
/// # Errors
///
/// Returns [`EngineError::Config`] if a remote provider is selected without
/// a base URL or model.
pub fn build_engine(config: &EngineConfig) -> Result<Arc<dyn GenerationEngine>, EngineError> {
    match config.provider {
        EngineKind::Echo => Ok(Arc::new(EchoEngine::new(Duration::from_millis(
            config.echo_delay_ms,
        )))),
        EngineKind::OpenAi => {
            let base_url = config
                .base_url
                .clone()
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| EngineError::Config("engine.base_url is required".to_string()))?;
            let model = config
                .model
                .clone()
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| EngineError::Config("engine.model is required".to_string()))?;

            let provider = Provider::resolve(
                &base_url,
                &model,
                config.deployment_name.as_deref(),
                config.api_version.as_deref(),
            );

            let settings = LlmSettings {
                base_url,
                api_key: config.api_key.clone().filter(|s| !s.trim().is_empty()),
                model,
                provider,
            };
            Ok(Arc::new(ChatCompletionsEngine::new(settings)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_config(provider: EngineKind) -> EngineConfig {
        EngineConfig {
            provider,
            base_url: None,
            model: None,
            api_key: None,
            deployment_name: None,
            api_version: None,
            echo_delay_ms: 0,
        }
    }

    #[test]
    fn test_turn_serialization() {
        let json = serde_json::to_string(&Turn::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_build_echo_engine() {
        let engine = build_engine(&engine_config(EngineKind::Echo)).unwrap();
        assert_eq!(engine.name(), "echo");
    }

    #[test]
    fn test_build_openai_requires_base_url() {
        let mut config = engine_config(EngineKind::OpenAi);
        config.model = Some("llama-3.2-3b".to_string());
        let err = build_engine(&config).err().unwrap();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_build_openai_engine() {
        let mut config = engine_config(EngineKind::OpenAi);
        config.base_url = Some("http://localhost:8080".to_string());
        config.model = Some("llama-3.2-3b".to_string());
        let engine = build_engine(&config).unwrap();
        assert_eq!(engine.name(), "chat-completions");
    }
}
