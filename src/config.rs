//! Layered application configuration.
//!
//! Priority: CLI flag > CLI env var > `CHAT_*` env var > config file > defaults.

use clap::Parser;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::llm::SamplingConfig;

/// System preamble used when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer in the same language \
as the user, keep answers clear and accurate, and say so plainly when you do not have enough \
information to answer.";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Generation engine (`echo` or `openai`)
    #[arg(long, env = "ENGINE_PROVIDER")]
    pub engine: Option<String>,

    /// Number of recent turns sent with each prompt
    #[arg(long, env = "HISTORY_WINDOW")]
    pub history_window: Option<u32>,

    /// What to do with a message that arrives mid-generation (`preempt` or `reject`)
    #[arg(long, env = "OVERLAP_POLICY")]
    pub overlap_policy: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub generation: GenerationConfig,
    pub engine: EngineConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub system_prompt: String,
    /// Read the preamble from this file instead of `system_prompt`.
    #[serde(default)]
    pub system_prompt_file: Option<String>,
    pub history_window: usize,
    pub overlap_policy: OverlapPolicy,
    /// Fragments buffered between a generation worker and its session.
    pub relay_capacity: usize,
}

/// Handling of a new user message while a generation is still streaming.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Cancel the in-flight generation and start on the new message.
    #[default]
    Preempt,
    /// Drop the new message.
    Reject,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    pub temperature: f32,
}

impl GenerationConfig {
    #[must_use]
    pub fn sampling(&self) -> SamplingConfig {
        SamplingConfig {
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Echo,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    pub provider: EngineKind,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Azure deployment name.
    #[serde(default)]
    pub deployment_name: Option<String>,
    /// Azure API version.
    #[serde(default)]
    pub api_version: Option<String>,
    pub echo_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(|e| ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.port", 8000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("session.system_prompt", DEFAULT_SYSTEM_PROMPT)?
            .set_default("session.history_window", 6)?
            .set_default("session.overlap_policy", "preempt")?
            .set_default("session.relay_capacity", 64)?
            .set_default("generation.max_new_tokens", 500)?
            .set_default("generation.temperature", 0.9)?
            .set_default("engine.provider", "echo")?
            .set_default("engine.echo_delay_ms", 20)?
            .set_default("log.format", "compact")?;

        // Explicit file must exist; ./config.yaml is picked up when present.
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::new("config.yaml", FileFormat::Yaml).required(false)),
        };

        // E.g. CHAT_SERVER__PORT=9000, CHAT_ENGINE__BASE_URL=http://localhost:8080
        builder = builder.add_source(
            Environment::with_prefix("CHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(engine) = cli.engine {
            builder = builder.set_override("engine.provider", engine.to_lowercase())?;
        }
        if let Some(window) = cli.history_window {
            builder = builder.set_override("session.history_window", i64::from(window))?;
        }
        if let Some(policy) = cli.overlap_policy {
            builder = builder.set_override("session.overlap_policy", policy.to_lowercase())?;
        }

        let mut cfg: Self = builder.build()?.try_deserialize()?;

        if let Some(path) = &cfg.session.system_prompt_file {
            cfg.session.system_prompt = std::fs::read_to_string(path).map_err(|e| {
                ConfigError::Message(format!("failed to read system prompt file {path}: {e}"))
            })?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings the session layer cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.system_prompt.trim().is_empty() {
            return Err(ConfigError::Message(
                "session.system_prompt cannot be empty".to_string(),
            ));
        }
        if self.session.history_window == 0 {
            return Err(ConfigError::Message(
                "session.history_window must be at least 1".to_string(),
            ));
        }
        if self.session.relay_capacity == 0 {
            return Err(ConfigError::Message(
                "session.relay_capacity must be at least 1".to_string(),
            ));
        }
        if self.generation.max_new_tokens == 0 {
            return Err(ConfigError::Message(
                "generation.max_new_tokens must be at least 1".to_string(),
            ));
        }
        if !self.generation.temperature.is_finite() || self.generation.temperature < 0.0 {
            return Err(ConfigError::Message(
                "generation.temperature must be a non-negative number".to_string(),
            ));
        }
        if self.engine.provider == EngineKind::OpenAi {
            let missing = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
            if missing(&self.engine.base_url) {
                return Err(ConfigError::Message(
                    "engine.base_url is required for the openai engine".to_string(),
                ));
            }
            if missing(&self.engine.model) {
                return Err(ConfigError::Message(
                    "engine.model is required for the openai engine".to_string(),
                ));
            }
        }
        Ok(())
    }
}
