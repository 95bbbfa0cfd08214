//! Endpoint routing for OpenAI-compatible backends.
//!
//! Most hosts serve `{base}/v1/chat/completions` with bearer auth. Groq nests
//! the API under `/openai`, and Azure routes by deployment and authenticates
//! with an `api-key` header.

/// API version used for Azure deployments when none is configured.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-08-01-preview";

/// Backend family behind a base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    /// Azure `OpenAI` Service, addressed by deployment.
    AzureOpenAI {
        deployment_name: String,
        api_version: String,
    },
    OpenRouter,
    Groq,
    /// llama.cpp, vLLM, TGI and anything else speaking the same dialect.
    Generic,
}

/// How the API key travels with each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `api-key: <key>`
    ApiKeyHeader,
}

const HOSTS: &[(&str, Provider)] = &[
    ("openrouter.ai", Provider::OpenRouter),
    ("groq.com", Provider::Groq),
    ("openai.com", Provider::OpenAI),
];

impl Provider {
    /// Pick the provider for `base_url`.
    ///
    /// Azure hosts route by deployment; `deployment` overrides the model name
    /// as deployment when given.
    ///
    /// ```rust
    /// use chat_session_relay::llm::Provider;
    ///
    /// let provider = Provider::resolve("http://127.0.0.1:8080", "llama", None, None);
    /// assert_eq!(provider, Provider::Generic);
    /// ```
    #[must_use]
    pub fn resolve(
        base_url: &str,
        model: &str,
        deployment: Option<&str>,
        api_version: Option<&str>,
    ) -> Self {
        let host = base_url.to_ascii_lowercase();

        if host.contains("azure.com") {
            return Self::AzureOpenAI {
                deployment_name: deployment.unwrap_or(model).to_string(),
                api_version: api_version
                    .unwrap_or(DEFAULT_AZURE_API_VERSION)
                    .to_string(),
            };
        }

        HOSTS
            .iter()
            .find(|(needle, _)| host.contains(needle))
            .map_or(Self::Generic, |(_, provider)| provider.clone())
    }

    /// Full chat completions endpoint under `base_url`.
    #[must_use]
    pub fn chat_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            Self::AzureOpenAI {
                deployment_name,
                api_version,
            } => format!(
                "{base}/openai/deployments/{deployment_name}/chat/completions?api-version={api_version}"
            ),
            Self::Groq => format!("{base}/openai/v1/chat/completions"),
            Self::OpenAI | Self::OpenRouter | Self::Generic => {
                format!("{base}/v1/chat/completions")
            }
        }
    }

    #[must_use]
    pub fn auth_style(&self) -> AuthStyle {
        match self {
            Self::AzureOpenAI { .. } => AuthStyle::ApiKeyHeader,
            _ => AuthStyle::Bearer,
        }
    }
}
