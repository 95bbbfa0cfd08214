//! OpenAI-compatible Chat Completions engine.
//!
//! Talks to `/v1/chat/completions` with `stream: true` and turns the
//! server-sent event body into a lazy fragment iterator. The HTTP client is
//! the blocking one: `generate` always runs on a generation worker thread,
//! so the client is created and dropped there, away from the async runtime.

use std::io::{BufRead, BufReader};
use std::time::Duration;

use super::{AuthStyle, Fragments, GenerationEngine, LlmSettings, SamplingConfig, Turn};
use crate::error::EngineError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Engine backed by an OpenAI-compatible Chat Completions endpoint.
#[derive(Clone)]
pub struct ChatCompletionsEngine {
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsEngine")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .field("provider", &self.settings.provider)
            .finish()
    }
}

impl ChatCompletionsEngine {
    /// Create a new engine with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self { settings }
    }

    /// Get the connection settings.
    #[must_use]
    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }
}

impl GenerationEngine for ChatCompletionsEngine {
    fn name(&self) -> &str {
        "chat-completions"
    }

    fn generate(
        &self,
        prompt: &[Turn],
        sampling: &SamplingConfig,
    ) -> Result<Fragments, EngineError> {
        let url = self.settings.provider.chat_url(&self.settings.base_url);

        let body = serde_json::json!({
            "model": self.settings.model,
            "stream": true,
            "messages": prompt,
            "max_tokens": sampling.max_new_tokens,
            "temperature": sampling.temperature,
        });

        // No overall timeout: the body is read for as long as generation runs.
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None)
            .build()?;

        let mut rb = http.post(&url).json(&body);
        if let Some(key) = &self.settings.api_key {
            rb = match self.settings.provider.auth_style() {
                AuthStyle::Bearer => rb.bearer_auth(key),
                AuthStyle::ApiKeyHeader => rb.header("api-key", key),
            };
        }

        tracing::debug!(
            url = %url,
            model = %self.settings.model,
            prompt_turns = prompt.len(),
            "Sending chat completions request"
        );

        let resp = rb.send()?.error_for_status()?;
        Ok(Box::new(SseFragments::new(BufReader::new(resp))))
    }
}

/// Lazy reader over a Chat Completions SSE body.
///
/// Yields the `choices[0].delta.content` of each `data:` line and stops at
/// `[DONE]`, at end of body, or after the first error.
#[derive(Debug)]
pub struct SseFragments<R> {
    reader: R,
    finished: bool,
}

impl<R: BufRead> SseFragments<R> {
    /// Wrap a buffered SSE body.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            finished: false,
        }
    }
}

impl<R: BufRead> Iterator for SseFragments<R> {
    type Item = Result<String, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        while !self.finished {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => self.finished = true,
                Ok(_) => {
                    let line = line.trim();
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        self.finished = true;
                        continue;
                    }

                    match decode_delta(data) {
                        Ok(Some(text)) => return Some(Ok(text)),
                        Ok(None) => {}
                        Err(e) => {
                            self.finished = true;
                            return Some(Err(e));
                        }
                    }
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            }
        }
        None
    }
}

/// Extract the assistant text delta from one SSE `data:` payload.
fn decode_delta(data: &str) -> Result<Option<String>, EngineError> {
    let v: serde_json::Value =
        serde_json::from_str(data).map_err(|e| EngineError::Decode(e.to_string()))?;

    if let Some(message) = v.get("error").and_then(|e| e.get("message")).and_then(|m| m.as_str())
    {
        return Err(EngineError::Decode(message.to_string()));
    }

    Ok(v["choices"][0]["delta"]
        .get("content")
        .and_then(|x| x.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string))
}
