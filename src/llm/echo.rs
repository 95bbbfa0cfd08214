//! Offline engine that echoes the latest user turn.
//!
//! Useful for running the server without a model backend and for exercising
//! the streaming path end to end: the reply is split into word fragments and
//! each pull sleeps for a fixed delay, like a slow decoder would.

use std::time::Duration;

use super::{Fragments, GenerationEngine, Role, SamplingConfig, Turn};
use crate::error::EngineError;

/// Deterministic word-by-word echo engine.
#[derive(Debug, Clone, Default)]
pub struct EchoEngine {
    delay: Duration,
}

impl EchoEngine {
    /// Create an echo engine that waits `delay` before each fragment.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Reply text for a prompt view.
    fn reply_for(prompt: &[Turn]) -> String {
        let last_user = prompt
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map_or("", |t| t.content.as_str());
        let earlier = prompt
            .iter()
            .filter(|t| t.role != Role::System)
            .count()
            .saturating_sub(1);

        format!("You said: {last_user} ({earlier} earlier turns in view)")
    }
}

impl GenerationEngine for EchoEngine {
    fn name(&self) -> &str {
        "echo"
    }

    fn generate(
        &self,
        prompt: &[Turn],
        sampling: &SamplingConfig,
    ) -> Result<Fragments, EngineError> {
        let delay = self.delay;
        let words: Vec<String> = Self::reply_for(prompt)
            .split_inclusive(' ')
            .map(ToString::to_string)
            .collect();

        Ok(Box::new(
            words
                .into_iter()
                .take(sampling.max_new_tokens)
                .map(move |word| {
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    Ok(word)
                }),
        ))
    }
}
