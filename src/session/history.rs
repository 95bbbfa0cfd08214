//! Bounded conversation history.

use crate::error::SessionError;
use crate::llm::{Role, Turn};

/// Role-tagged turns with a fixed system preamble at index 0.
///
/// The preamble is never evicted and never counts toward the prompt window.
/// Turns are only appended or popped, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryBuffer {
    turns: Vec<Turn>,
}

impl HistoryBuffer {
    /// Create a buffer seeded with `system_preamble`.
    #[must_use]
    pub fn new(system_preamble: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::system(system_preamble)],
        }
    }

    /// Reset to `[SYSTEM]`.
    pub fn initialize(&mut self, system_preamble: impl Into<String>) {
        self.turns.clear();
        self.turns.push(Turn::system(system_preamble));
    }

    /// Append a user turn.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidInput`] if `text` is empty or whitespace.
    pub fn append_user(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(SessionError::InvalidInput(
                "user message is empty".to_string(),
            ));
        }
        self.turns.push(Turn::user(text));
        Ok(())
    }

    /// Append an assistant turn.
    pub fn append_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::assistant(text));
    }

    /// Pop the last turn if it has `role`. The system turn is never popped.
    pub fn remove_last_if_role(&mut self, role: Role) -> bool {
        if self.turns.len() > 1 && self.turns.last().is_some_and(|t| t.role == role) {
            self.turns.pop();
            true
        } else {
            false
        }
    }

    /// `[SYSTEM] + last window non-system turns`.
    #[must_use]
    pub fn prompt_view(&self, window: usize) -> Vec<Turn> {
        let conversation = &self.turns[1..];
        let start = conversation.len().saturating_sub(window);

        let mut view = Vec::with_capacity(1 + conversation.len() - start);
        view.push(self.turns[0].clone());
        view.extend_from_slice(&conversation[start..]);
        view
    }

    /// Replace the conversation with `turns`, keeping the system preamble.
    ///
    /// Supplied system turns are dropped. Returns how many turns were kept.
    pub fn restore(&mut self, turns: Vec<Turn>) -> usize {
        self.turns.truncate(1);
        self.turns
            .extend(turns.into_iter().filter(|t| t.role != Role::System));
        self.turns.len() - 1
    }

    /// The system preamble turn.
    #[must_use]
    pub fn system(&self) -> &Turn {
        &self.turns[0]
    }

    /// All turns, system first.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns including the system turn.
    #[must_use]
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }
}
