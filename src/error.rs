//! Error types for sessions and generation engines.

/// Faults raised by a [`GenerationEngine`](crate::llm::GenerationEngine).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine settings are incomplete or inconsistent.
    #[error("engine misconfigured: {0}")]
    Config(String),

    /// The HTTP request to the backend failed.
    #[error("engine request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Reading the response body failed mid-stream.
    #[error("engine stream read failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backend sent a payload that could not be decoded.
    #[error("engine returned malformed data: {0}")]
    Decode(String),
}

/// Errors surfaced while driving a conversation session.
///
/// None of these are fatal to the process. `InvalidInput` is dropped by the
/// session, `StreamRelay` ends the current generation without committing it,
/// and `SendFailure` tears the session down.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Empty or malformed inbound payload.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The generation engine failed before or during streaming.
    #[error("stream relay failed: {0}")]
    StreamRelay(String),

    /// The outbound event could not be delivered to the peer.
    #[error("send failed: {0}")]
    SendFailure(String),
}

impl From<EngineError> for SessionError {
    fn from(err: EngineError) -> Self {
        Self::StreamRelay(err.to_string())
    }
}
