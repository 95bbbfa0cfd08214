//! Client envelope: inbound commands and outbound session events.
//!
//! Every WebSocket text frame carries one JSON object. Inbound frames are
//! untyped and recognised by their keys; outbound frames are tagged with a
//! `type` field.
//!
//! # Example
//!
//! ```rust
//! use chat_session_relay::protocol::{ClientEvent, ServerEvent};
//!
//! let event = ClientEvent::parse(r#"{"message": "hola"}"#).unwrap();
//! assert_eq!(event, ClientEvent::Message { text: "hola".to_string() });
//!
//! let json = ServerEvent::Stream { content: "Hi".to_string() }.to_json();
//! assert_eq!(json, r#"{"type":"stream","content":"Hi"}"#);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::llm::Turn;

/// A command sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// New user utterance. May be blank; the session ignores blank text.
    Message {
        /// Raw message text.
        text: String,
    },
    /// Abort the in-flight generation.
    Cancel,
    /// Replace the conversation with previously saved turns.
    RestoreHistory {
        /// Turns to restore, oldest first.
        turns: Vec<Turn>,
    },
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    cancel: bool,
    #[serde(default)]
    restore_history: bool,
    #[serde(default)]
    history: Vec<serde_json::Value>,
}

impl ClientEvent {
    /// Parse one inbound frame.
    ///
    /// When a frame carries several commands, restore wins over cancel and
    /// cancel wins over message.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidInput`] for non-JSON frames, frames that
    /// are not objects, and objects that carry no recognised command.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let frame: RawFrame = serde_json::from_str(raw)
            .map_err(|e| SessionError::InvalidInput(format!("malformed frame: {e}")))?;

        if frame.restore_history {
            return Ok(Self::RestoreHistory {
                turns: decode_turns(frame.history),
            });
        }
        if frame.cancel {
            return Ok(Self::Cancel);
        }
        match frame.message {
            Some(text) => Ok(Self::Message { text }),
            None => Err(SessionError::InvalidInput(
                "frame carries no command".to_string(),
            )),
        }
    }
}

/// Keep the entries that decode as turns; unknown roles and malformed entries
/// are skipped.
fn decode_turns(entries: Vec<serde_json::Value>) -> Vec<Turn> {
    let supplied = entries.len();
    let turns: Vec<Turn> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect();
    if turns.len() < supplied {
        tracing::debug!(
            supplied,
            kept = turns.len(),
            "Skipped undecodable turns in restore payload"
        );
    }
    turns
}

/// An event emitted by the session to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// One generated fragment.
    Stream {
        /// Fragment text.
        content: String,
    },
    /// Generation completed and the reply was committed to history.
    Done {
        /// Wall-clock generation time in seconds, two decimals.
        latency_s: f64,
    },
    /// Generation ended without committing anything.
    Cancelled,
    /// Acknowledges a history restore.
    HistoryRestored,
}

impl ServerEvent {
    /// Wire name of the event.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Stream { .. } => "stream",
            Self::Done { .. } => "done",
            Self::Cancelled => "cancelled",
            Self::HistoryRestored => "history_restored",
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "type": self.event_name(), "error": e.to_string() }).to_string()
        })
    }
}

/// Outbound half of a client connection.
#[async_trait::async_trait]
pub trait EventSink: Send {
    /// Deliver one event to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SendFailure`] if the peer is gone.
    async fn send_event(&mut self, event: ServerEvent) -> Result<(), SessionError>;
}

#[async_trait::async_trait]
impl EventSink for tokio::sync::mpsc::Sender<ServerEvent> {
    async fn send_event(&mut self, event: ServerEvent) -> Result<(), SessionError> {
        self.send(event)
            .await
            .map_err(|e| SessionError::SendFailure(e.to_string()))
    }
}
