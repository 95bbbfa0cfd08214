//! Per-connection conversation sessions.
//!
//! A session pairs a bounded conversation history with at most one streaming
//! generation. Generations run on their own worker threads; the session only
//! sees their output through a [`TokenStream`] and stops them with a
//! [`CancellationToken`].
//!
//! # Architecture
//!
//! - [`HistoryBuffer`]: system preamble plus a sliding window of turns
//! - [`CancellationToken`]: one-way abort signal per generation
//! - [`TokenStream`]: blocking producer relayed into an async stream
//! - [`Session`]: the state machine tying them together
//! - [`SessionRegistry`]: live connection bookkeeping
//!
//! # Example
//!
//! ```rust
//! use chat_session_relay::llm::{Role, Turn};
//! use chat_session_relay::session::HistoryBuffer;
//!
//! let mut history = HistoryBuffer::new("You are terse.");
//! history.append_user("Hello!").unwrap();
//! history.append_assistant("Hi.");
//!
//! let view = history.prompt_view(1);
//! assert_eq!(view, vec![Turn::system("You are terse."), Turn::assistant("Hi.")]);
//! assert!(!history.remove_last_if_role(Role::User));
//! ```

mod bridge;
mod cancel;
mod history;
mod machine;
mod registry;

pub use bridge::TokenStream;
pub use cancel::CancellationToken;
pub use history::HistoryBuffer;
pub use machine::{Session, SessionSettings, SessionStatus};
pub use registry::{SessionInfo, SessionRegistry};
