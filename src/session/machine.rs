//! Per-connection generation state machine.

use std::sync::Arc;
use std::time::Instant;

use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::bridge::{self, TokenStream};
use super::cancel::CancellationToken;
use super::history::HistoryBuffer;
use crate::config::{AppConfig, OverlapPolicy};
use crate::error::SessionError;
use crate::llm::{GenerationEngine, Role, SamplingConfig, Turn};
use crate::protocol::{ClientEvent, EventSink, ServerEvent};

/// Generation lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No generation in flight.
    Idle,
    /// A generation is streaming.
    Generating,
}

/// Settings a session needs from the application config.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub system_prompt: String,
    pub history_window: usize,
    pub overlap_policy: OverlapPolicy,
    pub relay_capacity: usize,
    pub sampling: SamplingConfig,
}

impl SessionSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            system_prompt: config.session.system_prompt.clone(),
            history_window: config.session.history_window,
            overlap_policy: config.session.overlap_policy,
            relay_capacity: config.session.relay_capacity,
            sampling: config.generation.sampling(),
        }
    }
}

/// The generation currently streaming, if any.
#[derive(Debug)]
struct ActiveGeneration {
    token: CancellationToken,
    stream: TokenStream,
    reply: String,
    fragments: usize,
    started: Instant,
}

impl ActiveGeneration {
    fn id(&self) -> &str {
        self.stream.generation_id()
    }
}

/// The complete lived state of one client connection.
///
/// A session owns its history and the token of its single in-flight
/// generation. Inbound events and generated fragments are processed one at a
/// time, in arrival order, from a single task.
pub struct Session {
    id: String,
    engine: Arc<dyn GenerationEngine>,
    settings: SessionSettings,
    history: HistoryBuffer,
    active: Option<ActiveGeneration>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("engine", &self.engine.name())
            .field("status", &self.status())
            .field("turns", &self.history.turn_count())
            .finish()
    }
}

impl Session {
    /// Create an idle session with its history seeded from the preamble.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        engine: Arc<dyn GenerationEngine>,
        settings: SessionSettings,
    ) -> Self {
        let id = id.into();
        let history = HistoryBuffer::new(settings.system_prompt.clone());
        info!(
            name: "session.connected",
            session_id = %id,
            engine = engine.name(),
            history_window = settings.history_window,
            "Session started"
        );
        Self {
            id,
            engine,
            settings,
            history,
            active: None,
        }
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        if self.active.is_some() {
            SessionStatus::Generating
        } else {
            SessionStatus::Idle
        }
    }

    #[must_use]
    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    /// Drive the session until the inbound stream ends or a send fails.
    ///
    /// Inbound events take priority over buffered fragments so that a cancel
    /// stops forwarding as soon as it arrives.
    pub async fn run<I, S>(&mut self, mut inbound: I, sink: &mut S)
    where
        I: Stream<Item = ClientEvent> + Unpin + Send,
        S: EventSink + ?Sized,
    {
        loop {
            tokio::select! {
                biased;
                event = inbound.next() => {
                    let Some(event) = event else {
                        debug!(session_id = %self.id, "Inbound stream closed");
                        break;
                    };
                    if let Err(e) = self.handle_event(event, sink).await {
                        warn!(session_id = %self.id, error = %e, "Send failed, closing session");
                        break;
                    }
                }
                item = next_fragment(&mut self.active), if self.active.is_some() => {
                    if let Err(e) = self.on_stream_item(item, sink).await {
                        warn!(session_id = %self.id, error = %e, "Send failed, closing session");
                        break;
                    }
                }
            }
        }
        self.teardown();
    }

    /// Apply one inbound event.
    ///
    /// # Errors
    ///
    /// Only [`SessionError::SendFailure`] is returned; invalid input is
    /// dropped here.
    pub async fn handle_event<S>(
        &mut self,
        event: ClientEvent,
        sink: &mut S,
    ) -> Result<(), SessionError>
    where
        S: EventSink + ?Sized,
    {
        match event {
            ClientEvent::Message { text } => self.on_message(&text, sink).await,
            ClientEvent::Cancel => self.on_cancel(sink).await,
            ClientEvent::RestoreHistory { turns } => self.on_restore(turns, sink).await,
        }
    }

    /// Signal any in-flight generation. The session emits nothing afterwards.
    pub fn teardown(&mut self) {
        if let Some(active) = self.active.take() {
            active.token.signal();
            info!(
                session_id = %self.id,
                generation_id = %active.id(),
                fragments = active.fragments,
                "In-flight generation abandoned on disconnect"
            );
        }
        info!(
            name: "session.closed",
            session_id = %self.id,
            turns = self.history.turn_count(),
            "Session closed"
        );
    }

    async fn on_message<S>(&mut self, text: &str, sink: &mut S) -> Result<(), SessionError>
    where
        S: EventSink + ?Sized,
    {
        let text = text.trim();
        if text.is_empty() {
            debug!(session_id = %self.id, "Ignoring empty message");
            return Ok(());
        }

        if self.active.is_some() {
            match self.settings.overlap_policy {
                OverlapPolicy::Reject => {
                    warn!(session_id = %self.id, "Generation in progress, message ignored");
                    return Ok(());
                }
                OverlapPolicy::Preempt => self.abort_active(sink, "preempted").await?,
            }
        }

        if let Err(e) = self.history.append_user(text) {
            debug!(session_id = %self.id, error = %e, "Rejected user message");
            return Ok(());
        }
        self.start_generation(sink).await
    }

    async fn on_cancel<S>(&mut self, sink: &mut S) -> Result<(), SessionError>
    where
        S: EventSink + ?Sized,
    {
        if self.active.is_none() {
            debug!(session_id = %self.id, "Cancel while idle, nothing to do");
            return Ok(());
        }
        self.abort_active(sink, "cancelled").await
    }

    async fn on_restore<S>(&mut self, turns: Vec<Turn>, sink: &mut S) -> Result<(), SessionError>
    where
        S: EventSink + ?Sized,
    {
        if self.active.is_some() {
            self.abort_active(sink, "history restored").await?;
        }
        let supplied = turns.len();
        let kept = self.history.restore(turns);
        info!(
            session_id = %self.id,
            supplied,
            kept,
            "History restored"
        );
        sink.send_event(ServerEvent::HistoryRestored).await
    }

    async fn start_generation<S>(&mut self, sink: &mut S) -> Result<(), SessionError>
    where
        S: EventSink + ?Sized,
    {
        let generation_id = Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        let prompt = self.history.prompt_view(self.settings.history_window);

        info!(
            session_id = %self.id,
            generation_id = %generation_id,
            prompt_turns = prompt.len(),
            history_turns = self.history.turn_count(),
            "Starting generation"
        );

        match bridge::open(
            Arc::clone(&self.engine),
            prompt,
            self.settings.sampling,
            token.clone(),
            self.settings.relay_capacity,
            &generation_id,
        ) {
            Ok(stream) => {
                self.active = Some(ActiveGeneration {
                    token,
                    stream,
                    reply: String::new(),
                    fragments: 0,
                    started: Instant::now(),
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    session_id = %self.id,
                    generation_id = %generation_id,
                    error = %e,
                    "Failed to start generation"
                );
                self.history.remove_last_if_role(Role::User);
                sink.send_event(ServerEvent::Cancelled).await
            }
        }
    }

    async fn on_stream_item<S>(
        &mut self,
        item: Option<Result<String, SessionError>>,
        sink: &mut S,
    ) -> Result<(), SessionError>
    where
        S: EventSink + ?Sized,
    {
        match item {
            Some(Ok(fragment)) => {
                if let Some(active) = self.active.as_mut() {
                    active.reply.push_str(&fragment);
                    active.fragments += 1;
                }
                sink.send_event(ServerEvent::Stream { content: fragment })
                    .await
            }
            Some(Err(e)) => {
                warn!(session_id = %self.id, error = %e, "Relay fault, discarding reply");
                self.abort_active(sink, "relay fault").await
            }
            None => self.complete_active(sink).await,
        }
    }

    /// Natural end of stream: commit the reply.
    async fn complete_active<S>(&mut self, sink: &mut S) -> Result<(), SessionError>
    where
        S: EventSink + ?Sized,
    {
        let Some(active) = self.active.take() else {
            return Ok(());
        };

        if active.token.is_signalled() {
            self.active = Some(active);
            return self.abort_active(sink, "cancelled").await;
        }

        if active.reply.trim().is_empty() {
            self.history.remove_last_if_role(Role::User);
            warn!(
                session_id = %self.id,
                generation_id = %active.id(),
                fragments = active.fragments,
                "Generation produced no text, nothing committed"
            );
            return sink.send_event(ServerEvent::Cancelled).await;
        }

        let latency_s = round_latency(active.started.elapsed().as_secs_f64());
        self.history.append_assistant(active.reply.as_str());
        info!(
            name: "generation.completed",
            session_id = %self.id,
            generation_id = %active.id(),
            fragments = active.fragments,
            latency_s,
            "Generation committed"
        );
        sink.send_event(ServerEvent::Done { latency_s }).await
    }

    /// Stop forwarding the active generation and roll back its user turn.
    async fn abort_active<S>(&mut self, sink: &mut S, reason: &str) -> Result<(), SessionError>
    where
        S: EventSink + ?Sized,
    {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        active.token.signal();
        let rolled_back = self.history.remove_last_if_role(Role::User);
        info!(
            name: "generation.cancelled",
            session_id = %self.id,
            generation_id = %active.id(),
            fragments = active.fragments,
            rolled_back,
            reason,
            "Generation discarded"
        );
        drop(active);
        sink.send_event(ServerEvent::Cancelled).await
    }
}

async fn next_fragment(
    active: &mut Option<ActiveGeneration>,
) -> Option<Result<String, SessionError>> {
    match active {
        Some(active) => active.stream.next().await,
        None => std::future::pending().await,
    }
}

fn round_latency(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}
