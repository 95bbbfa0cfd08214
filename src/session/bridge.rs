//! Relay from a blocking token producer to an async consumer.
//!
//! Each generation gets its own OS thread. The thread calls the engine and
//! pulls fragments from the returned iterator, pushing them into a bounded
//! channel; the session awaits them through [`TokenStream`] without ever
//! blocking the runtime. The channel is the only thing the two sides share.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::cancel::CancellationToken;
use crate::error::SessionError;
use crate::llm::{GenerationEngine, SamplingConfig, Turn};

/// Lazy, finite, non-restartable sequence of generated fragments.
///
/// Yields `Ok(fragment)` in production order, at most one `Err` for a relay
/// fault, then `None`. Dropping the stream abandons the worker: it exits at
/// its next fragment and its output is discarded.
#[derive(Debug)]
pub struct TokenStream {
    generation_id: String,
    inner: ReceiverStream<Result<String, SessionError>>,
}

impl TokenStream {
    /// Identifier of the generation feeding this stream.
    #[must_use]
    pub fn generation_id(&self) -> &str {
        &self.generation_id
    }
}

impl Stream for TokenStream {
    type Item = Result<String, SessionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Start a generation on a dedicated worker thread and relay its output.
///
/// # Errors
///
/// Returns [`SessionError::StreamRelay`] if the worker thread cannot be spawned.
pub fn open(
    engine: Arc<dyn GenerationEngine>,
    prompt: Vec<Turn>,
    sampling: SamplingConfig,
    token: CancellationToken,
    capacity: usize,
    generation_id: &str,
) -> Result<TokenStream, SessionError> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let worker_id = generation_id.to_string();

    std::thread::Builder::new()
        .name(format!("generation-{}", short_id(generation_id)))
        .spawn(move || relay(engine.as_ref(), &prompt, &sampling, &token, &tx, &worker_id))
        .map_err(|e| SessionError::StreamRelay(format!("failed to spawn worker: {e}")))?;

    Ok(TokenStream {
        generation_id: generation_id.to_string(),
        inner: ReceiverStream::new(rx),
    })
}

/// Worker loop. Runs until the iterator ends, the token is signalled, or the
/// consumer goes away.
fn relay(
    engine: &dyn GenerationEngine,
    prompt: &[Turn],
    sampling: &SamplingConfig,
    token: &CancellationToken,
    tx: &mpsc::Sender<Result<String, SessionError>>,
    generation_id: &str,
) {
    let fragments = match engine.generate(prompt, sampling) {
        Ok(fragments) => fragments,
        Err(e) => {
            tracing::warn!(
                generation_id = %generation_id,
                engine = engine.name(),
                error = %e,
                "Generation failed to start"
            );
            let _ = tx.blocking_send(Err(e.into()));
            return;
        }
    };

    let mut produced = 0usize;
    let mut abandoned = false;

    for item in fragments {
        if token.is_signalled() {
            abandoned = true;
            break;
        }
        match item {
            Ok(fragment) => {
                produced += 1;
                if tx.blocking_send(Ok(fragment)).is_err() {
                    abandoned = true;
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(
                    generation_id = %generation_id,
                    produced,
                    error = %e,
                    "Generation failed mid-stream"
                );
                let _ = tx.blocking_send(Err(e.into()));
                break;
            }
        }
    }

    tracing::debug!(
        generation_id = %generation_id,
        produced,
        abandoned,
        "Generation worker finished"
    );
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::llm::Fragments;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedEngine(Vec<Result<&'static str, &'static str>>);

    impl GenerationEngine for FixedEngine {
        fn name(&self) -> &str {
            "fixed"
        }

        fn generate(&self, _: &[Turn], _: &SamplingConfig) -> Result<Fragments, EngineError> {
            let items: Vec<_> = self
                .0
                .iter()
                .map(|r| match r {
                    Ok(s) => Ok((*s).to_string()),
                    Err(e) => Err(EngineError::Decode((*e).to_string())),
                })
                .collect();
            Ok(Box::new(items.into_iter()))
        }
    }

    struct FailingEngine;

    impl GenerationEngine for FailingEngine {
        fn name(&self) -> &str {
            "failing"
        }

        fn generate(&self, _: &[Turn], _: &SamplingConfig) -> Result<Fragments, EngineError> {
            Err(EngineError::Config("no backend".to_string()))
        }
    }

    /// Endless producer that counts pulls.
    struct CountingEngine(Arc<AtomicUsize>);

    impl GenerationEngine for CountingEngine {
        fn name(&self) -> &str {
            "counting"
        }

        fn generate(&self, _: &[Turn], _: &SamplingConfig) -> Result<Fragments, EngineError> {
            let pulls = Arc::clone(&self.0);
            Ok(Box::new(std::iter::repeat_with(move || {
                pulls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(1));
                Ok("x".to_string())
            })))
        }
    }

    fn open_with(engine: Arc<dyn GenerationEngine>, token: CancellationToken) -> TokenStream {
        open(
            engine,
            vec![Turn::system("sys"), Turn::user("q")],
            SamplingConfig::default(),
            token,
            4,
            "3f2a9c1e-test",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_relays_in_order_then_ends() {
        let engine = Arc::new(FixedEngine(vec![Ok("a"), Ok("b"), Ok("c")]));
        let stream = open_with(engine, CancellationToken::new());
        assert_eq!(stream.generation_id(), "3f2a9c1e-test");

        let out: Vec<_> = stream.collect().await;
        assert_eq!(
            out,
            vec![Ok("a".to_string()), Ok("b".to_string()), Ok("c".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_producer_ends_without_error() {
        let mut stream = open_with(Arc::new(FixedEngine(vec![])), CancellationToken::new());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_mid_stream_fault_is_relayed_once() {
        let engine = Arc::new(FixedEngine(vec![Ok("a"), Err("boom"), Ok("never")]));
        let out: Vec<_> = open_with(engine, CancellationToken::new()).collect().await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Ok("a".to_string()));
        assert!(matches!(&out[1], Err(SessionError::StreamRelay(m)) if m.contains("boom")));
    }

    #[tokio::test]
    async fn test_start_failure_is_relayed() {
        let out: Vec<_> = open_with(Arc::new(FailingEngine), CancellationToken::new())
            .collect()
            .await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(SessionError::StreamRelay(_))));
    }

    #[tokio::test]
    async fn test_signal_stops_worker() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();
        let mut stream = open_with(Arc::new(CountingEngine(Arc::clone(&pulls))), token.clone());

        assert!(stream.next().await.is_some());
        token.signal();

        // Drain what was buffered; the worker closes the channel on its own.
        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while stream.next().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok(), "worker should stop after signal");

        let after_stop = pulls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pulls.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_dropping_stream_abandons_worker() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let mut stream = open_with(
            Arc::new(CountingEngine(Arc::clone(&pulls))),
            CancellationToken::new(),
        );
        assert!(stream.next().await.is_some());
        drop(stream);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let settled = pulls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pulls.load(Ordering::SeqCst), settled);
    }
}
