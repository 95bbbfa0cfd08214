//! One-way abort signal for a single in-flight generation.

use tokio_util::sync::CancellationToken as Inner;

/// Thread-safe flag shared by a session and one generation worker.
///
/// Clones observe the same flag. Once signalled, a token never reverts; a
/// session allocates a fresh token for every generation it starts.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Inner,
}

impl CancellationToken {
    /// Create an unsignalled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent and callable from any thread.
    pub fn signal(&self) {
        self.inner.cancel();
    }

    /// Non-blocking check of the flag.
    #[must_use]
    pub fn is_signalled(&self) -> bool {
        self.inner.is_cancelled()
    }
}
