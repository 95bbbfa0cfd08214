//! Registry of live connections.
//!
//! Only bookkeeping lives here: ids and connect times for the health and
//! listing endpoints. History and cancellation tokens stay inside each
//! [`Session`](super::Session) and are never shared.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Public view of a connected session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Unique session identifier.
    pub id: String,
    /// When the connection was established.
    pub connected_at: DateTime<Utc>,
}

/// Thread-safe registry of connected sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, SessionInfo>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection under a fresh ID.
    #[must_use]
    pub fn register(&self) -> SessionInfo {
        let info = SessionInfo {
            id: Uuid::new_v4().to_string(),
            connected_at: Utc::now(),
        };
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(info.id.clone(), info.clone());
        info
    }

    /// Remove a connection by ID.
    pub fn remove(&self, id: &str) -> Option<SessionInfo> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Get a connection by ID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<SessionInfo> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Get the number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if there are no live connections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// List live connections, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.connected_at.cmp(&b.connected_at).then(a.id.cmp(&b.id)));
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_remove() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());

        let info = registry.register();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&info.id), Some(info.clone()));

        assert_eq!(registry.remove(&info.id), Some(info.clone()));
        assert!(registry.is_empty());
        assert_eq!(registry.remove(&info.id), None);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = SessionRegistry::new();
        let handle = registry.clone();
        let a = registry.register();
        let b = handle.register();

        assert_ne!(a.id, b.id);
        assert_eq!(registry.len(), 2);
        let ids: Vec<String> = handle.list().into_iter().map(|s| s.id).collect();
        assert!(ids.contains(&a.id) && ids.contains(&b.id));
    }
}
