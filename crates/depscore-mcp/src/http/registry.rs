//! Process-wide session registry.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use super::session::Session;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("session {0} is already registered")]
    Duplicate(String),
}

/// Mapping from session id to open session.
///
/// A session is present if and only if it is open. Callers only borrow
/// sessions for the duration of one request.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session under its id. Never overwrites.
    pub fn register(&self, session: Arc<Session>) -> Result<(), RegistryError> {
        match self.sessions.entry(session.id().to_string()) {
            Entry::Occupied(entry) => {
                tracing::error!(session_id = %entry.key(), "Refusing duplicate session registration");
                Err(RegistryError::Duplicate(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                entry.insert(session);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a session. Returns whether it was present.
    pub fn remove(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of open sessions. Diagnostic only.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of all sessions, for shutdown.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::session::tests::detached_session;

    #[test]
    fn test_register_and_lookup() {
        let registry = SessionRegistry::new();
        let session = detached_session("abc");

        registry.register(Arc::clone(&session)).unwrap();

        let found = registry.lookup("abc").unwrap();
        assert!(Arc::ptr_eq(&found, &session));
        assert!(registry.lookup("other").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_duplicate_is_rejected() {
        let registry = SessionRegistry::new();
        let first = detached_session("abc");
        registry.register(Arc::clone(&first)).unwrap();

        let err = registry.register(detached_session("abc")).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("abc".to_string()));

        let kept = registry.lookup("abc").unwrap();
        assert!(Arc::ptr_eq(&kept, &first));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        registry.register(detached_session("abc")).unwrap();

        assert!(registry.remove("abc"));
        assert!(!registry.remove("abc"));
        assert!(!registry.remove("never-existed"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lookup_does_not_mutate() {
        let registry = SessionRegistry::new();
        assert!(registry.lookup("ghost").is_none());
        assert!(!registry.contains("ghost"));
        assert_eq!(registry.len(), 0);
    }
}
