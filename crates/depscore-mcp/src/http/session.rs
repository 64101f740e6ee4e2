//! Sessions and their lifecycle.
//!
//! A [`Session`] binds one protocol runtime to an id. Every way a session
//! can end goes through [`Session::close`], which notifies its
//! [`SessionObserver`] exactly once. [`SessionLifecycle`] is the observer
//! that owns creation and deregistration.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use depscore_core::ScoreProvider;
use tokio_util::sync::CancellationToken;

use super::registry::{RegistryError, SessionRegistry};
use super::stream::{EventStream, StreamingChannel};
use crate::protocol::{IncomingMessage, JsonRpcNotification, JsonRpcResponse};
use crate::server::{McpServer, Notifier};

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent DELETE.
    Terminated,
    /// Handling a message on the session failed fatally.
    Error(String),
    /// The server is shutting down.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Terminated => write!(f, "terminated"),
            CloseReason::Error(msg) => write!(f, "error: {}", msg),
            CloseReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Receives session lifecycle events.
pub trait SessionObserver: Send + Sync {
    fn session_closed(&self, session_id: &str, reason: &CloseReason);
}

pub struct Session {
    id: String,
    server: McpServer,
    open: AtomicBool,
    cancel: CancellationToken,
    stream: Mutex<Option<Arc<StreamingChannel>>>,
    observer: Weak<dyn SessionObserver>,
}

impl Session {
    pub fn new(id: impl Into<String>, server: McpServer, observer: Weak<dyn SessionObserver>) -> Self {
        Self {
            id: id.into(),
            server,
            open: AtomicBool::new(true),
            cancel: CancellationToken::new(),
            stream: Mutex::new(None),
            observer,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn server(&self) -> &McpServer {
        &self.server
    }

    /// Forward a message to this session's protocol runtime.
    pub async fn handle(&self, msg: IncomingMessage) -> Option<JsonRpcResponse> {
        self.server
            .handle_message(msg, Some(self as &dyn Notifier))
            .await
    }

    /// Attach a new streaming channel, replacing any previous one.
    pub fn attach_stream(&self, keep_alive: Duration) -> (Arc<StreamingChannel>, EventStream) {
        let (channel, events) = StreamingChannel::open(&self.id, keep_alive, &self.cancel);
        let previous = self.stream_slot().replace(Arc::clone(&channel));
        if let Some(previous) = previous {
            previous.close("replaced by a new stream");
        }
        (channel, events)
    }

    /// The currently attached channel, if it is still open.
    pub fn current_stream(&self) -> Option<Arc<StreamingChannel>> {
        self.stream_slot()
            .as_ref()
            .filter(|channel| channel.is_open())
            .cloned()
    }

    /// Close the session. Only the first call has any effect.
    ///
    /// Tears down the attached stream and notifies the observer.
    pub fn close(&self, reason: CloseReason) -> bool {
        if !self.open.swap(false, Ordering::AcqRel) {
            tracing::debug!(session_id = %self.id, %reason, "Session already closed");
            return false;
        }

        if let Some(channel) = self.stream_slot().take() {
            channel.close("session closed");
        }
        self.cancel.cancel();

        if let Some(observer) = self.observer.upgrade() {
            observer.session_closed(&self.id, &reason);
        }
        true
    }

    fn stream_slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<StreamingChannel>>> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Notifier for Session {
    fn notify(&self, notification: JsonRpcNotification) -> bool {
        self.current_stream()
            .is_some_and(|channel| channel.send_message(&notification))
    }
}

/// Creates sessions and deregisters them when they close.
pub struct SessionLifecycle {
    registry: Arc<SessionRegistry>,
    provider: Arc<dyn ScoreProvider>,
    this: Weak<SessionLifecycle>,
}

impl SessionLifecycle {
    pub fn new(registry: Arc<SessionRegistry>, provider: Arc<dyn ScoreProvider>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            registry,
            provider,
            this: this.clone(),
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Create and register a session for a message with no session id.
    ///
    /// Anything other than an `initialize` request is logged as a fallback
    /// creation.
    pub fn create(&self, first: &IncomingMessage) -> Result<Arc<Session>, RegistryError> {
        let id = uuid::Uuid::new_v4().to_string();
        let observer: Weak<dyn SessionObserver> = self.this.clone();
        let session = Arc::new(Session::new(
            id.clone(),
            McpServer::new(Arc::clone(&self.provider)),
            observer,
        ));

        self.registry.register(Arc::clone(&session))?;

        if first.is_initialize() {
            tracing::info!(session_id = %id, sessions = self.registry.len(), "Session created");
        } else {
            tracing::warn!(
                session_id = %id,
                method = first.method().unwrap_or("<none>"),
                sessions = self.registry.len(),
                "Session created as fallback for non-initialize request"
            );
        }
        Ok(session)
    }

    /// Close every open session.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        self.registry
            .snapshot()
            .into_iter()
            .filter(|session| session.close(reason.clone()))
            .count()
    }
}

impl SessionObserver for SessionLifecycle {
    fn session_closed(&self, session_id: &str, reason: &CloseReason) {
        let removed = self.registry.remove(session_id);
        tracing::info!(
            session_id,
            %reason,
            removed,
            sessions = self.registry.len(),
            "Session closed"
        );
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use depscore_core::{PackageRef, PackageScore};
    use std::sync::atomic::AtomicUsize;

    pub(crate) struct NullProvider;

    #[async_trait]
    impl ScoreProvider for NullProvider {
        fn name(&self) -> &str {
            "null"
        }

        async fn score(&self, _packages: &[PackageRef]) -> depscore_core::Result<Vec<PackageScore>> {
            Ok(vec![])
        }
    }

    /// Session with no observer, for registry tests.
    pub(crate) fn detached_session(id: &str) -> Arc<Session> {
        let observer: Weak<dyn SessionObserver> = Weak::<SessionLifecycle>::new();
        Arc::new(Session::new(
            id,
            McpServer::new(Arc::new(NullProvider)),
            observer,
        ))
    }

    #[derive(Default)]
    struct CountingObserver(AtomicUsize);

    impl SessionObserver for CountingObserver {
        fn session_closed(&self, _session_id: &str, _reason: &CloseReason) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn message(value: serde_json::Value) -> IncomingMessage {
        IncomingMessage::from_value(value).unwrap()
    }

    fn initialize() -> IncomingMessage {
        message(serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}))
    }

    fn lifecycle() -> Arc<SessionLifecycle> {
        SessionLifecycle::new(Arc::new(SessionRegistry::new()), Arc::new(NullProvider))
    }

    #[test]
    fn test_create_registers_fresh_ids() {
        let lifecycle = lifecycle();

        let first = lifecycle.create(&initialize()).unwrap();
        let second = lifecycle
            .create(&message(serde_json::json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})))
            .unwrap();

        assert_ne!(first.id(), second.id());
        assert!(super::super::headers::is_valid_session_id(first.id().as_bytes()));
        assert_eq!(lifecycle.registry().len(), 2);
        assert!(Arc::ptr_eq(
            &lifecycle.registry().lookup(first.id()).unwrap(),
            &first
        ));
    }

    #[test]
    fn test_close_deregisters_once() {
        let lifecycle = lifecycle();
        let session = lifecycle.create(&initialize()).unwrap();

        assert!(session.close(CloseReason::Terminated));
        assert!(!session.is_open());
        assert!(lifecycle.registry().lookup(session.id()).is_none());

        assert!(!session.close(CloseReason::Error("late".to_string())));
        assert!(lifecycle.registry().is_empty());
    }

    #[test]
    fn test_observer_notified_exactly_once() {
        let observer = Arc::new(CountingObserver::default());
        let weak: Weak<dyn SessionObserver> = Arc::downgrade(&observer) as Weak<dyn SessionObserver>;
        let session = Session::new("s1", McpServer::new(Arc::new(NullProvider)), weak);

        session.close(CloseReason::Terminated);
        session.close(CloseReason::Shutdown);

        assert_eq!(observer.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_tears_down_stream() {
        let lifecycle = lifecycle();
        let session = lifecycle.create(&initialize()).unwrap();
        let (channel, _events) = session.attach_stream(Duration::from_secs(30));

        assert!(channel.is_open());
        session.close(CloseReason::Terminated);

        assert!(!channel.is_open());
        assert!(!channel.keep_alive_active());
        assert!(session.current_stream().is_none());
    }

    #[tokio::test]
    async fn test_new_stream_replaces_old() {
        let session = detached_session("s1");

        let (first, _first_events) = session.attach_stream(Duration::from_secs(30));
        let (second, _second_events) = session.attach_stream(Duration::from_secs(30));

        assert!(!first.is_open());
        assert!(second.is_open());
        assert!(Arc::ptr_eq(&session.current_stream().unwrap(), &second));
    }

    #[tokio::test]
    async fn test_close_all() {
        let lifecycle = lifecycle();
        lifecycle.create(&initialize()).unwrap();
        lifecycle
            .create(&message(serde_json::json!({"jsonrpc": "2.0", "method": "initialize"})))
            .unwrap();
        lifecycle
            .create(&message(serde_json::json!({"jsonrpc": "2.0", "id": 9, "result": {}})))
            .unwrap();

        assert_eq!(lifecycle.close_all(CloseReason::Shutdown), 3);
        assert!(lifecycle.registry().is_empty());
    }

    #[test]
    fn test_notify_without_stream_is_noop() {
        let session = detached_session("s1");
        assert!(!session.notify(JsonRpcNotification::new("notifications/progress", None)));
    }
}
