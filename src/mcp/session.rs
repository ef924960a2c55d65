//! Session table and per-session workers.
//!
//! Each open stream gets a [`SessionId`], a bounded inbox and one worker task.
//! Posted messages are pushed onto the inbox by id and the worker handles them
//! strictly in arrival order, writing each reply onto the session's stream
//! sink. Different sessions run in parallel and share nothing but the
//! immutable [`Registry`].
//!
//! # Teardown
//!
//! [`SessionManager::close_session`] removes the table entry in one step under
//! the lock, so only the first of several concurrent closers sees the entry.
//! That caller cancels the session token (dropping any in-flight upstream
//! fetch) and drops the inbox sender; the worker then exits and releases the
//! sink. Later closers get `false` and do nothing.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::books::UpstreamClient;
use crate::mcp::dispatcher::Dispatcher;
use crate::mcp::protocol::OutgoingMessage;
use crate::mcp::registry::Registry;

/// Opaque, unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_simple())
    }
}

impl FromStr for SessionId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| SessionError::NotFound { id: s.to_string() })
    }
}

/// Session routing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No open session has this id (never opened, or already closed).
    #[error("Session not found: {id}")]
    NotFound {
        /// The id as supplied by the caller.
        id: String,
    },

    /// The session was torn down while the message was being queued.
    #[error("Session closed: {id}")]
    Closed {
        /// The session id.
        id: String,
    },
}

/// An event written to a session's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Tells the client where to post messages. Always first.
    Endpoint(String),
    /// One serialised JSON-RPC reply.
    Message(String),
}

/// Write half of a session's stream.
pub type StreamSink = mpsc::Sender<SessionEvent>;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting messages.
    Open,
    /// Removed from the table; messages are rejected.
    Closed,
}

/// Table entry for an open session.
#[derive(Debug)]
struct SessionHandle {
    inbox: mpsc::Sender<String>,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct Shared {
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
    registry: Arc<Registry>,
    upstream: UpstreamClient,
    inbox_capacity: usize,
}

/// Owns the session table. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Creates an empty manager.
    ///
    /// `inbox_capacity` bounds how many posted messages may queue per session
    /// before posting waits; it is clamped to at least one.
    #[must_use]
    pub fn new(registry: Arc<Registry>, upstream: UpstreamClient, inbox_capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                sessions: Mutex::new(HashMap::new()),
                registry,
                upstream,
                inbox_capacity: inbox_capacity.max(1),
            }),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<SessionId, SessionHandle>> {
        self.shared
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a session bound to `sink` and starts its worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open_session(&self, sink: StreamSink) -> SessionId {
        let cancel = CancellationToken::new();
        let (inbox_tx, inbox_rx) = mpsc::channel(self.shared.inbox_capacity);
        let handle = SessionHandle {
            inbox: inbox_tx,
            cancel: cancel.clone(),
        };

        let id = {
            let mut table = self.table();
            let mut id = SessionId::generate();
            while table.contains_key(&id) {
                id = SessionId::generate();
            }
            table.insert(id, handle);
            id
        };

        let session = Session {
            id,
            sink,
            inbox: inbox_rx,
            dispatcher: Dispatcher::new(
                Arc::clone(&self.shared.registry),
                self.shared.upstream.clone(),
                cancel.clone(),
            ),
            cancel,
        };
        tokio::spawn(session.run(self.clone()));

        tracing::info!(session_id = %id, "Session opened");
        id
    }

    /// Queues `message` for the session's worker.
    ///
    /// The reply, if any, is written to the session's stream, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the session is not open, or
    /// [`SessionError::Closed`] if it closes before the message is queued.
    pub async fn route_message(&self, id: &SessionId, message: String) -> Result<(), SessionError> {
        let inbox = self
            .table()
            .get(id)
            .map(|handle| handle.inbox.clone())
            .ok_or_else(|| SessionError::NotFound { id: id.to_string() })?;

        tracing::debug!(session_id = %id, bytes = message.len(), "Routing message");
        inbox
            .send(message)
            .await
            .map_err(|_| SessionError::Closed { id: id.to_string() })
    }

    /// Removes the session and cancels its work.
    ///
    /// Returns `true` if this call performed the teardown. Safe to call any
    /// number of times from any thread.
    pub fn close_session(&self, id: &SessionId) -> bool {
        let Some(handle) = self.table().remove(id) else {
            return false;
        };
        handle.cancel.cancel();
        tracing::info!(session_id = %id, "Session closed");
        true
    }

    /// Closes every open session. Used at shutdown.
    pub fn close_all(&self) -> usize {
        let drained: Vec<(SessionId, SessionHandle)> = self.table().drain().collect();
        for (id, handle) in &drained {
            handle.cancel.cancel();
            tracing::debug!(session_id = %id, "Session closed at shutdown");
        }
        drained.len()
    }

    /// Current state of a session as seen by the router.
    #[must_use]
    pub fn state(&self, id: &SessionId) -> SessionState {
        if self.table().contains_key(id) {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }

    /// Number of open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Whether no session is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}

/// Worker-owned half of a session.
struct Session {
    id: SessionId,
    sink: StreamSink,
    inbox: mpsc::Receiver<String>,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
}

impl Session {
    async fn run(mut self, manager: SessionManager) {
        loop {
            let line = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                line = self.inbox.recv() => match line {
                    Some(line) => line,
                    None => break,
                },
            };

            let Some(reply) = self.dispatcher.handle_line(&line).await else {
                continue;
            };

            if let Err(e) = self.write(&reply).await {
                tracing::warn!(session_id = %self.id, error = %e, "Stream write failed");
                break;
            }
        }

        manager.close_session(&self.id);
        tracing::debug!(session_id = %self.id, "Session worker stopped");
    }

    async fn write(&self, reply: &OutgoingMessage) -> Result<(), TransportError> {
        let line = reply.to_line().map_err(TransportError::Encode)?;
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(TransportError::Closed),
            sent = self.sink.send(SessionEvent::Message(line)) => {
                sent.map_err(|_| TransportError::Closed)
            }
        }
    }
}

/// Failures writing to a session's stream. Always fatal for the session.
#[derive(Debug, Error)]
enum TransportError {
    #[error("stream closed")]
    Closed,
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn manager() -> SessionManager {
        let registry = Arc::new(Registry::load(None).unwrap());
        let upstream =
            UpstreamClient::new(reqwest::Client::new(), "http://127.0.0.1:9/books").unwrap();
        SessionManager::new(registry, upstream, 8)
    }

    async fn next_message(rx: &mut mpsc::Receiver<SessionEvent>) -> serde_json::Value {
        match timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(SessionEvent::Message(line))) => serde_json::from_str(&line).unwrap(),
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[test]
    fn session_id_round_trips_through_display() {
        let id = SessionId::generate();
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
        assert!("not-a-session".parse::<SessionId>().is_err());
    }

    #[tokio::test]
    async fn replies_arrive_in_order() {
        let manager = manager();
        let (tx, mut rx) = mpsc::channel(16);
        let id = manager.open_session(tx);

        for n in 1..=5 {
            manager
                .route_message(&id, format!(r#"{{"jsonrpc":"2.0","id":{n},"method":"ping"}}"#))
                .await
                .unwrap();
        }
        for n in 1..=5 {
            assert_eq!(next_message(&mut rx).await["id"], n);
        }
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let manager = manager();
        let err = manager
            .route_message(&SessionId::generate(), "{}".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound { .. }));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let manager = manager();
        let (tx, mut rx) = mpsc::channel(4);
        let id = manager.open_session(tx);
        assert_eq!(manager.state(&id), SessionState::Open);

        assert!(manager.close_session(&id));
        assert!(!manager.close_session(&id));
        assert_eq!(manager.state(&id), SessionState::Closed);

        // The worker drops the sink once it notices the cancellation.
        let closed = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(closed.is_none());

        let err = manager.route_message(&id, "{}".to_string()).await.unwrap_err();
        assert_eq!(err, SessionError::NotFound { id: id.to_string() });
    }

    #[tokio::test]
    async fn dropped_stream_tears_session_down() {
        let manager = manager();
        let (tx, rx) = mpsc::channel(1);
        let id = manager.open_session(tx);
        drop(rx);

        manager
            .route_message(&id, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#.to_string())
            .await
            .unwrap();

        timeout(Duration::from_secs(5), async {
            while manager.state(&id) == SessionState::Open {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn close_all_empties_table() {
        let manager = manager();
        let mut sinks = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = mpsc::channel(1);
            manager.open_session(tx);
            sinks.push(rx);
        }
        assert_eq!(manager.len(), 3);
        assert_eq!(manager.close_all(), 3);
        assert!(manager.is_empty());
    }
}
