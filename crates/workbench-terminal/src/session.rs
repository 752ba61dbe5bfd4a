use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::backend::ProcessControl;
use super::input::InputLine;
use super::SUBSCRIBER_QUEUE_CAPACITY;

/// Opaque session identifier handed to clients
pub type SessionId = String;

/// Identifies one attached connection
pub type ConnectionId = uuid::Uuid;

/// Events delivered to attached connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Ready { session_id: SessionId },
    Output { session_id: SessionId, data: String },
    /// `code` is `None` when the process was killed or evicted
    Exit { session_id: SessionId, code: Option<i32> },
}

/// An output subscription held by one connection.
///
/// The queue is bounded. A subscriber that falls a full queue behind is
/// dropped and its lag signal is cancelled so the owning connection can
/// close itself.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub connection_id: ConnectionId,
    pub sender: mpsc::Sender<SessionEvent>,
    lagged: CancellationToken,
}

impl Subscriber {
    pub fn new(connection_id: ConnectionId, sender: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            connection_id,
            sender,
            lagged: CancellationToken::new(),
        }
    }

    /// Use `token` as the lag signal, typically one shared by every
    /// subscription a connection makes
    pub fn with_lag_signal(mut self, token: CancellationToken) -> Self {
        self.lagged = token;
        self
    }

    pub fn lag_signal(&self) -> CancellationToken {
        self.lagged.clone()
    }

    /// Queue `event` without waiting. False means the subscription is dead.
    pub(crate) fn deliver(&self, event: SessionEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(connection_id = %self.connection_id, "subscriber fell behind, dropping it");
                self.lagged.cancel();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Bounded event queue for one subscriber
pub fn subscriber_channel() -> (mpsc::Sender<SessionEvent>, mpsc::Receiver<SessionEvent>) {
    mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Process is being spawned; not yet visible in the registry
    Pending,
    Running,
    Exited,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Pending => write!(f, "pending"),
            SessionState::Running => write!(f, "running"),
            SessionState::Exited => write!(f, "exited"),
        }
    }
}

/// Point-in-time view of a session, safe to hand out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: SessionId,
    pub working_dir: String,
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub idle_secs: u64,
    pub connections: usize,
    pub state: SessionState,
}

/// Registry-owned record of one shell process
pub(crate) struct TerminalSession {
    pub(crate) id: SessionId,
    /// Distinguishes this record from any later one reusing the id
    pub(crate) serial: u64,
    pub(crate) pid: Option<u32>,
    pub(crate) working_dir: PathBuf,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) last_activity: Instant,
    pub(crate) input_line: InputLine,
    pub(crate) state: SessionState,
    /// Feeds the session's stdin writer task
    pub(crate) input_tx: mpsc::Sender<String>,
    pub(crate) control: Arc<dyn ProcessControl>,
    pub(crate) exited: Arc<AtomicBool>,
    subscribers: Vec<Subscriber>,
}

/// What is left of a session after it leaves the registry
pub(crate) struct Released {
    pub(crate) id: SessionId,
    pub(crate) control: Arc<dyn ProcessControl>,
    pub(crate) exited: Arc<AtomicBool>,
}

impl TerminalSession {
    pub(crate) fn new(
        id: SessionId,
        serial: u64,
        pid: Option<u32>,
        working_dir: PathBuf,
        input_tx: mpsc::Sender<String>,
        control: Arc<dyn ProcessControl>,
        exited: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            serial,
            pid,
            working_dir,
            created_at: Utc::now(),
            last_activity: Instant::now(),
            input_line: InputLine::new(),
            state: SessionState::Running,
            input_tx,
            control,
            exited,
            subscribers: Vec::new(),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Attach a connection, replacing an earlier subscription it held
    pub(crate) fn subscribe(&mut self, subscriber: Subscriber) {
        self.subscribers
            .retain(|s| s.connection_id != subscriber.connection_id);
        self.subscribers.push(subscriber);
    }

    pub(crate) fn unsubscribe(&mut self, connection_id: ConnectionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.connection_id != connection_id);
        self.subscribers.len() != before
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver to every attached connection, dropping ones that went away
    /// or fell behind
    pub(crate) fn broadcast(&mut self, event: SessionEvent) {
        self.subscribers.retain(|s| s.deliver(event.clone()));
    }

    pub(crate) fn info(&self, now: Instant) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            working_dir: self.working_dir.display().to_string(),
            pid: self.pid,
            created_at: self.created_at,
            idle_secs: now.saturating_duration_since(self.last_activity).as_secs(),
            connections: self.subscribers.len(),
            state: self.state,
        }
    }

    /// Tell every attached connection the session is gone and hand back what
    /// is needed to finish off the process. Consumes the record.
    pub(crate) fn release(mut self, code: Option<i32>) -> Released {
        self.state = SessionState::Exited;
        let event = SessionEvent::Exit {
            session_id: self.id.clone(),
            code,
        };
        self.broadcast(event);

        Released {
            id: self.id,
            control: self.control,
            exited: self.exited,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ShellSignal;
    use std::io;

    struct NoopControl;

    impl ProcessControl for NoopControl {
        fn signal(&self, _signal: ShellSignal) -> io::Result<()> {
            Ok(())
        }
    }

    fn make_session() -> TerminalSession {
        let (input_tx, _input_rx) = mpsc::channel(8);
        TerminalSession::new(
            "term-test".to_string(),
            1,
            Some(42),
            PathBuf::from("/srv/ws"),
            input_tx,
            Arc::new(NoopControl),
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn output(data: &str) -> SessionEvent {
        SessionEvent::Output {
            session_id: "term-test".to_string(),
            data: data.to_string(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_drops_closed_subscribers() {
        let mut session = make_session();
        let (tx_a, mut rx_a) = subscriber_channel();
        let (tx_b, rx_b) = subscriber_channel();
        session.subscribe(Subscriber::new(ConnectionId::new_v4(), tx_a));
        session.subscribe(Subscriber::new(ConnectionId::new_v4(), tx_b));
        drop(rx_b);

        session.broadcast(output("hello"));

        assert_eq!(session.subscriber_count(), 1);
        assert!(matches!(rx_a.recv().await, Some(SessionEvent::Output { .. })));
    }

    #[tokio::test]
    async fn test_stalled_subscriber_is_dropped_and_signalled() {
        let mut session = make_session();
        let (tx_live, mut rx_live) = subscriber_channel();
        let (tx_stalled, _rx_stalled) = subscriber_channel();
        let stalled = Subscriber::new(ConnectionId::new_v4(), tx_stalled);
        let lagged = stalled.lag_signal();
        session.subscribe(Subscriber::new(ConnectionId::new_v4(), tx_live));
        session.subscribe(stalled);

        for i in 0..SUBSCRIBER_QUEUE_CAPACITY {
            session.broadcast(output(&i.to_string()));
            assert_eq!(rx_live.recv().await, Some(output(&i.to_string())));
        }
        assert_eq!(session.subscriber_count(), 2);
        assert!(!lagged.is_cancelled());

        session.broadcast(output("one too many"));

        assert_eq!(session.subscriber_count(), 1);
        assert!(lagged.is_cancelled());
        assert_eq!(rx_live.recv().await, Some(output("one too many")));
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_connection() {
        let mut session = make_session();
        let connection_id = ConnectionId::new_v4();
        let (tx, _rx) = subscriber_channel();
        session.subscribe(Subscriber::new(connection_id, tx.clone()));
        session.subscribe(Subscriber::new(connection_id, tx));
        assert_eq!(session.subscriber_count(), 1);

        assert!(session.unsubscribe(connection_id));
        assert!(!session.unsubscribe(connection_id));
    }

    #[tokio::test]
    async fn test_release_notifies_exit() {
        let mut session = make_session();
        let (tx, mut rx) = subscriber_channel();
        session.subscribe(Subscriber::new(ConnectionId::new_v4(), tx));

        let released = session.release(None);
        assert_eq!(released.id, "term-test");
        assert_eq!(
            rx.recv().await,
            Some(SessionEvent::Exit {
                session_id: "term-test".to_string(),
                code: None
            })
        );
    }

    #[test]
    fn test_info_serializes_camel_case() {
        let session = make_session();
        let info = session.info(Instant::now());
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["workingDir"], "/srv/ws");
        assert_eq!(json["state"], "running");
        assert_eq!(json["connections"], 0);
        assert!(json["createdAt"].is_string());
    }
}
