// Terminal connection gateway
//
// One `Connection` per WebSocket. It authenticates once, then turns text
// frames into registry calls and registry events into frames. It never owns
// a process: closing a connection only detaches it.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use workbench_terminal::{
    subscriber_channel, AttachRequest, ConnectionId, SessionEvent, SessionId, SessionRegistry, Subscriber,
    TerminalError,
};

use super::protocol::{ClientFrame, ServerFrame};
use super::rate_limit::RateLimiter;
use crate::auth::AuthStore;
use crate::config::RateLimitConfig;

/// Close status sent when a connection is refused at the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseStatus {
    pub code: u16,
    pub reason: &'static str,
}

impl CloseStatus {
    pub const MISSING_TOKEN: CloseStatus = CloseStatus {
        code: close_code::POLICY,
        reason: "Unauthorized: Missing token",
    };
    pub const INVALID_TOKEN: CloseStatus = CloseStatus {
        code: close_code::POLICY,
        reason: "Unauthorized: Invalid token",
    };
    pub const AUTH_ERROR: CloseStatus = CloseStatus {
        code: close_code::ERROR,
        reason: "Internal Server Error",
    };
    /// The browser stopped draining output and the session dropped it
    pub const LAGGED: CloseStatus = CloseStatus {
        code: close_code::AGAIN,
        reason: "Output backlog exceeded",
    };
    pub const NORMAL: CloseStatus = CloseStatus {
        code: close_code::NORMAL,
        reason: "",
    };

    fn into_message(self) -> Message {
        Message::Close(Some(CloseFrame {
            code: self.code,
            reason: Cow::Borrowed(self.reason),
        }))
    }
}

/// Check a connection's token before any frame is read
pub async fn authenticate(store: &dyn AuthStore, token: Option<&str>) -> Result<(), CloseStatus> {
    let token = match token {
        Some(token) if !token.is_empty() => token,
        _ => return Err(CloseStatus::MISSING_TOKEN),
    };

    match store.is_valid_session(token).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(CloseStatus::INVALID_TOKEN),
        Err(e) => {
            error!(error = %e, "auth store lookup failed");
            Err(CloseStatus::AUTH_ERROR)
        }
    }
}

/// Visible error text for a shell that could not be started
pub fn spawn_failure_banner(message: &str) -> String {
    format!("\r\n\x1b[31mFailed to spawn shell: {}\x1b[0m\r\n", message)
}

/// What the socket loop should do after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    Close,
}

/// Protocol state of one authenticated connection
pub struct Connection {
    id: ConnectionId,
    registry: SessionRegistry,
    limiter: RateLimiter,
    attached: Option<SessionId>,
    events_tx: mpsc::Sender<SessionEvent>,
    lagged: CancellationToken,
}

impl Connection {
    /// New connection plus the receiver for everything it should send out
    pub fn new(
        registry: SessionRegistry,
        rate_limit: RateLimitConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (events_tx, events_rx) = subscriber_channel();
        let connection = Self {
            id: Uuid::new_v4(),
            registry,
            limiter: RateLimiter::new(rate_limit),
            attached: None,
            events_tx,
            lagged: CancellationToken::new(),
        };
        (connection, events_rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn attached(&self) -> Option<&str> {
        self.attached.as_deref()
    }

    /// Cancelled once the session dropped this connection for not keeping up
    pub fn lag_signal(&self) -> CancellationToken {
        self.lagged.clone()
    }

    /// Handle one text frame. Malformed or out-of-place frames are logged
    /// and dropped.
    pub async fn handle_text(&mut self, text: &str) -> FrameOutcome {
        let frame = match ClientFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "dropping malformed frame");
                return FrameOutcome::Continue;
            }
        };

        match frame {
            ClientFrame::Init {
                session_id,
                workspace_id,
            } => {
                self.handle_init(session_id, workspace_id).await;
                FrameOutcome::Continue
            }
            ClientFrame::Input { session_id, data } => self.handle_input(session_id, data).await,
        }
    }

    async fn handle_init(&mut self, session_id: Option<SessionId>, workspace_id: Option<String>) {
        if let Some(current) = &self.attached {
            warn!(connection_id = %self.id, session_id = %current, "ignoring repeated init");
            return;
        }

        let request = AttachRequest {
            session_id,
            workspace_id,
        };
        let subscriber =
            Subscriber::new(self.id, self.events_tx.clone()).with_lag_signal(self.lagged.clone());

        match self.registry.create_or_attach(request, subscriber).await {
            Ok(attached) => {
                debug!(
                    connection_id = %self.id,
                    session_id = %attached.session_id,
                    reattached = attached.reattached,
                    "connection attached"
                );
                self.attached = Some(attached.session_id);
            }
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "could not start terminal session");
                self.report_spawn_failure(&e);
            }
        }
    }

    async fn handle_input(&mut self, session_id: SessionId, data: String) -> FrameOutcome {
        if !self.limiter.check() {
            debug!(connection_id = %self.id, session_id = %session_id, "rate limit exceeded, dropping input");
            return FrameOutcome::Continue;
        }

        if self.attached.as_deref() != Some(session_id.as_str()) {
            warn!(connection_id = %self.id, session_id = %session_id, "input for a session this connection is not attached to");
            return FrameOutcome::Continue;
        }

        match self.registry.write(&session_id, &data).await {
            Ok(outcome) if outcome.close_connection => FrameOutcome::Close,
            Ok(outcome) => {
                if outcome.dropped {
                    debug!(connection_id = %self.id, session_id = %session_id, "shell input queue full, input dropped");
                }
                FrameOutcome::Continue
            }
            Err(TerminalError::SessionNotFound(_)) => {
                debug!(connection_id = %self.id, session_id = %session_id, "input for a session that is gone");
                self.attached = None;
                FrameOutcome::Continue
            }
            Err(e) => {
                warn!(connection_id = %self.id, session_id = %session_id, error = %e, "failed to write to shell");
                FrameOutcome::Continue
            }
        }
    }

    fn report_spawn_failure(&self, err: &TerminalError) {
        let message = match err {
            TerminalError::Spawn { source, .. } => source.to_string(),
            other => other.to_string(),
        };
        let _ = self.events_tx.try_send(SessionEvent::Output {
            session_id: err.session_id().unwrap_or_default().to_string(),
            data: spawn_failure_banner(&message),
        });
    }

    /// The session's exit frame has gone out; a later `init` may start over
    pub fn on_event_sent(&mut self, event: &SessionEvent) {
        if let SessionEvent::Exit { session_id, .. } = event {
            if self.attached.as_deref() == Some(session_id.as_str()) {
                self.attached = None;
            }
        }
    }

    /// Detach from the session, leaving its process running
    pub async fn close(self) {
        if let Some(session_id) = &self.attached {
            self.registry.detach_output(session_id, self.id).await;
        }
        debug!(connection_id = %self.id, "connection closed");
    }
}

/// Drive an upgraded socket until either side closes it
pub async fn serve_socket(
    socket: WebSocket,
    registry: SessionRegistry,
    store: std::sync::Arc<dyn AuthStore>,
    token: Option<String>,
    rate_limit: RateLimitConfig,
) {
    let (mut sink, mut stream) = socket.split();

    if let Err(status) = authenticate(store.as_ref(), token.as_deref()).await {
        warn!(code = status.code, reason = status.reason, "terminal connection rejected");
        let _ = sink.send(status.into_message()).await;
        let _ = sink.close().await;
        return;
    }

    let (mut connection, mut events) = Connection::new(registry, rate_limit);
    let lagged = connection.lag_signal();
    info!(connection_id = %connection.id(), "terminal connection authenticated");

    loop {
        tokio::select! {
            _ = lagged.cancelled() => {
                warn!(connection_id = %connection.id(), "closing connection that fell behind on output");
                let _ = sink.send(CloseStatus::LAGGED.into_message()).await;
                break;
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if connection.handle_text(&text).await == FrameOutcome::Close {
                            let _ = sink.send(CloseStatus::NORMAL.into_message()).await;
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/Pong handled by axum; binary frames are not part of the protocol
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(connection_id = %connection.id(), error = %e, "socket error");
                        break;
                    }
                }
            }
            Some(event) = events.recv() => {
                let json = match serde_json::to_string(&ServerFrame::from(event.clone())) {
                    Ok(json) => json,
                    Err(e) => {
                        error!(error = %e, "failed to encode frame");
                        continue;
                    }
                };
                if sink.send(Message::Text(json)).await.is_err() {
                    break;
                }
                connection.on_event_sent(&event);
            }
        }
    }

    connection.close().await;
}
