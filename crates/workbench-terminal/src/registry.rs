use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use workbench_sandbox::{resolve, WorkspaceRootRegistry};

use super::backend::{ShellBackend, ShellCommand, ShellSignal, SpawnedShell};
use super::error::TerminalError;
use super::input::control_signals;
use super::output::Utf8Chunker;
use super::session::{
    ConnectionId, Released, SessionEvent, SessionId, SessionInfo, Subscriber, TerminalSession,
};
use super::{TerminalConfig, INPUT_QUEUE_CAPACITY, OUTPUT_CHUNK_SIZE};

/// How long an exiting session waits for its output streams to drain
const EXIT_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// What a connection asked for in its `init`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachRequest {
    pub session_id: Option<SessionId>,
    pub workspace_id: Option<String>,
}

/// Outcome of a successful create-or-attach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attached {
    pub session_id: SessionId,
    /// True when an existing process was reused
    pub reattached: bool,
}

/// What the caller should do after a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOutcome {
    /// An `exit`/`logout` line was entered; close this connection only
    pub close_connection: bool,
    /// The shell's input queue was full and the data was discarded
    pub dropped: bool,
}

#[derive(Default)]
struct Sessions {
    running: HashMap<SessionId, TerminalSession>,
    /// Ids reserved while their process is being spawned
    pending: HashSet<SessionId>,
}

impl Sessions {
    fn is_taken(&self, id: &str) -> bool {
        self.running.contains_key(id) || self.pending.contains(id)
    }

    fn count(&self) -> usize {
        self.running.len() + self.pending.len()
    }

    /// Remove the record only if it is still the one identified by `serial`
    fn take(&mut self, id: &str, serial: u64) -> Option<TerminalSession> {
        match self.running.get(id) {
            Some(session) if session.serial == serial => self.running.remove(id),
            _ => None,
        }
    }
}

struct Inner {
    roots: WorkspaceRootRegistry,
    backend: Arc<dyn ShellBackend>,
    config: TerminalConfig,
    sessions: Mutex<Sessions>,
    next_serial: AtomicU64,
}

/// Owns every shell process, keyed by session id.
///
/// All record mutation happens behind one mutex; callers only ever see ids
/// and [`SessionInfo`] snapshots. Cloning is cheap and shares the same
/// registry.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("backend", &self.inner.backend.backend_name())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl SessionRegistry {
    pub fn new(
        roots: WorkspaceRootRegistry,
        backend: Arc<dyn ShellBackend>,
        config: TerminalConfig,
    ) -> Self {
        info!(
            backend = backend.backend_name(),
            max_sessions = config.max_sessions,
            "terminal session registry ready"
        );
        Self {
            inner: Arc::new(Inner {
                roots,
                backend,
                config,
                sessions: Mutex::new(Sessions::default()),
                next_serial: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &TerminalConfig {
        &self.inner.config
    }

    /// Attach `subscriber` to a running session, or spawn a new one.
    ///
    /// A known `session_id` reuses its process. Anything else, including an
    /// unknown id, gets a fresh generated id and a new shell. `Ready` is
    /// queued to the subscriber before any output of the session.
    pub async fn create_or_attach(
        &self,
        request: AttachRequest,
        subscriber: Subscriber,
    ) -> Result<Attached, TerminalError> {
        let session_id = {
            let mut sessions = self.inner.sessions.lock().await;

            if let Some(id) = request.session_id.as_deref() {
                if let Some(session) = sessions.running.get_mut(id) {
                    session.touch();
                    let _ = subscriber.sender.try_send(SessionEvent::Ready {
                        session_id: session.id.clone(),
                    });
                    session.subscribe(subscriber);
                    info!(session_id = id, connections = session.subscriber_count(), "attached to existing session");
                    return Ok(Attached {
                        session_id: session.id.clone(),
                        reattached: true,
                    });
                }
                debug!(session_id = id, "requested session unknown, starting a new one");
            }

            let session_id = generate_session_id(&sessions);
            if sessions.count() >= self.inner.config.max_sessions {
                warn!(max = self.inner.config.max_sessions, "session limit reached");
                return Err(TerminalError::SessionLimit {
                    session_id,
                    max: self.inner.config.max_sessions,
                });
            }
            sessions.pending.insert(session_id.clone());
            session_id
        };

        let working_dir = self.working_dir_for(request.workspace_id.as_deref()).await;
        let command = match &self.inner.config.shell {
            Some(program) => ShellCommand::for_program(program, working_dir.clone(), &self.inner.config.term),
            None => ShellCommand::detect(working_dir.clone(), &self.inner.config.term),
        };

        let spawned = self.inner.backend.spawn(&session_id, &command).await;

        let mut sessions = self.inner.sessions.lock().await;
        sessions.pending.remove(&session_id);
        let spawned = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                warn!(session_id = %session_id, program = %command.program, error = %e, "failed to spawn shell");
                return Err(e);
            }
        };

        let SpawnedShell {
            pid,
            stdin,
            outputs,
            control,
            exit,
        } = spawned;

        let serial = self.inner.next_serial.fetch_add(1, Ordering::Relaxed);
        let exited = Arc::new(AtomicBool::new(false));
        let input_tx = spawn_stdin_writer(session_id.clone(), stdin);
        let mut session = TerminalSession::new(
            session_id.clone(),
            serial,
            pid,
            working_dir,
            input_tx,
            control,
            exited.clone(),
        );
        let _ = subscriber.sender.try_send(SessionEvent::Ready {
            session_id: session_id.clone(),
        });
        session.subscribe(subscriber);

        info!(
            session_id = %session_id,
            pid,
            program = %command.program,
            working_dir = %session.working_dir.display(),
            "terminal session started"
        );
        sessions.running.insert(session_id.clone(), session);
        drop(sessions);

        // Pumps only start once the record (and Ready) is in place
        let pumps: Vec<JoinHandle<()>> = outputs
            .into_iter()
            .map(|reader| {
                tokio::spawn(pump_output(
                    self.inner.clone(),
                    session_id.clone(),
                    serial,
                    reader,
                ))
            })
            .collect();
        tokio::spawn(watch_exit(
            self.inner.clone(),
            session_id.clone(),
            serial,
            exit,
            exited,
            pumps,
        ));

        Ok(Attached {
            session_id,
            reattached: false,
        })
    }

    /// Forward `data` verbatim to the session's shell.
    ///
    /// Interrupt, stop and quit characters are delivered as signals before
    /// the data is queued. Never waits on the shell's stdin: when the input
    /// queue is full the data is dropped and reported in the outcome.
    pub async fn write(&self, session_id: &str, data: &str) -> Result<WriteOutcome, TerminalError> {
        let mut sessions = self.inner.sessions.lock().await;
        let session = sessions
            .running
            .get_mut(session_id)
            .ok_or_else(|| TerminalError::SessionNotFound(session_id.to_string()))?;
        session.touch();
        let line = session.input_line.feed(data);

        for signal in control_signals(data) {
            debug!(session_id, %signal, "forwarding control signal");
            if let Err(e) = session.control.signal(signal) {
                warn!(session_id, %signal, error = %e, "failed to deliver control signal");
            }
        }

        let dropped = match session.input_tx.try_send(data.to_string()) {
            Ok(()) => false,
            Err(TrySendError::Full(_)) => {
                warn!(session_id, bytes = data.len(), "shell is not reading input, dropping");
                true
            }
            Err(TrySendError::Closed(_)) => {
                return Err(TerminalError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "shell input closed",
                )));
            }
        };
        drop(sessions);

        if line.exit_requested {
            info!(session_id, "exit command typed, closing connection");
        }
        Ok(WriteOutcome {
            close_connection: line.exit_requested,
            dropped,
        })
    }

    /// Stop sending output to one connection. The process keeps running.
    pub async fn detach_output(&self, session_id: &str, connection_id: ConnectionId) -> bool {
        let mut sessions = self.inner.sessions.lock().await;
        let detached = sessions
            .running
            .get_mut(session_id)
            .map(|session| session.unsubscribe(connection_id))
            .unwrap_or(false);
        if detached {
            debug!(session_id, %connection_id, "connection detached");
        }
        detached
    }

    /// Remove a session and escalate terminate → kill on its process
    pub async fn kill(&self, session_id: &str) -> Result<(), TerminalError> {
        let released = {
            let mut sessions = self.inner.sessions.lock().await;
            let session = sessions
                .running
                .remove(session_id)
                .ok_or_else(|| TerminalError::SessionNotFound(session_id.to_string()))?;
            session.release(None)
        };

        info!(session_id, "terminal session killed");
        self.escalate(released);
        Ok(())
    }

    /// Evict every session idle for longer than the configured timeout.
    ///
    /// Evicted sessions leave the registry right away; their processes get
    /// terminated in the background. Returns how many were evicted.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let idle_timeout = self.inner.config.idle_timeout;

        let released: Vec<Released> = {
            let mut sessions = self.inner.sessions.lock().await;
            let idle: Vec<SessionId> = sessions
                .running
                .values()
                .filter(|s| now.saturating_duration_since(s.last_activity) > idle_timeout)
                .map(|s| s.id.clone())
                .collect();

            idle.iter()
                .filter_map(|id| sessions.running.remove(id))
                .map(|session| session.release(None))
                .collect()
        };

        let evicted = released.len();
        for session in released {
            info!(session_id = %session.id, "evicting idle terminal session");
            self.escalate(session);
        }
        evicted
    }

    /// Snapshot of all running sessions, oldest first
    pub async fn list(&self) -> Vec<SessionInfo> {
        let now = Instant::now();
        let sessions = self.inner.sessions.lock().await;
        let mut infos: Vec<SessionInfo> = sessions.running.values().map(|s| s.info(now)).collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        infos
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.inner.sessions.lock().await.running.contains_key(session_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.sessions.lock().await.running.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Kill every session and wait for the escalations to finish
    pub async fn shutdown(&self) {
        let released: Vec<Released> = {
            let mut sessions = self.inner.sessions.lock().await;
            sessions
                .running
                .drain()
                .map(|(_, session)| session.release(None))
                .collect()
        };

        if released.is_empty() {
            return;
        }
        info!(count = released.len(), "shutting down terminal sessions");
        let handles: Vec<_> = released.into_iter().map(|s| self.escalate(s)).collect();
        join_all(handles).await;
    }

    /// Terminate, wait out the grace period, then kill if still alive
    fn escalate(&self, released: Released) -> JoinHandle<()> {
        let grace = self.inner.config.kill_grace;
        tokio::spawn(async move {
            let Released { id, control, exited } = released;

            if let Err(e) = control.signal(ShellSignal::Terminate) {
                debug!(session_id = %id, error = %e, "terminate signal not delivered");
            }
            tokio::time::sleep(grace).await;

            if !exited.load(Ordering::SeqCst) {
                warn!(session_id = %id, "shell ignored terminate, killing");
                if let Err(e) = control.signal(ShellSignal::Kill) {
                    debug!(session_id = %id, error = %e, "kill signal not delivered");
                }
            }
        })
    }

    async fn working_dir_for(&self, workspace_id: Option<&str>) -> PathBuf {
        let base_dir = self.inner.roots.base_dir().to_path_buf();

        let root = match self.inner.roots.root_for(workspace_id) {
            Ok(root) => root,
            Err(e) => {
                warn!(?workspace_id, error = %e, "invalid workspace, using base directory");
                return base_dir;
            }
        };

        match resolve(&root, "").await {
            Ok(dir) => match tokio::fs::metadata(&dir).await {
                Ok(meta) if meta.is_dir() => dir,
                _ => {
                    warn!(?workspace_id, dir = %dir.display(), "workspace directory missing, using base directory");
                    base_dir
                }
            },
            Err(e) => {
                warn!(?workspace_id, error = %e, "workspace directory unusable, using base directory");
                base_dir
            }
        }
    }
}

/// Ids look like `term-1a2b3c4d` and are never reused while taken
fn generate_session_id(sessions: &Sessions) -> SessionId {
    loop {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        let id = format!("term-{}", &uuid[..8]);
        if !sessions.is_taken(&id) {
            return id;
        }
    }
}

/// Own the shell's stdin in a task of its own so a full pipe only ever
/// stalls this task. Ends when the session record (the sender) is dropped.
fn spawn_stdin_writer(session_id: SessionId, mut stdin: Box<dyn AsyncWrite + Send + Unpin>) -> mpsc::Sender<String> {
    let (tx, mut rx) = mpsc::channel::<String>(INPUT_QUEUE_CAPACITY);
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            let written = async {
                stdin.write_all(data.as_bytes()).await?;
                stdin.flush().await
            };
            if let Err(e) = written.await {
                debug!(session_id = %session_id, error = %e, "shell stdin closed");
                break;
            }
        }
    });
    tx
}

async fn pump_output(
    inner: Arc<Inner>,
    session_id: SessionId,
    serial: u64,
    mut reader: Box<dyn AsyncRead + Send + Unpin>,
) {
    let mut buf = vec![0u8; OUTPUT_CHUNK_SIZE];
    let mut chunker = Utf8Chunker::new();

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if let Some(data) = chunker.push(&buf[..n]) {
                    broadcast_output(&inner, &session_id, serial, data).await;
                }
            }
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "output stream closed");
                break;
            }
        }
    }

    if let Some(data) = chunker.finish() {
        broadcast_output(&inner, &session_id, serial, data).await;
    }
}

async fn broadcast_output(inner: &Inner, session_id: &str, serial: u64, data: String) {
    let mut sessions = inner.sessions.lock().await;
    if let Some(session) = sessions.running.get_mut(session_id) {
        if session.serial == serial {
            session.broadcast(SessionEvent::Output {
                session_id: session_id.to_string(),
                data,
            });
        }
    }
}

async fn watch_exit(
    inner: Arc<Inner>,
    session_id: SessionId,
    serial: u64,
    exit: futures::future::BoxFuture<'static, Option<i32>>,
    exited: Arc<AtomicBool>,
    pumps: Vec<JoinHandle<()>>,
) {
    let code = exit.await;
    exited.store(true, Ordering::SeqCst);

    // Let trailing output reach subscribers before the exit frame
    if tokio::time::timeout(EXIT_DRAIN_TIMEOUT, join_all(pumps)).await.is_err() {
        debug!(session_id = %session_id, "output streams still open after exit");
    }

    let session = inner.sessions.lock().await.take(&session_id, serial);
    match session {
        Some(session) => {
            info!(session_id = %session_id, code, "terminal session exited");
            session.release(code);
        }
        None => debug!(session_id = %session_id, code, "evicted session process exited"),
    }
}
