/// Process-based shell backend (piped stdio via tokio::process)
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::backend::{ProcessControl, ShellBackend, ShellCommand, ShellSignal, SpawnedShell};
use super::error::TerminalError;

/// Spawns shells as child processes with piped stdin, stdout and stderr.
///
/// Each child is supervised by a task that owns the `Child` handle, waits for
/// it to exit, and delivers signals queued through its `ProcessControl`.
#[derive(Debug, Default, Clone)]
pub struct ProcessBackend;

impl ProcessBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ShellBackend for ProcessBackend {
    async fn spawn(&self, session_id: &str, command: &ShellCommand) -> Result<SpawnedShell, TerminalError> {
        let spawn_error = |source: io::Error| TerminalError::Spawn {
            session_id: session_id.to_string(),
            program: command.program.clone(),
            source,
        };

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.working_dir)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so control signals reach foreground jobs too
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(spawn_error)?;
        let pid = child.id();

        let missing = |name: &str| spawn_error(io::Error::new(io::ErrorKind::BrokenPipe, format!("{} not captured", name)));
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(supervise(child, pid, signal_rx, exit_tx));

        debug!(session_id, pid, program = %command.program, "shell process started");

        Ok(SpawnedShell {
            pid,
            stdin: Box::new(stdin),
            outputs: vec![Box::new(stdout), Box::new(stderr)],
            control: Arc::new(ChannelControl { tx: signal_tx }),
            exit: Box::pin(async move { exit_rx.await.unwrap_or(None) }),
        })
    }

    fn backend_name(&self) -> &str {
        "process"
    }
}

/// Queues signals for the supervising task
struct ChannelControl {
    tx: mpsc::UnboundedSender<ShellSignal>,
}

impl ProcessControl for ChannelControl {
    fn signal(&self, signal: ShellSignal) -> io::Result<()> {
        self.tx
            .send(signal)
            .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "process already exited"))
    }
}

async fn supervise(
    mut child: Child,
    pid: Option<u32>,
    mut signals: mpsc::UnboundedReceiver<ShellSignal>,
    exit_tx: oneshot::Sender<Option<i32>>,
) {
    let code = loop {
        tokio::select! {
            status = child.wait() => {
                break match status {
                    Ok(status) => status.code(),
                    Err(e) => {
                        warn!(pid, error = %e, "failed waiting for shell process");
                        None
                    }
                };
            }
            Some(signal) = signals.recv() => {
                if let Err(e) = deliver(&mut child, pid, signal) {
                    warn!(pid, %signal, error = %e, "failed to signal shell process");
                }
            }
        }
    };

    debug!(pid, code, "shell process exited");
    let _ = exit_tx.send(code);
}

#[cfg(unix)]
fn deliver(_child: &mut Child, pid: Option<u32>, signal: ShellSignal) -> io::Result<()> {
    let pid = pid.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "process has no pid"))? as libc::pid_t;
    let signo = match signal {
        ShellSignal::Interrupt => libc::SIGINT,
        ShellSignal::Stop => libc::SIGTSTP,
        ShellSignal::Quit => libc::SIGQUIT,
        ShellSignal::Terminate => libc::SIGTERM,
        ShellSignal::Kill => libc::SIGKILL,
    };

    // Group first, then the shell alone if the group is already gone
    // SAFETY: kill(2) has no memory-safety preconditions.
    if unsafe { libc::kill(-pid, signo) } == 0 {
        return Ok(());
    }
    // SAFETY: as above.
    if unsafe { libc::kill(pid, signo) } == 0 {
        return Ok(());
    }
    Err(io::Error::last_os_error())
}

#[cfg(not(unix))]
fn deliver(child: &mut Child, _pid: Option<u32>, signal: ShellSignal) -> io::Result<()> {
    match signal {
        ShellSignal::Terminate | ShellSignal::Kill => child.start_kill(),
        // No console control events for piped children
        ShellSignal::Interrupt | ShellSignal::Stop | ShellSignal::Quit => Ok(()),
    }
}
