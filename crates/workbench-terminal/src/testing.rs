//! Scripted shell backend for tests.
//!
//! [`FakeBackend`] hands out in-memory shells instead of processes. Each
//! [`FakeShell`] lets a test feed output, read what the session wrote to
//! stdin, inspect delivered signals, and end the "process".

use async_trait::async_trait;
use std::io;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{oneshot, Mutex};

use super::backend::{ProcessControl, ShellBackend, ShellCommand, ShellSignal, SpawnedShell};
use super::error::TerminalError;

const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Default)]
struct BackendState {
    shells: Vec<FakeShell>,
    commands: Vec<ShellCommand>,
}

/// Backend whose shells are driven by the test
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<StdMutex<BackendState>>,
    fail_spawn: bool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every spawn fails as if the shell binary were missing
    pub fn failing() -> Self {
        Self {
            fail_spawn: true,
            ..Self::default()
        }
    }

    /// Number of successful spawns so far
    pub fn spawn_count(&self) -> usize {
        self.lock().shells.len()
    }

    pub fn shell(&self, index: usize) -> Option<FakeShell> {
        self.lock().shells.get(index).cloned()
    }

    pub fn last_shell(&self) -> Option<FakeShell> {
        self.lock().shells.last().cloned()
    }

    /// Every command passed to `spawn`, including failed ones
    pub fn commands(&self) -> Vec<ShellCommand> {
        self.lock().commands.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ShellBackend for FakeBackend {
    async fn spawn(&self, session_id: &str, command: &ShellCommand) -> Result<SpawnedShell, TerminalError> {
        self.lock().commands.push(command.clone());

        if self.fail_spawn {
            return Err(TerminalError::Spawn {
                session_id: session_id.to_string(),
                program: command.program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
            });
        }

        let (stdin_writer, stdin_reader) = tokio::io::duplex(PIPE_CAPACITY);
        let (output_reader, output_writer) = tokio::io::duplex(PIPE_CAPACITY);
        let (exit_tx, exit_rx) = oneshot::channel();

        let shell = FakeShell {
            inner: Arc::new(FakeShellInner {
                output: Mutex::new(Some(output_writer)),
                input: Mutex::new(stdin_reader),
                signals: StdMutex::new(Vec::new()),
                exit_tx: StdMutex::new(Some(exit_tx)),
            }),
        };
        self.lock().shells.push(shell.clone());

        Ok(SpawnedShell {
            pid: None,
            stdin: Box::new(stdin_writer),
            outputs: vec![Box::new(output_reader)],
            control: Arc::new(shell.clone()),
            exit: Box::pin(async move { exit_rx.await.unwrap_or(None) }),
        })
    }

    fn backend_name(&self) -> &str {
        "fake"
    }
}

struct FakeShellInner {
    output: Mutex<Option<DuplexStream>>,
    input: Mutex<DuplexStream>,
    signals: StdMutex<Vec<ShellSignal>>,
    exit_tx: StdMutex<Option<oneshot::Sender<Option<i32>>>>,
}

/// Test handle on one spawned fake shell
#[derive(Clone)]
pub struct FakeShell {
    inner: Arc<FakeShellInner>,
}

impl FakeShell {
    /// Write `data` as if the process printed it
    pub async fn emit(&self, data: &str) {
        let mut output = self.inner.output.lock().await;
        if let Some(writer) = output.as_mut() {
            let _ = writer.write_all(data.as_bytes()).await;
            let _ = writer.flush().await;
        }
    }

    /// Everything written to stdin so far that has not been read yet
    pub async fn read_input(&self) -> String {
        let mut input = self.inner.input.lock().await;
        let mut collected = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            match tokio::time::timeout(Duration::from_millis(20), input.read(&mut buf)).await {
                Ok(Ok(n)) if n > 0 => collected.extend_from_slice(&buf[..n]),
                _ => break,
            }
        }
        String::from_utf8_lossy(&collected).into_owned()
    }

    /// End the process with `code`, closing its output first
    pub async fn exit(&self, code: Option<i32>) {
        self.inner.output.lock().await.take();
        self.finish(code);
    }

    /// Signals delivered to this shell, in order
    pub fn signals(&self) -> Vec<ShellSignal> {
        self.inner
            .signals
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn has_exited(&self) -> bool {
        self.inner
            .exit_tx
            .lock()
            .map(|tx| tx.is_none())
            .unwrap_or(true)
    }

    fn finish(&self, code: Option<i32>) {
        if let Ok(mut tx) = self.inner.exit_tx.lock() {
            if let Some(tx) = tx.take() {
                let _ = tx.send(code);
            }
        }
    }
}

impl ProcessControl for FakeShell {
    fn signal(&self, signal: ShellSignal) -> io::Result<()> {
        if let Ok(mut signals) = self.inner.signals.lock() {
            signals.push(signal);
        }
        // Only a kill is fatal; terminate is ignored like a stubborn shell
        if signal == ShellSignal::Kill {
            if let Ok(mut output) = self.inner.output.try_lock() {
                output.take();
            }
            self.finish(None);
        }
        Ok(())
    }
}
