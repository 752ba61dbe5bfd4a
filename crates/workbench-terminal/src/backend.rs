/// Shell backend abstraction: how a session's process gets started and signalled
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

use super::error::TerminalError;

/// Signals a session may deliver to its process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellSignal {
    /// Ctrl-C
    Interrupt,
    /// Ctrl-Z
    Stop,
    /// Ctrl-\
    Quit,
    /// Graceful termination, first phase of eviction
    Terminate,
    /// Forced kill, second phase of eviction
    Kill,
}

impl std::fmt::Display for ShellSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShellSignal::Interrupt => write!(f, "SIGINT"),
            ShellSignal::Stop => write!(f, "SIGTSTP"),
            ShellSignal::Quit => write!(f, "SIGQUIT"),
            ShellSignal::Terminate => write!(f, "SIGTERM"),
            ShellSignal::Kill => write!(f, "SIGKILL"),
        }
    }
}

/// What to launch for a new session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Overrides applied on top of the inherited environment
    pub env: Vec<(String, String)>,
}

impl ShellCommand {
    /// Platform shell: `powershell.exe` on Windows, `$SHELL` or `bash` elsewhere
    pub fn detect(working_dir: impl Into<PathBuf>, term: &str) -> Self {
        Self::for_program(default_shell(), working_dir, term)
    }

    /// Launch `program`, adding `-i` when it is a POSIX-style shell
    pub fn for_program(program: impl Into<String>, working_dir: impl Into<PathBuf>, term: &str) -> Self {
        let program = program.into();
        let args = if is_posix_shell(&program) {
            vec!["-i".to_string()]
        } else {
            Vec::new()
        };

        Self {
            program,
            args,
            working_dir: working_dir.into(),
            env: vec![("TERM".to_string(), term.to_string())],
        }
    }
}

fn default_shell() -> String {
    if cfg!(windows) {
        "powershell.exe".to_string()
    } else {
        std::env::var("SHELL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "bash".to_string())
    }
}

fn is_posix_shell(program: &str) -> bool {
    let name = Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    matches!(
        name.as_str(),
        "sh" | "bash" | "zsh" | "dash" | "ksh" | "mksh" | "ash" | "fish"
    )
}

/// Delivers signals to a running process
pub trait ProcessControl: Send + Sync {
    fn signal(&self, signal: ShellSignal) -> io::Result<()>;
}

/// A freshly started shell, handed over to the registry which owns it from
/// then on
pub struct SpawnedShell {
    pub pid: Option<u32>,
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    /// stdout and stderr, in that order when both exist
    pub outputs: Vec<Box<dyn AsyncRead + Send + Unpin>>,
    pub control: Arc<dyn ProcessControl>,
    /// Resolves with the exit code once the process is gone
    pub exit: BoxFuture<'static, Option<i32>>,
}

impl std::fmt::Debug for SpawnedShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedShell")
            .field("pid", &self.pid)
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

/// Starts shell processes for the session registry
#[async_trait]
pub trait ShellBackend: Send + Sync {
    /// Start `command`. The session id is only used for error reporting.
    async fn spawn(&self, session_id: &str, command: &ShellCommand) -> Result<SpawnedShell, TerminalError>;

    /// Get backend name for debugging
    fn backend_name(&self) -> &str;
}
