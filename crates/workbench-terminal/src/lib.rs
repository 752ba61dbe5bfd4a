// Terminal session management module
//
// Owns interactive shell processes independently of the connections that
// drive them. Sessions are created or re-attached by id, fan their output
// out to every attached connection, and are torn down when the process
// exits, when an administrator kills them, or when they sit idle too long.

mod error;
mod input;
mod output;
mod registry;
mod session;
mod sweeper;
pub mod backend;
mod process_backend;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::time::Duration;

// Re-export public API
pub use backend::{ProcessControl, ShellBackend, ShellCommand, ShellSignal, SpawnedShell};
pub use error::TerminalError;
pub use input::{control_signal, InputLine, LineEvent};
pub use process_backend::ProcessBackend;
pub use registry::{AttachRequest, Attached, SessionRegistry, WriteOutcome};
pub use session::{
    subscriber_channel, ConnectionId, SessionEvent, SessionId, SessionInfo, SessionState, Subscriber,
};
pub use sweeper::spawn_sweeper;

// Constants
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_SESSIONS: usize = 32;
pub const DEFAULT_TERM: &str = "xterm-256color";
pub const OUTPUT_CHUNK_SIZE: usize = 4096;
pub const MAX_INPUT_LINE_CHARS: usize = 256;
/// Input chunks queued for a shell that is not reading its stdin
pub const INPUT_QUEUE_CAPACITY: usize = 256;
/// Events queued for one attached connection before it counts as stalled
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 1024;

/// Tunables for the session registry and its sweeper
#[derive(Debug, Clone)]
pub struct TerminalConfig {
    /// Sessions idle for longer than this are evicted by the sweeper
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
    /// Time between the graceful terminate and the forced kill
    pub kill_grace: Duration,
    pub max_sessions: usize,
    /// Value forced into the spawned shell's `TERM`
    pub term: String,
    /// Shell program override; detected from the platform when `None`
    pub shell: Option<String>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            kill_grace: DEFAULT_KILL_GRACE,
            max_sessions: DEFAULT_MAX_SESSIONS,
            term: DEFAULT_TERM.to_string(),
            shell: None,
        }
    }
}
