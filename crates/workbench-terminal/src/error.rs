use std::io;
use thiserror::Error;

use super::session::SessionId;

#[derive(Debug, Error)]
pub enum TerminalError {
    /// The shell process could not be started; no session was registered
    #[error("Failed to spawn shell '{program}': {source}")]
    Spawn {
        session_id: SessionId,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Maximum concurrent sessions ({max}) reached")]
    SessionLimit { session_id: SessionId, max: usize },

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl TerminalError {
    /// Id that was allocated for a session that never got registered
    pub fn session_id(&self) -> Option<&str> {
        match self {
            TerminalError::Spawn { session_id, .. } | TerminalError::SessionLimit { session_id, .. } => {
                Some(session_id)
            }
            TerminalError::SessionNotFound(id) => Some(id),
            TerminalError::Io(_) => None,
        }
    }

    /// True when a new session could not be started
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, TerminalError::Spawn { .. } | TerminalError::SessionLimit { .. })
    }
}
