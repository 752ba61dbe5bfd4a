use serde::{Deserialize, Serialize};
use workbench_terminal::{SessionEvent, SessionId};

/// Frames sent from the browser terminal to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Start a new session or re-attach to an existing one
    Init {
        #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        #[serde(rename = "workspaceId", default, skip_serializing_if = "Option::is_none")]
        workspace_id: Option<String>,
    },
    /// Keystrokes for the attached session
    Input {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        data: String,
    },
}

impl ClientFrame {
    /// Parse one text frame; anything malformed is an error for the caller to log
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Frames sent from the server to the browser terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Ready {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    Output {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        data: String,
    },
    Exit {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        code: Option<i32>,
    },
}

impl From<SessionEvent> for ServerFrame {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Ready { session_id } => ServerFrame::Ready { session_id },
            SessionEvent::Output { session_id, data } => ServerFrame::Output { session_id, data },
            SessionEvent::Exit { session_id, code } => ServerFrame::Exit { session_id, code },
        }
    }
}
