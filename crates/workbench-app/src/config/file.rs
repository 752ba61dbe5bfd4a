use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Contents of the optional TOML config file. Every key is optional.
///
/// ```toml
/// bind = "127.0.0.1:3000"
/// base_dir = "/srv/workbench"
/// token_file = "/srv/workbench/tokens"
///
/// [terminal]
/// idle_timeout = 900
/// shell = "/bin/bash"
///
/// [rate_limit]
/// max_frames = 100
/// window_ms = 1000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub bind: Option<SocketAddr>,
    pub base_dir: Option<PathBuf>,
    pub workspace_dir: Option<PathBuf>,
    pub web_dir: Option<PathBuf>,
    pub cors_origins: Option<Vec<String>>,
    pub token_file: Option<PathBuf>,
    pub tokens: Option<Vec<String>>,
    pub log_level: Option<String>,
    pub terminal: TerminalSection,
    pub rate_limit: RateLimitSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TerminalSection {
    pub idle_timeout: Option<u64>,
    pub sweep_interval: Option<u64>,
    pub kill_grace: Option<u64>,
    pub max_sessions: Option<usize>,
    pub term: Option<String>,
    pub shell: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitSection {
    pub max_frames: Option<u32>,
    pub window_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
