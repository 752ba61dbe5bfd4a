// Configuration module
//
// Settings are layered: built-in defaults, then the optional TOML file, then
// CLI flags / WORKBENCH_* environment variables.

mod file;

pub use file::{FileConfig, RateLimitSection, TerminalSection};

use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use workbench_sandbox::WORKSPACE_DIR_NAME;
use workbench_terminal::TerminalConfig;

use crate::auth::{AuthStore, StaticTokenStore, TokenFileStore};
use crate::cli::Cli;

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_WEB_DIR_NAME: &str = "dist";
pub const DEFAULT_RATE_LIMIT: u32 = 100;
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(1);

/// Per-connection input throttle settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_frames: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_RATE_LIMIT,
            window: DEFAULT_RATE_WINDOW,
        }
    }
}

/// Where session tokens are checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSource {
    TokenFile(PathBuf),
    Tokens(Vec<String>),
}

impl AuthSource {
    pub fn into_store(self) -> Arc<dyn AuthStore> {
        match self {
            AuthSource::TokenFile(path) => Arc::new(TokenFileStore::new(path)),
            AuthSource::Tokens(tokens) => Arc::new(StaticTokenStore::new(tokens)),
        }
    }
}

/// Fully resolved application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub base_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub web_dir: Option<PathBuf>,
    /// Empty means any origin
    pub cors_origins: Vec<String>,
    pub auth: AuthSource,
    pub log_level: String,
    pub terminal: TerminalConfig,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Load the config file named by `cli` (if any) and layer `cli` on top
    pub fn load(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::resolve(cli, file, &cwd)
    }

    /// Merge `cli` over `file` over defaults. Relative paths are taken from `cwd`.
    pub fn resolve(cli: &Cli, file: FileConfig, cwd: &Path) -> Result<Self> {
        let absolute = |p: PathBuf| if p.is_absolute() { p } else { cwd.join(p) };

        let bind = match cli.bind.or(file.bind) {
            Some(bind) => bind,
            None => DEFAULT_BIND.parse().context("Invalid default bind address")?,
        };

        let base_dir = cli
            .base_dir
            .clone()
            .or(file.base_dir)
            .map(absolute)
            .unwrap_or_else(|| cwd.to_path_buf());

        let workspace_dir = cli
            .workspace_dir
            .clone()
            .or(file.workspace_dir)
            .map(absolute)
            .unwrap_or_else(|| base_dir.join(WORKSPACE_DIR_NAME));

        let web_dir = match cli.web_dir.clone().or(file.web_dir) {
            Some(dir) => Some(absolute(dir)),
            None => {
                let dist = base_dir.join(DEFAULT_WEB_DIR_NAME);
                dist.is_dir().then_some(dist)
            }
        };

        let cors_origins = if cli.cors_origins.is_empty() {
            file.cors_origins.unwrap_or_default()
        } else {
            cli.cors_origins.clone()
        };

        let auth = if let Some(path) = cli.token_file.clone().or(file.token_file) {
            AuthSource::TokenFile(absolute(path))
        } else {
            let tokens = if cli.tokens.is_empty() {
                file.tokens.unwrap_or_default()
            } else {
                cli.tokens.clone()
            };
            let tokens: Vec<String> = tokens
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            if tokens.is_empty() {
                bail!("No session tokens configured: set --token-file or --tokens");
            }
            AuthSource::Tokens(tokens)
        };

        let log_level = cli
            .log_level
            .clone()
            .or(file.log_level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let defaults = TerminalConfig::default();
        let secs = |v: Option<u64>, default: Duration| v.map(Duration::from_secs).unwrap_or(default);
        let terminal = TerminalConfig {
            idle_timeout: secs(cli.idle_timeout.or(file.terminal.idle_timeout), defaults.idle_timeout),
            sweep_interval: secs(cli.sweep_interval.or(file.terminal.sweep_interval), defaults.sweep_interval),
            kill_grace: secs(cli.kill_grace.or(file.terminal.kill_grace), defaults.kill_grace),
            max_sessions: cli
                .max_sessions
                .or(file.terminal.max_sessions)
                .unwrap_or(defaults.max_sessions),
            term: cli.term.clone().or(file.terminal.term).unwrap_or(defaults.term),
            shell: cli.shell.clone().or(file.terminal.shell),
        };

        let rate_limit = RateLimitConfig {
            max_frames: cli
                .rate_limit
                .or(file.rate_limit.max_frames)
                .unwrap_or(DEFAULT_RATE_LIMIT),
            window: cli
                .rate_window_ms
                .or(file.rate_limit.window_ms)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RATE_WINDOW),
        };

        let config = Self {
            bind,
            base_dir,
            workspace_dir,
            web_dir,
            cors_origins,
            auth,
            log_level,
            terminal,
            rate_limit,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.terminal.sweep_interval.is_zero() {
            bail!("Sweep interval must be at least one second");
        }
        if self.terminal.max_sessions == 0 {
            bail!("Maximum sessions must be at least 1");
        }
        if self.rate_limit.max_frames == 0 || self.rate_limit.window.is_zero() {
            bail!("Rate limit needs a non-zero frame count and window");
        }
        Ok(())
    }
}
