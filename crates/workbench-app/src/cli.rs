use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// CLI arguments for workbench-server.
///
/// Every flag can also come from a `WORKBENCH_*` environment variable
/// (including ones loaded from `.env`). Anything left unset falls back to the
/// config file, then to built-in defaults.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "workbench-server")]
#[command(about = "Self-hosted workspace server: sandboxed files and browser terminals")]
#[command(version)]
pub struct Cli {
    /// TOML config file
    #[arg(short, long, env = "WORKBENCH_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to listen on (default 0.0.0.0:3000)
    #[arg(long, env = "WORKBENCH_BIND", value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    /// Application base directory; shells start here when no workspace is given
    #[arg(long, env = "WORKBENCH_BASE_DIR", value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Directory holding one sub-directory per workspace (default <base>/workspace)
    #[arg(long, env = "WORKBENCH_WORKSPACE_DIR", value_name = "DIR")]
    pub workspace_dir: Option<PathBuf>,

    /// Static front-end directory (default <base>/dist when present)
    #[arg(long, env = "WORKBENCH_WEB_DIR", value_name = "DIR")]
    pub web_dir: Option<PathBuf>,

    /// Allowed CORS origins, comma separated (default: any)
    #[arg(long, env = "WORKBENCH_CORS_ORIGINS", value_delimiter = ',', value_name = "ORIGIN")]
    pub cors_origins: Vec<String>,

    /// File with one valid session token per line, re-read on every check
    #[arg(long, env = "WORKBENCH_TOKEN_FILE", value_name = "FILE")]
    pub token_file: Option<PathBuf>,

    /// Valid session tokens, comma separated (ignored when --token-file is set)
    #[arg(long, env = "WORKBENCH_TOKENS", value_delimiter = ',', value_name = "TOKEN", hide_env_values = true)]
    pub tokens: Vec<String>,

    /// Default log filter when RUST_LOG is unset (default info)
    #[arg(long, env = "WORKBENCH_LOG_LEVEL", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Seconds without input before a terminal session is evicted (default 1800)
    #[arg(long, env = "WORKBENCH_IDLE_TIMEOUT", value_name = "SECS")]
    pub idle_timeout: Option<u64>,

    /// Seconds between idle sweeps (default 60)
    #[arg(long, env = "WORKBENCH_SWEEP_INTERVAL", value_name = "SECS")]
    pub sweep_interval: Option<u64>,

    /// Seconds between terminate and kill when evicting (default 5)
    #[arg(long, env = "WORKBENCH_KILL_GRACE", value_name = "SECS")]
    pub kill_grace: Option<u64>,

    /// Maximum concurrent terminal sessions (default 32)
    #[arg(long, env = "WORKBENCH_MAX_SESSIONS", value_name = "N")]
    pub max_sessions: Option<usize>,

    /// Input frames accepted per connection per window (default 100)
    #[arg(long, env = "WORKBENCH_RATE_LIMIT", value_name = "N")]
    pub rate_limit: Option<u32>,

    /// Rate limit window in milliseconds (default 1000)
    #[arg(long, env = "WORKBENCH_RATE_WINDOW_MS", value_name = "MS")]
    pub rate_window_ms: Option<u64>,

    /// TERM value for spawned shells (default xterm-256color)
    #[arg(long, env = "WORKBENCH_TERM", value_name = "TERM")]
    pub term: Option<String>,

    /// Shell program (default: powershell.exe on Windows, $SHELL or bash elsewhere)
    #[arg(long, env = "WORKBENCH_SHELL", value_name = "PROGRAM")]
    pub shell: Option<String>,
}
