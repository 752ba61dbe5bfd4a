//! Workbench server library
//!
//! Sandboxed workspace file access and persistent shell sessions behind an
//! HTTP and WebSocket API.

// Re-export workspace crates
pub use workbench_sandbox::{self as sandbox, WorkspaceRootRegistry};
pub use workbench_terminal::{self as terminal, SessionRegistry, TerminalConfig};

// Local modules
pub mod auth;
pub mod cli;
pub mod config;
pub mod logging;
pub mod web;

// Re-exports from local modules
pub use auth::{AuthError, AuthStore, StaticTokenStore, TokenFileStore};
pub use cli::Cli;
pub use config::{AppConfig, RateLimitConfig};
pub use logging::init_logging;
pub use web::WebServer;
