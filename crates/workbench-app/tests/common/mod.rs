#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use workbench::config::{AppConfig, AuthSource, RateLimitConfig};
use workbench::{AuthStore, StaticTokenStore, WebServer};
use workbench_terminal::testing::FakeBackend;
use workbench_terminal::TerminalConfig;

pub const TOKEN: &str = "test-session-token";

/// A server over a temp base directory with one workspace, `alpha`
pub struct TestServer {
    _temp: TempDir,
    pub base: PathBuf,
    pub backend: FakeBackend,
    pub server: WebServer,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_auth(Arc::new(StaticTokenStore::new([TOKEN])))
    }

    pub fn with_auth(auth: Arc<dyn AuthStore>) -> Self {
        let temp = TempDir::new().unwrap();
        let base = temp.path().canonicalize().unwrap();
        std::fs::create_dir_all(base.join("workspace/alpha")).unwrap();

        let config = AppConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            base_dir: base.clone(),
            workspace_dir: base.join("workspace"),
            web_dir: None,
            cors_origins: Vec::new(),
            auth: AuthSource::Tokens(vec![TOKEN.to_string()]),
            log_level: "info".to_string(),
            terminal: TerminalConfig {
                shell: Some("bash".to_string()),
                ..TerminalConfig::default()
            },
            rate_limit: RateLimitConfig::default(),
        };
        let backend = FakeBackend::new();
        let server = WebServer::with_backend(config, auth, Arc::new(backend.clone()));

        Self {
            _temp: temp,
            base,
            backend,
            server,
        }
    }
}
