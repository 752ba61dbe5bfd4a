use anyhow::{Context, Result};
use axum::http::{HeaderValue, Request};
use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{info, info_span, warn};
use workbench_sandbox::WorkspaceRootRegistry;
use workbench_terminal::{spawn_sweeper, ProcessBackend, SessionRegistry, ShellBackend};

use crate::auth::AuthStore;
use crate::config::AppConfig;
use crate::web::routes::{self, AppState};

/// Web server configuration
pub struct WebServerConfig {
    pub bind_addr: SocketAddr,
    pub web_dir: Option<PathBuf>,
    pub cors_origins: Vec<String>,
}

/// Web server instance
pub struct WebServer {
    config: WebServerConfig,
    state: AppState,
}

impl WebServer {
    /// Build the server from resolved configuration with the process backend
    pub fn from_config(config: AppConfig) -> Self {
        let auth = config.auth.clone().into_store();
        Self::with_backend(config, auth, Arc::new(ProcessBackend::new()))
    }

    pub fn with_backend(
        config: AppConfig,
        auth: Arc<dyn AuthStore>,
        backend: Arc<dyn ShellBackend>,
    ) -> Self {
        let roots = WorkspaceRootRegistry::with_workspace_base(&config.base_dir, &config.workspace_dir);
        let registry = SessionRegistry::new(roots.clone(), backend, config.terminal.clone());

        Self {
            config: WebServerConfig {
                bind_addr: config.bind,
                web_dir: config.web_dir,
                cors_origins: config.cors_origins,
            },
            state: AppState {
                registry,
                roots,
                auth,
                rate_limit: config.rate_limit,
            },
        }
    }

    /// Get the session registry
    pub fn registry(&self) -> SessionRegistry {
        self.state.registry.clone()
    }

    /// Full router: API, static files, CORS and request tracing
    pub fn router(&self) -> Router {
        let mut app = routes::create_router(self.state.clone());

        if let Some(web_dir) = &self.config.web_dir {
            if web_dir.is_dir() {
                info!(dir = %web_dir.display(), "serving static files");
                app = app.fallback_service(ServeDir::new(web_dir));
            } else {
                warn!(dir = %web_dir.display(), "web directory not found, static files disabled");
            }
        }

        // Log method and path only; query strings may carry tokens
        let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
            info_span!("http", method = %request.method(), path = %request.uri().path())
        });

        app.layer(
            ServiceBuilder::new()
                .layer(trace)
                .layer(cors_layer(&self.config.cors_origins)),
        )
    }

    /// Start the web server and run until ctrl-c
    pub async fn start(self) -> Result<()> {
        let app = self.router();
        let registry = self.state.registry.clone();

        let cancel = CancellationToken::new();
        let sweeper = spawn_sweeper(registry.clone(), cancel.clone());

        let listener = tokio::net::TcpListener::bind(&self.config.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.bind_addr))?;

        info!(addr = %self.config.bind_addr, "web server listening");
        info!("terminal endpoint: ws://{}/api/term/ws", self.config.bind_addr);

        let shutdown = cancel.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
                    _ = shutdown.cancelled() => {}
                }
            })
            .await
            .context("Web server failed")?;

        cancel.cancel();
        let _ = sweeper.await;
        registry.shutdown().await;
        info!("web server stopped");
        Ok(())
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(values))
}
