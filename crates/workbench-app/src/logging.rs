use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const REDACTED_PREFIX_CHARS: usize = 8;

/// Install the global subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_logging(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "workbench={level},workbench_sandbox={level},workbench_terminal={level},tower_http={level}",
            level = default_level
        ))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {}", e))
}

/// Loggable form of a session token: the first 8 characters (never more
/// than half of the token) and `...`, or `none`
pub fn redact_token(token: Option<&str>) -> String {
    match token {
        Some(token) if !token.is_empty() => {
            let keep = REDACTED_PREFIX_CHARS.min(token.chars().count() / 2);
            let prefix: String = token.chars().take(keep).collect();
            format!("{}...", prefix)
        }
        _ => "none".to_string(),
    }
}

/// Request path without its query string
pub fn path_without_query(uri: &str) -> &str {
    uri.split('?').next().unwrap_or(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_token() {
        assert_eq!(redact_token(Some("0123456789abcdef")), "01234567...");
        assert_eq!(redact_token(Some("short")), "sh...");
        assert_eq!(redact_token(Some("")), "none");
        assert_eq!(redact_token(None), "none");
    }

    #[test]
    fn test_path_without_query() {
        assert_eq!(path_without_query("/api/term/ws?token=secret"), "/api/term/ws");
        assert_eq!(path_without_query("/health"), "/health");
    }
}
