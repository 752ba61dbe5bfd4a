// Authentication seam
//
// Session tokens are issued and stored by an external authentication
// subsystem; this module only asks whether a token is currently valid.

use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// The token store could not be consulted
    #[error("Auth store unavailable: {0}")]
    Store(#[from] io::Error),
}

/// Looks up whether a session token is valid
#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn is_valid_session(&self, token: &str) -> Result<bool, AuthError>;
}

/// Fixed, in-memory set of tokens
#[derive(Debug, Clone, Default)]
pub struct StaticTokenStore {
    tokens: HashSet<String>,
}

impl StaticTokenStore {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl AuthStore for StaticTokenStore {
    async fn is_valid_session(&self, token: &str) -> Result<bool, AuthError> {
        Ok(self.tokens.contains(token))
    }
}

/// Tokens read from a file, one per line, on every lookup.
///
/// Blank lines and lines starting with `#` are ignored. Re-reading lets the
/// issuing side rotate tokens without a restart.
#[derive(Debug, Clone)]
pub struct TokenFileStore {
    path: PathBuf,
}

impl TokenFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuthStore for TokenFileStore {
    async fn is_valid_session(&self, token: &str) -> Result<bool, AuthError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .any(|line| line == token))
    }
}
