use std::io;
use thiserror::Error;

/// Reasons a path was refused by the sandbox.
///
/// Every variant except `Internal` is a security rejection: the operation is
/// aborted outright and no fallback path is attempted.
#[derive(Debug, Error)]
pub enum PathSecurityError {
    /// The lexically joined path lies outside the workspace root
    #[error("Path traversal detected")]
    Traversal,

    /// The path exists but resolves outside the root through a symlink
    #[error("Symlink escape detected")]
    SymlinkEscape,

    /// The target does not exist and its closest existing ancestor is not a
    /// directory inside the root
    #[error("Invalid path")]
    InvalidParent,

    /// Workspace identifier contains `..`, `/` or `\`
    #[error("Invalid workspace ID: {0}")]
    InvalidWorkspaceId(String),

    /// Any other filesystem failure, propagated unchanged
    #[error("Filesystem error: {0}")]
    Internal(#[from] io::Error),
}

impl PathSecurityError {
    /// True for rejections caused by the request itself rather than the host
    pub fn is_rejection(&self) -> bool {
        !matches!(self, PathSecurityError::Internal(_))
    }
}

/// Errors from sandboxed file operations
#[derive(Debug, Error)]
pub enum FileOpError {
    #[error(transparent)]
    Security(#[from] PathSecurityError),

    /// Removing or renaming the workspace root itself
    #[error("Operation not permitted on the workspace root")]
    RootProtected,

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    /// Upload name that is empty, a dot entry, or carries a separator or `..`
    #[error("Invalid filename: {0}")]
    InvalidFileName(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FileOpError {
    /// True when the target simply does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            FileOpError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            FileOpError::Security(PathSecurityError::Internal(e)) => {
                e.kind() == io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}
