use std::path::{Path, PathBuf};

use super::error::PathSecurityError;
use super::WORKSPACE_DIR_NAME;

/// Maps an optional workspace identifier to its root directory.
///
/// Pure validation, no I/O: whether the directory exists is the caller's
/// concern.
#[derive(Debug, Clone)]
pub struct WorkspaceRootRegistry {
    base_dir: PathBuf,
    workspace_base: PathBuf,
}

impl WorkspaceRootRegistry {
    /// Registry rooted at `base_dir`, with workspaces under `<base_dir>/workspace`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let workspace_base = base_dir.join(WORKSPACE_DIR_NAME);
        Self {
            base_dir,
            workspace_base,
        }
    }

    /// Registry with an explicit workspace directory
    pub fn with_workspace_base(base_dir: impl Into<PathBuf>, workspace_base: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            workspace_base: workspace_base.into(),
        }
    }

    /// The application's base directory, used when no workspace is given
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory holding one subdirectory per workspace
    pub fn workspace_base(&self) -> &Path {
        &self.workspace_base
    }

    /// Root directory for `workspace_id`, or the base directory for `None`.
    /// An empty identifier counts as `None`.
    pub fn root_for(&self, workspace_id: Option<&str>) -> Result<PathBuf, PathSecurityError> {
        match workspace_id.filter(|id| !id.is_empty()) {
            None => Ok(self.base_dir.clone()),
            Some(id) => {
                validate_workspace_id(id)?;
                Ok(self.workspace_base.join(id))
            }
        }
    }
}

/// Reject identifiers that could name anything but a direct child directory
pub fn validate_workspace_id(id: &str) -> Result<(), PathSecurityError> {
    if id.contains("..") || id.contains('/') || id.contains('\\') {
        return Err(PathSecurityError::InvalidWorkspaceId(id.to_string()));
    }
    Ok(())
}
