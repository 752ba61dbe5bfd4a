// Workspace sandbox module
//
// Maps workspace identifiers to directories and resolves caller-supplied
// relative paths so that no operation can leave the workspace root, whether
// through `..` segments, symlinks, or paths that do not exist yet.

mod error;
mod resolver;
mod roots;
pub mod ops;

// Re-export public API
pub use error::{FileOpError, PathSecurityError};
pub use ops::{EntryKind, FileNode};
pub use resolver::{resolve, resolve_pair};
pub use roots::WorkspaceRootRegistry;

// Constants
pub const WORKSPACE_DIR_NAME: &str = "workspace";
pub const TREE_SKIPPED_DIRS: &[&str] = &["node_modules"];
