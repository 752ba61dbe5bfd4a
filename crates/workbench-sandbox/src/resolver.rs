/// Path resolution confined to a workspace root
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::error::PathSecurityError;

/// Resolve `relative` under `root`, refusing anything that would leave it.
///
/// The lexical check runs before the filesystem is consulted for the
/// candidate, so `../..` style requests are rejected without touching the
/// real path. Existing targets come back fully canonicalized; targets that
/// do not exist yet come back as the lexical candidate once their closest
/// existing ancestor has been proven to be a directory inside the root.
pub async fn resolve(root: &Path, relative: &str) -> Result<PathBuf, PathSecurityError> {
    let real_root = canonical_root(root).await;
    let candidate = join_lexically(&real_root, relative)?;

    if !candidate.starts_with(&real_root) {
        debug!(path = %relative, "rejected traversal");
        return Err(PathSecurityError::Traversal);
    }

    match fs::canonicalize(&candidate).await {
        Ok(real_path) if real_path.starts_with(&real_root) => Ok(real_path),
        Ok(real_path) => {
            debug!(path = %relative, target = %real_path.display(), "rejected symlink escape");
            Err(PathSecurityError::SymlinkEscape)
        }
        Err(err) => match fs::symlink_metadata(&candidate).await {
            // A link whose target is missing cannot be proven to stay inside
            Ok(meta) if meta.file_type().is_symlink() => Err(PathSecurityError::SymlinkEscape),
            Ok(_) => Err(PathSecurityError::Internal(err)),
            Err(_) => {
                check_nearest_ancestor(&candidate, &real_root).await?;
                Ok(candidate)
            }
        },
    }
}

/// Resolve both endpoints of a move under the same root.
///
/// Either endpoint failing aborts the whole operation, so callers never
/// mutate the filesystem with only one side validated.
pub async fn resolve_pair(
    root: &Path,
    from: &str,
    to: &str,
) -> Result<(PathBuf, PathBuf), PathSecurityError> {
    let source = resolve(root, from).await?;
    let destination = resolve(root, to).await?;
    Ok((source, destination))
}

/// Canonical form of the root, or the root as given when it cannot be
/// canonicalized (a missing root then fails later in the ancestor check)
pub(crate) async fn canonical_root(root: &Path) -> PathBuf {
    match fs::canonicalize(root).await {
        Ok(real_root) => real_root,
        Err(e) => {
            debug!(root = %root.display(), error = %e, "workspace root not canonicalizable");
            root.to_path_buf()
        }
    }
}

/// Join without touching the filesystem, folding `.` and `..` segments
fn join_lexically(real_root: &Path, relative: &str) -> Result<PathBuf, PathSecurityError> {
    let trimmed = relative.trim_start_matches(|c: char| c == '/' || c == '\\');
    let mut candidate = real_root.to_path_buf();

    for component in Path::new(trimmed).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                candidate.pop();
            }
            Component::Normal(part) => candidate.push(part),
            // Drive prefixes or roots that survive trimming would replace the base
            Component::RootDir | Component::Prefix(_) => return Err(PathSecurityError::Traversal),
        }
    }

    Ok(candidate)
}

/// Walk up from a missing target to the first ancestor that exists, which
/// must canonicalize inside the root and be a directory
async fn check_nearest_ancestor(candidate: &Path, real_root: &Path) -> Result<(), PathSecurityError> {
    let mut current = candidate.parent();

    while let Some(dir) = current {
        if fs::symlink_metadata(dir).await.is_err() {
            current = dir.parent();
            continue;
        }

        let real_dir = fs::canonicalize(dir)
            .await
            .map_err(|_| PathSecurityError::InvalidParent)?;
        if !real_dir.starts_with(real_root) {
            debug!(parent = %real_dir.display(), "rejected parent outside root");
            return Err(PathSecurityError::InvalidParent);
        }

        let meta = fs::metadata(&real_dir)
            .await
            .map_err(|_| PathSecurityError::InvalidParent)?;
        if !meta.is_dir() {
            return Err(PathSecurityError::InvalidParent);
        }
        return Ok(());
    }

    Err(PathSecurityError::InvalidParent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_lexically_folds_segments() {
        let root = Path::new("/ws/alpha");
        assert_eq!(
            join_lexically(root, "a/./b/../c.txt").unwrap(),
            PathBuf::from("/ws/alpha/a/c.txt")
        );
        assert_eq!(
            join_lexically(root, "//notes/today.md").unwrap(),
            PathBuf::from("/ws/alpha/notes/today.md")
        );
        assert_eq!(join_lexically(root, "").unwrap(), PathBuf::from("/ws/alpha"));
    }

    #[test]
    fn test_join_lexically_can_leave_root() {
        let root = Path::new("/ws/alpha");
        let joined = join_lexically(root, "../../etc/passwd").unwrap();
        assert_eq!(joined, PathBuf::from("/etc/passwd"));
        assert!(!joined.starts_with(root));
    }

    #[test]
    fn test_prefix_check_is_component_wise() {
        let root = Path::new("/ws/alpha");
        let joined = join_lexically(root, "../alpha2/file").unwrap();
        assert!(!joined.starts_with(root));
    }

    #[tokio::test]
    async fn test_traversal_rejected_for_nonexistent_root() {
        // Fails before any filesystem lookup of the candidate itself
        let err = resolve(Path::new("/ws/alpha"), "../../etc/passwd")
            .await
            .unwrap_err();
        assert!(matches!(err, PathSecurityError::Traversal));
    }
}
