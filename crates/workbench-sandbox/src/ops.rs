// Sandboxed file operations
//
// Every operation resolves its paths through the resolver first; nothing is
// read or written until resolution has succeeded.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::FileOpError;
use super::resolver::{canonical_root, resolve, resolve_pair};
use super::TREE_SKIPPED_DIRS;

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Folder => write!(f, "folder"),
        }
    }
}

/// One node of a workspace tree listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileNode {
    pub name: String,
    /// Path relative to the workspace root, `/`-separated
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
}

/// Recursive listing of `root`, folders first, then by name.
///
/// Dot-entries and `node_modules` are skipped and symlinks are listed as
/// files without being followed. A missing root yields an empty tree.
pub async fn tree(root: &Path) -> Result<Vec<FileNode>, FileOpError> {
    if fs::metadata(root).await.is_err() {
        return Ok(Vec::new());
    }

    let root = root.to_path_buf();
    let nodes = tokio::task::spawn_blocking(move || build_tree(&root, ""))
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;
    Ok(nodes)
}

fn build_tree(dir: &Path, relative: &str) -> io::Result<Vec<FileNode>> {
    let mut nodes = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || TREE_SKIPPED_DIRS.contains(&name.as_str()) {
            continue;
        }

        let path = if relative.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", relative, name)
        };

        let node = if entry.file_type()?.is_dir() {
            let children = build_tree(&entry.path(), &path)?;
            FileNode {
                name,
                path,
                kind: EntryKind::Folder,
                children: Some(children),
            }
        } else {
            FileNode {
                name,
                path,
                kind: EntryKind::File,
                children: None,
            }
        };
        nodes.push(node);
    }

    nodes.sort_by(|a, b| match (a.kind, b.kind) {
        (EntryKind::Folder, EntryKind::File) => std::cmp::Ordering::Less,
        (EntryKind::File, EntryKind::Folder) => std::cmp::Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });

    Ok(nodes)
}

/// Read a text file inside the root
pub async fn read_to_string(root: &Path, relative: &str) -> Result<String, FileOpError> {
    let full_path = resolve(root, relative).await?;
    Ok(fs::read_to_string(&full_path).await?)
}

/// Open a file inside the root for streaming. Returns the resolved path
/// alongside the handle.
pub async fn open(root: &Path, relative: &str) -> Result<(PathBuf, fs::File), FileOpError> {
    let full_path = resolve(root, relative).await?;
    if fs::metadata(&full_path).await?.is_dir() {
        return Err(FileOpError::IsADirectory(relative.to_string()));
    }
    let file = fs::File::open(&full_path).await?;
    Ok((full_path, file))
}

/// Store an uploaded file as `<target_dir>/<file_name>`, creating the
/// directory. Returns the stored path relative to the root.
pub async fn save_upload(
    root: &Path,
    target_dir: &str,
    file_name: &str,
    content: &[u8],
) -> Result<String, FileOpError> {
    validate_file_name(file_name)?;

    let dir = target_dir.trim_matches(|c: char| c == '/' || c == '\\');
    let relative = if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", dir, file_name)
    };

    write(root, &relative, content).await?;
    debug!(path = %relative, bytes = content.len(), "stored upload");
    Ok(relative)
}

fn validate_file_name(name: &str) -> Result<(), FileOpError> {
    if name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(FileOpError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

/// Replace a file's contents atomically, creating missing parent directories
pub async fn write(root: &Path, relative: &str, content: &[u8]) -> Result<PathBuf, FileOpError> {
    let full_path = resolve(root, relative).await?;
    ensure_parent(&full_path).await?;
    atomic_write(&full_path, content).await?;
    Ok(full_path)
}

/// Create an empty file or a folder. Creating something that already exists
/// leaves it untouched.
pub async fn create(root: &Path, relative: &str, kind: EntryKind) -> Result<PathBuf, FileOpError> {
    let full_path = resolve(root, relative).await?;

    match kind {
        EntryKind::Folder => fs::create_dir_all(&full_path).await?,
        EntryKind::File => {
            ensure_parent(&full_path).await?;
            fs::OpenOptions::new()
                .write(true)
                .create(true)
                .open(&full_path)
                .await?;
        }
    }

    debug!(path = %full_path.display(), %kind, "created entry");
    Ok(full_path)
}

/// Move or rename within the root. Both endpoints are resolved before
/// anything is touched.
pub async fn rename(root: &Path, from: &str, to: &str) -> Result<(), FileOpError> {
    let (source, destination) = resolve_pair(root, from, to).await?;
    let real_root = canonical_root(root).await;
    if source == real_root || destination == real_root {
        return Err(FileOpError::RootProtected);
    }

    ensure_parent(&destination).await?;
    fs::rename(&source, &destination).await?;
    Ok(())
}

/// Remove a file or a folder recursively. A missing target is not an error.
pub async fn remove(root: &Path, relative: &str) -> Result<(), FileOpError> {
    let full_path = resolve(root, relative).await?;
    let real_root = canonical_root(root).await;
    if full_path == real_root {
        return Err(FileOpError::RootProtected);
    }

    let meta = match fs::symlink_metadata(&full_path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if meta.is_dir() {
        fs::remove_dir_all(&full_path).await?;
    } else {
        fs::remove_file(&full_path).await?;
    }
    Ok(())
}

async fn ensure_parent(path: &Path) -> Result<(), FileOpError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
        if !fs::metadata(parent).await?.is_dir() {
            return Err(FileOpError::NotADirectory(parent.display().to_string()));
        }
    }
    Ok(())
}

/// Write to a sibling temp file, then rename over the target
async fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix = Uuid::new_v4().simple().to_string();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!("{}.{}.{}.tmp", file_name, millis, &suffix[..8]));

    let result = async {
        fs::write(&temp_path, content).await?;
        fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = &result {
        warn!(path = %path.display(), error = %e, "atomic write failed");
        let _ = fs::remove_file(&temp_path).await;
    }
    result
}
