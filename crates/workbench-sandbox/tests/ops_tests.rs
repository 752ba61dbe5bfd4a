use std::path::PathBuf;
use tempfile::TempDir;
use workbench_sandbox::ops;
use workbench_sandbox::{EntryKind, FileOpError, PathSecurityError};

fn create_test_root() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().canonicalize().unwrap().join("ws");
    std::fs::create_dir_all(&root).unwrap();
    (temp_dir, root)
}

#[tokio::test]
async fn test_write_then_read() {
    let (_temp, root) = create_test_root();

    let written = ops::write(&root, "notes/today.md", b"- buy milk").await.unwrap();
    assert_eq!(written, root.join("notes/today.md"));

    let content = ops::read_to_string(&root, "notes/today.md").await.unwrap();
    assert_eq!(content, "- buy milk");
}

#[tokio::test]
async fn test_write_outside_root_is_refused() {
    let (_temp, root) = create_test_root();

    let err = ops::write(&root, "../escape.txt", b"nope").await.unwrap_err();
    assert!(matches!(err, FileOpError::Security(PathSecurityError::Traversal)));
    assert!(!root.parent().unwrap().join("escape.txt").exists());
}

#[tokio::test]
async fn test_create_file_and_folder() {
    let (_temp, root) = create_test_root();

    ops::create(&root, "src/lib.rs", EntryKind::File).await.unwrap();
    ops::create(&root, "assets/img", EntryKind::Folder).await.unwrap();

    assert!(root.join("src/lib.rs").is_file());
    assert!(root.join("assets/img").is_dir());
}

#[tokio::test]
async fn test_create_existing_file_keeps_content() {
    let (_temp, root) = create_test_root();
    std::fs::write(root.join("keep.txt"), "important").unwrap();

    ops::create(&root, "keep.txt", EntryKind::File).await.unwrap();
    assert_eq!(std::fs::read_to_string(root.join("keep.txt")).unwrap(), "important");
}

#[tokio::test]
async fn test_rename_within_root() {
    let (_temp, root) = create_test_root();
    std::fs::write(root.join("old.txt"), "content").unwrap();

    ops::rename(&root, "old.txt", "archive/new.txt").await.unwrap();

    assert!(!root.join("old.txt").exists());
    assert_eq!(
        std::fs::read_to_string(root.join("archive/new.txt")).unwrap(),
        "content"
    );
}

#[tokio::test]
async fn test_rename_aborts_before_mutation_when_destination_escapes() {
    let (_temp, root) = create_test_root();
    std::fs::write(root.join("stay.txt"), "content").unwrap();

    let err = ops::rename(&root, "stay.txt", "../../stolen.txt").await.unwrap_err();
    assert!(matches!(err, FileOpError::Security(PathSecurityError::Traversal)));
    assert!(root.join("stay.txt").exists());
}

#[tokio::test]
async fn test_root_cannot_be_removed_or_renamed() {
    let (_temp, root) = create_test_root();

    let err = ops::remove(&root, "").await.unwrap_err();
    assert!(matches!(err, FileOpError::RootProtected));

    let err = ops::remove(&root, "sub/..").await.unwrap_err();
    assert!(matches!(err, FileOpError::RootProtected));

    let err = ops::rename(&root, "/", "moved").await.unwrap_err();
    assert!(matches!(err, FileOpError::RootProtected));
    assert!(root.is_dir());
}

#[tokio::test]
async fn test_remove_file_folder_and_missing() {
    let (_temp, root) = create_test_root();
    std::fs::create_dir_all(root.join("build/out")).unwrap();
    std::fs::write(root.join("build/out/a.o"), "obj").unwrap();
    std::fs::write(root.join("single.txt"), "x").unwrap();

    ops::remove(&root, "build").await.unwrap();
    ops::remove(&root, "single.txt").await.unwrap();
    ops::remove(&root, "never-existed.txt").await.unwrap();

    assert!(!root.join("build").exists());
    assert!(!root.join("single.txt").exists());
}

#[tokio::test]
async fn test_read_missing_file_is_not_found() {
    let (_temp, root) = create_test_root();

    let err = ops::read_to_string(&root, "absent.txt").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_tree_lists_written_files() {
    let (_temp, root) = create_test_root();
    ops::write(&root, "docs/guide.md", b"guide").await.unwrap();
    ops::write(&root, "index.html", b"<html>").await.unwrap();

    let nodes = ops::tree(&root).await.unwrap();
    let names: Vec<_> = nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["docs", "index.html"]);

    let docs = &nodes[0];
    assert_eq!(docs.kind, EntryKind::Folder);
    assert_eq!(docs.children.as_ref().unwrap()[0].path, "docs/guide.md");
}

#[tokio::test]
async fn test_open_streams_file_and_refuses_directory() {
    use tokio::io::AsyncReadExt;

    let (_temp, root) = create_test_root();
    ops::write(&root, "img/logo.png", b"\x89PNG").await.unwrap();

    let (path, mut file) = ops::open(&root, "img/logo.png").await.unwrap();
    assert_eq!(path, root.join("img/logo.png"));
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).await.unwrap();
    assert_eq!(bytes, b"\x89PNG");

    let err = ops::open(&root, "img").await.unwrap_err();
    assert!(matches!(err, FileOpError::IsADirectory(_)));

    let err = ops::open(&root, "../outside.png").await.unwrap_err();
    assert!(matches!(err, FileOpError::Security(PathSecurityError::Traversal)));
}

#[tokio::test]
async fn test_save_upload_into_new_target_dir() {
    let (_temp, root) = create_test_root();

    let stored = ops::save_upload(&root, "assets/icons", "app.svg", b"<svg/>").await.unwrap();
    assert_eq!(stored, "assets/icons/app.svg");
    assert_eq!(std::fs::read(root.join("assets/icons/app.svg")).unwrap(), b"<svg/>");

    let stored = ops::save_upload(&root, "", "top.txt", b"top").await.unwrap();
    assert_eq!(stored, "top.txt");
    assert!(root.join("top.txt").is_file());
}

#[tokio::test]
async fn test_save_upload_rejects_unsafe_names() {
    let (_temp, root) = create_test_root();

    for name in ["", ".", "..", "../x.txt", "a/b.txt", "a\\b.txt", "x..y"] {
        let err = ops::save_upload(&root, "", name, b"data").await.unwrap_err();
        assert!(matches!(err, FileOpError::InvalidFileName(_)), "{:?}", name);
    }

    let err = ops::save_upload(&root, "../elsewhere", "ok.txt", b"data").await.unwrap_err();
    assert!(matches!(err, FileOpError::Security(PathSecurityError::Traversal)));
    assert!(!root.parent().unwrap().join("elsewhere").exists());
}
