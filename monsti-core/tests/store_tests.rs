//! Node store behaviour against a real directory tree.

use assert_fs::prelude::*;
use monsti_core::{
    store::{NODE_FILE, PATH_NODE_TYPE},
    NodeStore, StoreError,
};
use predicates::prelude::predicate;
use serde_json::json;

fn store(root: &assert_fs::TempDir) -> NodeStore {
    NodeStore::new(root.path())
}

// ---------------------------------------------------------------------------
// 1. Read / write
// ---------------------------------------------------------------------------

#[test]
fn written_node_reads_back_with_path() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let store = store(&root);
    let document = json!({"Type": "core.Document", "Fields": {"core.Title": "Team"}});
    store
        .write_node_data("/a/b", NODE_FILE, document.to_string().as_bytes())
        .expect("write");

    let node = store.get_node("/a/b").expect("read").expect("present");
    assert_eq!(node["Path"], "/a/b");
    assert_eq!(node["Type"], "core.Document");
    assert_eq!(node["Fields"]["core.Title"], "Team");
}

#[test]
fn write_node_drops_injected_path() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let store = store(&root);
    store
        .write_node("/doc", &json!({"Path": "/doc", "Type": "core.Document"}))
        .expect("write");

    let raw = std::fs::read_to_string(root.child("doc").child(NODE_FILE).path()).expect("raw");
    assert!(!raw.contains("Path"), "Path must not be persisted: {raw}");
    root.child("doc")
        .child("node.json.tmp")
        .assert(predicate::path::missing());
}

#[test]
fn missing_node_and_data_are_absent() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let store = store(&root);
    assert!(store.get_node("/nope").expect("node").is_none());
    assert!(store.get_node_data("/nope", "core.File").expect("data").is_none());
}

#[test]
fn empty_directory_is_not_a_node() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("empty").create_dir_all().expect("mkdir");
    assert!(store(&root).get_node("/empty").expect("read").is_none());
}

#[test]
fn malformed_node_is_an_error() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("bad").child(NODE_FILE).write_str("{ not json").expect("write");
    let err = store(&root).get_node("/bad").unwrap_err();
    assert!(matches!(err, StoreError::MalformedNode { .. }), "got: {err}");
}

#[test]
fn node_data_roundtrip_creates_ancestors() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let store = store(&root);
    store
        .write_node_data("/gallery/picture", "core.File", &[0xff, 0x00, 0x42])
        .expect("write");
    root.child("gallery/picture/core.File")
        .assert(predicate::path::is_file());
    assert_eq!(
        store.get_node_data("/gallery/picture", "core.File").expect("read"),
        Some(vec![0xff, 0x00, 0x42])
    );
}

#[test]
fn blocked_directory_prevents_write() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("file").write_str("plain file").expect("write");
    let err = store(&root)
        .write_node_data("/file/child", "core.Body", b"x")
        .unwrap_err();
    assert!(matches!(err, StoreError::Io { .. }), "got: {err}");
    root.child("file").assert("plain file");
}

#[test]
fn data_file_names_cannot_escape_node() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let err = store(&root)
        .write_node_data("/a", "../escape", b"x")
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidPath { .. }));
}

// ---------------------------------------------------------------------------
// 2. Children
// ---------------------------------------------------------------------------

#[test]
fn children_include_placeholders_and_skip_files() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("a/b/node.json")
        .write_str(r#"{"Type":"core.Document"}"#)
        .expect("b");
    root.child("a/c/picture.png").write_binary(b"png").expect("c");
    root.child("a/stray.txt").write_str("stray").expect("stray");

    let children = store(&root).get_children("/a").expect("children");
    assert_eq!(children.len(), 2);
    assert_eq!(children[0]["Path"], "/a/b");
    assert_eq!(children[0]["Type"], "core.Document");
    assert_eq!(children[1], json!({"Path": "/a/c", "Type": PATH_NODE_TYPE}));
}

#[test]
fn children_of_root_use_absolute_paths() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("about").create_dir_all().expect("mkdir");
    let children = store(&root).get_children("/").expect("children");
    assert_eq!(children, vec![json!({"Path": "/about", "Type": PATH_NODE_TYPE})]);
}

#[test]
fn broken_child_aborts_listing() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("a/good/node.json").write_str("{}").expect("good");
    root.child("a/bad/node.json").write_str("[").expect("bad");
    assert!(store(&root).get_children("/a").is_err());
}

// ---------------------------------------------------------------------------
// 3. Remove / rename
// ---------------------------------------------------------------------------

#[test]
fn remove_deletes_subtree() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let store = store(&root);
    store.write_node("/a/b", &json!({"Type": "core.Document"})).expect("b");
    store.write_node("/a/b/c", &json!({"Type": "core.Document"})).expect("c");

    store.remove_node("/a/b").expect("remove");
    root.child("a/b").assert(predicate::path::missing());
    root.child("a").assert(predicate::path::is_dir());
    store.remove_node("/a/b").expect("removing twice is fine");
}

#[test]
fn renamed_node_moves_with_new_path() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let store = store(&root);
    store
        .write_node("/a/b", &json!({"Type": "core.Document", "Title": "Hello"}))
        .expect("write");

    store.rename_node("/a/b", "/a/d").expect("rename");

    assert!(store.get_node("/a/b").expect("old").is_none());
    let moved = store.get_node("/a/d").expect("new").expect("present");
    assert_eq!(moved, json!({"Path": "/a/d", "Type": "core.Document", "Title": "Hello"}));
}

#[test]
fn rename_creates_target_parent() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let store = store(&root);
    store.write_node("/a", &json!({"Type": "core.Document"})).expect("write");
    store.rename_node("/a", "/x/y/z").expect("rename");
    assert!(store.get_node("/x/y/z").expect("read").is_some());
}

#[test]
fn rename_of_missing_source_fails() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let err = store(&root).rename_node("/missing", "/target").unwrap_err();
    assert!(matches!(err, StoreError::Io { .. }), "got: {err}");
}
