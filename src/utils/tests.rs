use super::*;
use tempfile::TempDir;

#[test]
fn test_ensure_dir_creates_nested() {
    let tmp = TempDir::new().expect("create temp dir");
    let nested = tmp.path().join("a").join("b");
    let created = ensure_dir(&nested).expect("ensure dir");
    assert!(created.is_dir());
}

#[test]
fn test_atomic_write_creates_file() {
    let tmp = TempDir::new().expect("create temp dir");
    let path = tmp.path().join("state.json");
    atomic_write(&path, "{\"ok\":true}").expect("write");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"ok\":true}");
}

#[test]
fn test_atomic_write_replaces_existing() {
    let tmp = TempDir::new().expect("create temp dir");
    let path = tmp.path().join("state.json");
    atomic_write(&path, "old").expect("write");
    atomic_write(&path, "new").expect("rewrite");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
}
