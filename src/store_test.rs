use super::*;

#[test]
fn session_key_embeds_server_url() {
    assert_eq!(session_key("ws://localhost:8000"), "Servervillews://localhost:8000SessionId");
}

#[test]
fn memory_store_treats_empty_as_absent() {
    let store = MemoryStore::with("k", "");
    assert_eq!(store.load("k"), None);
    store.save("k", "abc");
    assert_eq!(store.load("k").as_deref(), Some("abc"));
    store.remove("k");
    assert_eq!(store.load("k"), None);
}

#[test]
fn file_store_persists_across_instances() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.json");

    FileStore::new(&path).save("a", "one");
    FileStore::new(&path).save("b", "two");

    let store = FileStore::new(&path);
    assert_eq!(store.load("a").as_deref(), Some("one"));
    assert_eq!(store.load("b").as_deref(), Some("two"));

    store.remove("a");
    assert_eq!(FileStore::new(&path).load("a"), None);
    assert_eq!(FileStore::new(&path).load("b").as_deref(), Some("two"));
}

#[test]
fn file_store_missing_file_is_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStore::new(dir.path().join("absent.json"));
    assert_eq!(store.load("a"), None);
}

#[test]
fn file_store_recovers_from_corrupt_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.json");
    std::fs::write(&path, "not json").expect("write");

    let store = FileStore::new(&path);
    assert_eq!(store.load("a"), None);
    store.save("a", "one");
    assert_eq!(store.load("a").as_deref(), Some("one"));
}
