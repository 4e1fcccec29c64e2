//! Rescan and snapshot-merge behavior of the config reader.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use serde_json::json;

use common::{settings, single_object_tree};
use curator::{
    BoxError, ConfigReader, ConfigRepository, ConfigTree, FileRepository, MemoryRepository,
    INTERNAL_REPOSITORY_PREFIX,
};

/// Counts how often files are actually re-parsed.
struct CountingRepository {
    inner: MemoryRepository,
    loads: AtomicUsize,
}

impl CountingRepository {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryRepository::new(),
            loads: AtomicUsize::new(0),
        })
    }

    fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigRepository for CountingRepository {
    async fn list_paths(&self) -> Result<Vec<String>, BoxError> {
        self.inner.list_paths().await
    }

    async fn exists(&self, path: &str) -> Result<bool, BoxError> {
        self.inner.exists(path).await
    }

    async fn update_time(&self, path: &str) -> Result<SystemTime, BoxError> {
        self.inner.update_time(path).await
    }

    async fn load(&self, path: &str) -> Result<ConfigTree, BoxError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(path).await
    }
}

#[tokio::test]
async fn snapshot_pointer_is_stable_while_nothing_changes() {
    let reader = ConfigReader::new("fixture");
    let repository = Arc::new(MemoryRepository::new());
    repository.insert("a.json", single_object_tree("a", "1"));
    reader.add_repository("r1", repository.clone(), settings()).await;

    let first = reader.read().await;
    let second = reader.read().await;
    assert!(Arc::ptr_eq(&first, &second));

    repository.insert("a.json", single_object_tree("a", "2"));
    let third = reader.read().await;
    assert!(!Arc::ptr_eq(&first, &third));
}

#[tokio::test]
async fn unchanged_files_are_not_reparsed() {
    let reader = ConfigReader::new("fixture");
    let repository = CountingRepository::new();
    repository.inner.insert("a.json", single_object_tree("a", "1"));
    repository.inner.insert("b.json", single_object_tree("b", "2"));
    reader.add_repository("r1", repository.clone(), settings()).await;

    reader.read().await;
    assert_eq!(repository.load_count(), 2);

    reader.read().await;
    assert_eq!(repository.load_count(), 2);

    repository.inner.insert("a.json", single_object_tree("a", "3"));
    reader.read().await;
    assert_eq!(repository.load_count(), 3);
}

#[tokio::test]
async fn deleted_file_is_garbage_collected() {
    let reader = ConfigReader::new("fixture");
    let repository = Arc::new(MemoryRepository::new());
    repository.insert("a.json", single_object_tree("a", "1"));
    repository.insert("b.json", single_object_tree("b", "2"));
    reader.add_repository("r1", repository.clone(), settings()).await;

    let snapshot = reader.read().await;
    assert!(snapshot.contains_key("a") && snapshot.contains_key("b"));

    repository.remove("a.json");
    let snapshot = reader.read().await;
    assert!(!snapshot.contains_key("a"));
    assert!(snapshot.contains_key("b"));
}

#[tokio::test]
async fn read_path_only_rescans_that_path() {
    let reader = ConfigReader::new("fixture");
    let repository = CountingRepository::new();
    repository.inner.insert("a.json", single_object_tree("a", "1"));
    repository.inner.insert("b.json", single_object_tree("b", "1"));
    reader.add_repository("r1", repository.clone(), settings()).await;
    reader.read().await;

    repository.inner.insert("a.json", single_object_tree("a", "2"));
    repository.inner.insert("b.json", single_object_tree("b", "2"));

    let snapshot = reader.read_path("r1", "a.json").await;
    assert_eq!(repository.load_count(), 3);

    // The other file keeps its old contents in the snapshot.
    let a = snapshot.get("a").unwrap();
    let b = snapshot.get("b").unwrap();
    assert_eq!(a.section().unwrap()["payload"], "2");
    assert_eq!(b.section().unwrap()["payload"], "1");
}

#[tokio::test]
async fn first_registered_repository_wins_collisions() {
    let reader = ConfigReader::new("fixture");
    let first = Arc::new(MemoryRepository::new());
    first.insert("a.json", single_object_tree("shared", "first"));
    let second = Arc::new(MemoryRepository::new());
    second.insert("b.json", single_object_tree("shared", "second"));

    reader.add_repository("r1", first, settings()).await;
    reader.add_repository("r2", second, settings()).await;

    let snapshot = reader.read().await;
    let config = snapshot.get("shared").unwrap();
    assert_eq!(config.repository, "r1");
    assert_eq!(config.path, "a.json");
    assert_eq!(config.section().unwrap()["payload"], "first");
}

#[tokio::test]
async fn internal_repository_collisions_stay_first_wins() {
    let reader = ConfigReader::new("fixture");
    let internal = Arc::new(MemoryRepository::new());
    internal.insert("sys.json", single_object_tree("shared", "internal"));
    let user = Arc::new(MemoryRepository::new());
    user.insert("user.json", single_object_tree("shared", "user"));

    let internal_name = format!("{INTERNAL_REPOSITORY_PREFIX}system");
    reader.add_repository(internal_name.clone(), internal, settings()).await;
    reader.add_repository("r2", user, settings()).await;

    let snapshot = reader.read().await;
    assert_eq!(snapshot.get("shared").unwrap().repository, internal_name);
}

#[tokio::test]
async fn empty_object_name_is_skipped() {
    let reader = ConfigReader::new("fixture");
    let repository = Arc::new(MemoryRepository::new());
    repository.insert(
        "a.json",
        json!({
            "object_good": { "name": "good" },
            "object_anonymous": { "name": "" },
        }),
    );
    reader.add_repository("r1", repository, settings()).await;

    let snapshot = reader.read().await;
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.contains_key("good"));
}

#[tokio::test]
async fn unknown_top_level_keys_are_ignored() {
    let reader = ConfigReader::new("fixture");
    let repository = Arc::new(MemoryRepository::new());
    repository.insert(
        "a.json",
        json!({
            "comment": "maintained by ops",
            "include_from": "base.json",
            "junk": { "name": "nope" },
            "object_a": { "name": "a" },
        }),
    );
    reader.add_repository("r1", repository, settings()).await;

    let snapshot = reader.read().await;
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.contains_key("a"));
}

#[tokio::test]
async fn broken_file_keeps_its_previous_contents() {
    let reader = ConfigReader::new("fixture");
    let repository = Arc::new(MemoryRepository::new());
    repository.insert("a.json", single_object_tree("a", "good"));
    reader.add_repository("r1", repository.clone(), settings()).await;
    reader.read().await;

    // The object section has no name field, so the whole file is rejected.
    repository.insert("a.json", json!({ "object": { "payload": "broken" } }));
    let snapshot = reader.read().await;

    let config = snapshot.get("a").unwrap();
    assert_eq!(config.section().unwrap()["payload"], "good");
}

#[tokio::test]
async fn removed_repository_drops_its_objects() {
    let reader = ConfigReader::new("fixture");
    let repository = Arc::new(MemoryRepository::new());
    repository.insert("a.json", single_object_tree("a", "1"));
    reader.add_repository("r1", repository, settings()).await;
    assert!(reader.read().await.contains_key("a"));

    assert!(reader.remove_repository("r1").await.is_some());
    assert!(reader.remove_repository("r1").await.is_none());
    assert!(reader.read().await.is_empty());
}

#[tokio::test]
async fn file_repository_serves_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("d.json");
    std::fs::write(&path, r#"{ "object": { "name": "d", "payload": "v1" } }"#).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let reader = ConfigReader::new("fixture");
    let repository = Arc::new(FileRepository::new(dir.path()));
    reader.add_repository("files", repository, settings()).await;

    let snapshot = reader.read().await;
    assert_eq!(snapshot.len(), 1);
    let config = snapshot.get("d").unwrap();
    assert_eq!(config.path, path.to_string_lossy());
    assert_eq!(config.section().unwrap()["payload"], "v1");
}
