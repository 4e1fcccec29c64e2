//! In-memory config repository for programmatically defined objects.
//!
//! [`MemoryRepository`] holds config trees keyed by a synthetic path and
//! stamps each insert with a strictly increasing update time, so the
//! reader's change detection works exactly as it does for files. Used
//! for objects created at runtime rather than from config files, and as
//! the natural test double.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use super::{ConfigRepository, ConfigTree};
use crate::error::BoxError;

struct Entry {
    update_time: SystemTime,
    tree: ConfigTree,
}

#[derive(Default)]
pub struct MemoryRepository {
    files: Mutex<HashMap<String, Entry>>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the config tree at `path`.
    ///
    /// The entry's update time is bumped past any time previously handed
    /// out, so a rescan always notices the change even when two inserts
    /// land within clock resolution.
    pub fn insert(&self, path: impl Into<String>, tree: ConfigTree) {
        let mut files = self.files.lock().expect("memory repository poisoned");
        let now = SystemTime::now();
        let floor = files
            .values()
            .map(|e| e.update_time + Duration::from_millis(1))
            .max()
            .unwrap_or(now);
        let update_time = now.max(floor);
        files.insert(path.into(), Entry { update_time, tree });
    }

    /// Remove the entry at `path`; returns whether it existed.
    pub fn remove(&self, path: &str) -> bool {
        let mut files = self.files.lock().expect("memory repository poisoned");
        files.remove(path).is_some()
    }
}

#[async_trait]
impl ConfigRepository for MemoryRepository {
    async fn list_paths(&self) -> Result<Vec<String>, BoxError> {
        let files = self.files.lock().expect("memory repository poisoned");
        let mut paths: Vec<String> = files.keys().cloned().collect();
        paths.sort();
        Ok(paths)
    }

    async fn exists(&self, path: &str) -> Result<bool, BoxError> {
        let files = self.files.lock().expect("memory repository poisoned");
        Ok(files.contains_key(path))
    }

    async fn update_time(&self, path: &str) -> Result<SystemTime, BoxError> {
        let files = self.files.lock().expect("memory repository poisoned");
        files
            .get(path)
            .map(|e| e.update_time)
            .ok_or_else(|| format!("no such config entry: '{path}'").into())
    }

    async fn load(&self, path: &str) -> Result<ConfigTree, BoxError> {
        let files = self.files.lock().expect("memory repository poisoned");
        files
            .get(path)
            .map(|e| e.tree.clone())
            .ok_or_else(|| format!("no such config entry: '{path}'").into())
    }
}
