//! Pluggable sources of object configurations.
//!
//! Defines the [`ConfigRepository`] trait for config backends, the
//! [`RepositorySettings`] that tell the reader which config keys to look
//! at, and [`ObjectConfig`], the per-object slice of a parsed config
//! file. Submodules provide the bundled file-based and in-memory
//! repositories.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::BoxError;

pub mod file;
pub mod memory;

pub use file::FileRepository;
pub use memory::MemoryRepository;

/// A parsed config file. Opaque to curator beyond its top-level keys and
/// the name field inside each object section.
pub type ConfigTree = serde_json::Value;

/// Repositories registered under a name starting with this prefix are
/// internal: name collisions they participate in are not warned about.
pub const INTERNAL_REPOSITORY_PREFIX: &str = "_internal:";

/// Where an object's configuration came from.
#[derive(Debug, Clone)]
pub struct ObjectConfig {
    /// The whole config tree of the file that defines the object.
    pub tree: Arc<ConfigTree>,
    /// Top-level key of the object's section inside [`tree`](Self::tree).
    pub key: String,
    /// Name of the repository the file belongs to.
    pub repository: String,
    /// Path of the file inside that repository.
    pub path: String,
}

impl ObjectConfig {
    /// The object's own config section.
    #[must_use]
    pub fn section(&self) -> Option<&ConfigTree> {
        self.tree.get(&self.key)
    }

    /// Whether two configs describe the same object section, irrespective
    /// of which file or repository they came from.
    #[must_use]
    pub fn same_section(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.tree, &other.tree) && self.key == other.key)
            || self.section() == other.section()
    }
}

/// Immutable snapshot mapping object name to its configuration,
/// published atomically by the config reader. Snapshot identity is
/// `Arc` pointer identity.
pub type ObjectConfigs = HashMap<String, Arc<ObjectConfig>>;

/// Which config keys a repository's files use.
#[derive(Debug, Clone)]
pub struct RepositorySettings {
    /// Top-level keys beginning with this prefix define objects.
    pub key_prefix: String,
    /// Subkey holding the object's name inside each section.
    pub name_key: String,
}

impl RepositorySettings {
    #[must_use]
    pub fn new(key_prefix: impl Into<String>, name_key: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            name_key: name_key.into(),
        }
    }
}

// async_trait is required here because repositories are used as
// Arc<dyn ConfigRepository> and native async fn in traits does not
// support dyn dispatch.
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    /// Enumerate the paths of every config file the repository holds.
    async fn list_paths(&self) -> Result<Vec<String>, BoxError>;

    async fn exists(&self, path: &str) -> Result<bool, BoxError>;

    /// Last modification time of `path`. The reader skips re-parsing
    /// files whose update time has not advanced.
    async fn update_time(&self, path: &str) -> Result<SystemTime, BoxError>;

    async fn load(&self, path: &str) -> Result<ConfigTree, BoxError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(tree: &Arc<ConfigTree>, key: &str) -> ObjectConfig {
        ObjectConfig {
            tree: Arc::clone(tree),
            key: key.to_string(),
            repository: "r".into(),
            path: "p".into(),
        }
    }

    #[test]
    fn same_section_by_pointer() {
        let tree = Arc::new(json!({"object_a": {"name": "a", "v": 1}}));
        assert!(config(&tree, "object_a").same_section(&config(&tree, "object_a")));
    }

    #[test]
    fn same_section_by_value_across_trees() {
        let a = Arc::new(json!({"object_a": {"name": "a", "v": 1}, "comment": "x"}));
        let b = Arc::new(json!({"object_a": {"name": "a", "v": 1}}));
        assert!(config(&a, "object_a").same_section(&config(&b, "object_a")));
    }

    #[test]
    fn different_sections_detected() {
        let a = Arc::new(json!({"object_a": {"name": "a", "v": 1}}));
        let b = Arc::new(json!({"object_a": {"name": "a", "v": 2}}));
        assert!(!config(&a, "object_a").same_section(&config(&b, "object_a")));
    }
}
