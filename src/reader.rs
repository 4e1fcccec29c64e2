//! Reconciles registered repositories into an immutable config snapshot.
//!
//! The [`ConfigReader`] owns the set of named repositories, tracks which
//! files changed since the last scan via repository update times, and
//! merges every parsed object definition into one snapshot mapping
//! object name to [`ObjectConfig`]. When two repositories define the
//! same name, the repository registered first wins and the collision is
//! warned about, unless one of them is internal.

use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::Mutex;

use crate::repository::{
    ConfigRepository, ConfigTree, ObjectConfig, ObjectConfigs, RepositorySettings,
    INTERNAL_REPOSITORY_PREFIX,
};

#[derive(Default)]
struct FileInfo {
    last_update_time: Option<SystemTime>,
    /// Parsed contents of the file: (object name, top-level key).
    objects: Vec<(String, String)>,
    tree: Option<Arc<ConfigTree>>,
    /// Scratch flag: cleared at the start of a rescan, set for every path
    /// that still exists. Entries left unset are garbage collected.
    in_use: bool,
}

struct RepositoryEntry {
    name: String,
    repository: Arc<dyn ConfigRepository>,
    settings: RepositorySettings,
    files: Vec<(String, FileInfo)>,
}

struct ReaderState {
    /// Registration order matters: the first repository defining a name wins.
    repositories: Vec<RepositoryEntry>,
    snapshot: Arc<ObjectConfigs>,
    need_rebuild: bool,
}

#[derive(Clone)]
pub struct ConfigReader {
    inner: Arc<ReaderInner>,
}

struct ReaderInner {
    kind: String,
    state: Mutex<ReaderState>,
}

impl ConfigReader {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ReaderInner {
                kind: kind.into(),
                state: Mutex::new(ReaderState {
                    repositories: Vec::new(),
                    snapshot: Arc::new(ObjectConfigs::new()),
                    need_rebuild: false,
                }),
            }),
        }
    }

    pub async fn add_repository(
        &self,
        name: impl Into<String>,
        repository: Arc<dyn ConfigRepository>,
        settings: RepositorySettings,
    ) {
        let name = name.into();
        let mut state = self.inner.state.lock().await;
        if state.repositories.iter().any(|r| r.name == name) {
            tracing::warn!(repository = %name, "repository is already registered, ignoring");
            return;
        }
        state.repositories.push(RepositoryEntry {
            name,
            repository,
            settings,
            files: Vec::new(),
        });
        state.need_rebuild = true;
    }

    pub async fn remove_repository(&self, name: &str) -> Option<Arc<dyn ConfigRepository>> {
        let mut state = self.inner.state.lock().await;
        let index = state.repositories.iter().position(|r| r.name == name)?;
        let entry = state.repositories.remove(index);
        state.need_rebuild = true;
        Some(entry.repository)
    }

    /// Rescan every repository and return the current snapshot.
    pub async fn read(&self) -> Arc<ObjectConfigs> {
        self.read_impl(None, None).await
    }

    /// Rescan a single repository; the returned snapshot still covers all
    /// repositories.
    pub async fn read_repository(&self, repository: &str) -> Arc<ObjectConfigs> {
        self.read_impl(Some(repository), None).await
    }

    /// Rescan a single path of a single repository; the returned snapshot
    /// still covers all repositories.
    pub async fn read_path(&self, repository: &str, path: &str) -> Arc<ObjectConfigs> {
        self.read_impl(Some(repository), Some(path)).await
    }

    async fn read_impl(
        &self,
        only_repository: Option<&str>,
        only_path: Option<&str>,
    ) -> Arc<ObjectConfigs> {
        let mut state = self.inner.state.lock().await;
        self.rescan(&mut state, only_repository, only_path).await;
        self.rebuild_snapshot(&mut state);
        Arc::clone(&state.snapshot)
    }

    /// Checks update times and re-parses the files that are new or changed.
    async fn rescan(
        &self,
        state: &mut ReaderState,
        only_repository: Option<&str>,
        only_path: Option<&str>,
    ) {
        let kind = &self.inner.kind;
        let mut changed = false;

        for entry in &mut state.repositories {
            if only_repository.is_some_and(|name| name != entry.name) {
                continue;
            }

            let existing_paths = match only_path {
                Some(path) => match entry.repository.exists(path).await {
                    Ok(true) => vec![path.to_string()],
                    Ok(false) => Vec::new(),
                    Err(error) => {
                        tracing::warn!(repository = %entry.name, path, %error, "existence check failed");
                        continue;
                    }
                },
                None => match entry.repository.list_paths().await {
                    Ok(paths) => paths,
                    Err(error) => {
                        tracing::warn!(repository = %entry.name, %error, "failed to enumerate config files");
                        continue;
                    }
                },
            };

            for (_, file) in &mut entry.files {
                file.in_use = false;
            }

            for path in &existing_paths {
                let position = entry.files.iter().position(|(p, _)| p == path);
                match position {
                    Some(index) => {
                        let (_, file) = &mut entry.files[index];
                        if refresh_file(kind, &*entry.repository, &entry.settings, path, file).await
                        {
                            changed = true;
                        }
                    }
                    None => {
                        let mut file = FileInfo::default();
                        if refresh_file(kind, &*entry.repository, &entry.settings, path, &mut file)
                            .await
                        {
                            entry.files.push((path.clone(), file));
                            changed = true;
                        }
                    }
                }
            }

            let before = entry.files.len();
            entry
                .files
                .retain(|(path, file)| file.in_use || only_path.is_some_and(|p| p != path));
            if entry.files.len() != before {
                changed = true;
            }
        }

        if changed {
            state.need_rebuild = true;
        }
    }

    /// Merges every repository's parsed files into a fresh snapshot.
    fn rebuild_snapshot(&self, state: &mut ReaderState) {
        if !state.need_rebuild {
            return;
        }
        state.need_rebuild = false;

        let mut configs = ObjectConfigs::new();
        for entry in &state.repositories {
            for (path, file) in &entry.files {
                let Some(tree) = &file.tree else { continue };
                for (object_name, key) in &file.objects {
                    if let Some(existing) = configs.get(object_name) {
                        let internal = entry.name.starts_with(INTERNAL_REPOSITORY_PREFIX)
                            || existing.repository.starts_with(INTERNAL_REPOSITORY_PREFIX);
                        if !internal {
                            if existing.repository == entry.name && existing.path == *path {
                                tracing::warn!(
                                    kind = %self.inner.kind,
                                    name = %object_name,
                                    %path,
                                    "object is defined twice in the same file"
                                );
                            } else {
                                tracing::warn!(
                                    kind = %self.inner.kind,
                                    name = %object_name,
                                    "object is found both in file '{}' and '{}'",
                                    existing.path,
                                    path
                                );
                            }
                        }
                        continue;
                    }
                    configs.insert(
                        object_name.clone(),
                        Arc::new(ObjectConfig {
                            tree: Arc::clone(tree),
                            key: key.clone(),
                            repository: entry.name.clone(),
                            path: path.clone(),
                        }),
                    );
                }
            }
        }

        state.snapshot = Arc::new(configs);
    }
}

/// Re-reads one file if its update time advanced. Returns true when the
/// file was re-parsed; on failure the previous contents are kept.
async fn refresh_file(
    kind: &str,
    repository: &dyn ConfigRepository,
    settings: &RepositorySettings,
    path: &str,
    file: &mut FileInfo,
) -> bool {
    match try_refresh_file(kind, repository, settings, path, file).await {
        Ok(changed) => changed,
        Err(error) => {
            tracing::warn!(path, %error, "failed to load config file");
            // The file is still present, keep its last good contents.
            file.in_use = true;
            false
        }
    }
}

async fn try_refresh_file(
    kind: &str,
    repository: &dyn ConfigRepository,
    settings: &RepositorySettings,
    path: &str,
    file: &mut FileInfo,
) -> Result<bool, crate::error::BoxError> {
    if path.is_empty() || !repository.exists(path).await? {
        tracing::warn!(path, "config file does not exist");
        return Ok(false);
    }

    let update_time = repository.update_time(path).await?;
    if file
        .last_update_time
        .is_some_and(|last| update_time <= last)
    {
        file.in_use = true;
        return Ok(false);
    }

    let tree = repository.load(path).await?;

    let mut objects = Vec::new();
    if let Some(sections) = tree.as_object() {
        for (key, section) in sections {
            if !key.starts_with(&settings.key_prefix) {
                if !key.starts_with("comment") && !key.starts_with("include_from") {
                    tracing::warn!(
                        path,
                        %key,
                        expected = %settings.key_prefix,
                        "file contains an unknown top-level node"
                    );
                }
                continue;
            }

            let object_name = section
                .get(&settings.name_key)
                .and_then(ConfigTree::as_str)
                .ok_or_else(|| {
                    format!("node '{key}' has no '{}' field", settings.name_key)
                })?;
            if object_name.is_empty() {
                tracing::warn!(path, %key, "node defines a {kind} with an empty name, skipping");
                continue;
            }

            objects.push((object_name.to_string(), key.clone()));
        }
    }

    file.objects = objects;
    file.tree = Some(Arc::new(tree));
    file.last_update_time = Some(update_time);
    file.in_use = true;
    Ok(true)
}
