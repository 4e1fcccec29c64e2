//! Shared fixtures: a controllable factory and the objects it builds.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use curator::{BoxError, ConfigTree, Lifetime, Loadable, ObjectConfig, ObjectFactory, RepositorySettings};

/// Run the test with curator's tracing output visible when RUST_LOG is
/// set.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn settings() -> RepositorySettings {
    RepositorySettings::new("object", "name")
}

/// A config tree defining a single object under the key `object`.
pub fn single_object_tree(name: &str, payload: &str) -> ConfigTree {
    json!({ "object": { "name": name, "payload": payload } })
}

pub struct FixtureObject {
    name: String,
    payload: String,
    lifetime: Lifetime,
    supports_updates: bool,
    modified: Arc<AtomicBool>,
}

#[async_trait]
impl Loadable for FixtureObject {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    fn supports_updates(&self) -> bool {
        self.supports_updates
    }

    async fn is_modified(&self) -> Result<bool, BoxError> {
        Ok(self.modified.load(Ordering::SeqCst))
    }

    fn clone_loaded(&self) -> Arc<dyn Loadable> {
        Arc::new(FixtureObject {
            name: self.name.clone(),
            payload: self.payload.clone(),
            lifetime: self.lifetime,
            supports_updates: self.supports_updates,
            modified: Arc::clone(&self.modified),
        })
    }
}

#[derive(Clone)]
pub struct Creation {
    pub name: String,
    pub payload: String,
    pub had_previous: bool,
}

/// Builds [`FixtureObject`]s from config sections of the form
/// `{ "name": ..., "payload": ..., "lifetime": ..., "fail": ... }`.
#[derive(Default)]
pub struct FixtureFactory {
    delay: Mutex<Duration>,
    fail_names: Mutex<HashSet<String>>,
    creations: Mutex<Vec<Creation>>,
    modified_flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl FixtureFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every subsequent `create` call take this long.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Force failures for `name` independently of its config.
    pub fn set_fail(&self, name: &str, fail: bool) {
        let mut names = self.fail_names.lock().unwrap();
        if fail {
            names.insert(name.to_string());
        } else {
            names.remove(name);
        }
    }

    pub fn creation_count(&self, name: &str) -> usize {
        self.creations
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.name == name)
            .count()
    }

    pub fn last_creation(&self, name: &str) -> Option<Creation> {
        self.creations
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.name == name)
            .cloned()
    }

    /// The `is_modified` flag shared with every object built for `name`.
    pub fn modified_flag(&self, name: &str) -> Arc<AtomicBool> {
        Arc::clone(
            self.modified_flags
                .lock()
                .unwrap()
                .entry(name.to_string())
                .or_default(),
        )
    }
}

#[async_trait]
impl ObjectFactory for FixtureFactory {
    async fn create(
        &self,
        name: &str,
        config: &ObjectConfig,
        previous: Option<Arc<dyn Loadable>>,
    ) -> Result<Arc<dyn Loadable>, BoxError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let section = config.section().ok_or("missing config section")?;
        let payload = section
            .get("payload")
            .and_then(ConfigTree::as_str)
            .unwrap_or_default()
            .to_string();

        self.creations.lock().unwrap().push(Creation {
            name: name.to_string(),
            payload: payload.clone(),
            had_previous: previous.is_some(),
        });

        let config_says_fail = section
            .get("fail")
            .and_then(ConfigTree::as_bool)
            .unwrap_or(false);
        if config_says_fail || self.fail_names.lock().unwrap().contains(name) {
            return Err(format!("refusing to build '{name}'").into());
        }

        if let Some(previous) = previous {
            return Ok(previous.clone_loaded());
        }

        let lifetime = section
            .get("lifetime")
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()?
            .unwrap_or_default();
        let supports_updates = section
            .get("supports_updates")
            .and_then(ConfigTree::as_bool)
            .unwrap_or(true);

        Ok(Arc::new(FixtureObject {
            name: name.to_string(),
            payload,
            lifetime,
            supports_updates,
            modified: self.modified_flag(name),
        }))
    }
}
