//! The object and factory traits consumed by the loading dispatcher.
//!
//! A [`Loadable`] is whatever the surrounding system materializes from a
//! config entry (a dictionary, a model, a UDF); curator only ever calls
//! the handful of methods here. The [`ObjectFactory`] turns a parsed
//! config into a live object and is the single extension point for the
//! actual loading work.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BoxError;
use crate::repository::ObjectConfig;

/// How long a loaded object stays fresh, in seconds.
///
/// The dispatcher schedules the next background refresh at a uniformly
/// random point in `[min_sec, max_sec]` after a successful load. A zero
/// lifetime means the object is never refreshed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifetime {
    #[serde(default)]
    pub min_sec: u64,
    #[serde(default)]
    pub max_sec: u64,
}

impl Lifetime {
    #[must_use]
    pub const fn new(min_sec: u64, max_sec: u64) -> Self {
        Self { min_sec, max_sec }
    }
}

// async_trait is required here because both traits are used as
// Arc<dyn ...> and native async fn in traits does not support dyn dispatch.
#[async_trait]
pub trait Loadable: Send + Sync {
    fn name(&self) -> &str;

    /// Refresh interval bounds. Ignored when [`supports_updates`] is false.
    ///
    /// [`supports_updates`]: Loadable::supports_updates
    fn lifetime(&self) -> Lifetime;

    /// Whether the object can be refreshed at all. Objects that return
    /// false are loaded once and never scheduled again.
    fn supports_updates(&self) -> bool;

    /// Whether the object's backing source changed since it was loaded.
    /// Called by the background sweep without any registry lock held;
    /// may be slow and may fail. A failure is treated as "modified".
    async fn is_modified(&self) -> Result<bool, BoxError>;

    /// Cheap copy of an already loaded object, used when a refresh finds
    /// the configuration unchanged.
    fn clone_loaded(&self) -> Arc<dyn Loadable>;
}

/// Creates live objects from their configurations.
#[async_trait]
pub trait ObjectFactory: Send + Sync {
    /// Build (or rebuild) the object `name` from `config`.
    ///
    /// `previous` is the currently loaded version when the dispatcher
    /// considers it reusable; implementations may return
    /// `previous.clone_loaded()` to denote a cheap refresh. It is `None`
    /// whenever a complete reload is required (first load, changed
    /// configuration, or a forced reload).
    async fn create(
        &self,
        name: &str,
        config: &ObjectConfig,
        previous: Option<Arc<dyn Loadable>>,
    ) -> Result<Arc<dyn Loadable>, BoxError>;
}
