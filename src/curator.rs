//! The public face of the crate: wires the reader, the dispatcher, and
//! the updater together.
//!
//! A [`Curator`] owns a set of named config repositories and a factory.
//! Callers register repositories, then ask for objects by name or by
//! filter; the curator keeps the loaded versions in sync with their
//! configurations. The `kind` string names what the curator manages
//! ("dictionary", "model") and only shows up in log messages.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::dispatcher::{LoadResult, LoadingDispatcher, Status, WAIT};
use crate::error::CuratorError;
use crate::loadable::{Loadable, ObjectFactory};
use crate::reader::ConfigReader;
use crate::repository::{ConfigRepository, RepositorySettings};
use crate::updater::PeriodicUpdater;

pub struct Curator {
    reader: ConfigReader,
    dispatcher: LoadingDispatcher,
    updater: PeriodicUpdater,
}

impl Curator {
    #[must_use]
    pub fn new(kind: impl Into<String>, factory: Arc<dyn ObjectFactory>) -> Self {
        let kind = kind.into();
        let reader = ConfigReader::new(kind.clone());
        let dispatcher = LoadingDispatcher::new(kind, factory);
        let updater = PeriodicUpdater::new(reader.clone(), dispatcher.clone());
        Self {
            reader,
            dispatcher,
            updater,
        }
    }

    /// Register a repository and load its configuration right away.
    pub async fn add_repository(
        &self,
        name: impl Into<String>,
        repository: Arc<dyn ConfigRepository>,
        settings: RepositorySettings,
    ) {
        let name = name.into();
        self.reader
            .add_repository(name.clone(), repository, settings)
            .await;
        self.reload_config_repository(&name).await;
    }

    /// Unregister a repository; returns its handle if it was registered.
    pub async fn remove_repository(&self, name: &str) -> Option<Arc<dyn ConfigRepository>> {
        let repository = self.reader.remove_repository(name).await;
        self.reload_config_repository(name).await;
        repository
    }

    /// Re-read every repository and reconcile the registry.
    pub async fn reload_config(&self) {
        let snapshot = self.reader.read().await;
        self.dispatcher.set_configuration(snapshot).await;
    }

    /// Re-read one repository and reconcile the registry.
    pub async fn reload_config_repository(&self, repository: &str) {
        let snapshot = self.reader.read_repository(repository).await;
        self.dispatcher.set_configuration(snapshot).await;
    }

    /// Re-read one path of one repository and reconcile the registry.
    pub async fn reload_config_path(&self, repository: &str, path: &str) {
        let snapshot = self.reader.read_path(repository, path).await;
        self.dispatcher.set_configuration(snapshot).await;
    }

    /// See [`LoadingDispatcher::enable_always_load_everything`].
    pub async fn enable_always_load_everything(&self, enable: bool) {
        self.dispatcher.enable_always_load_everything(enable).await;
    }

    /// See [`LoadingDispatcher::enable_async_loading`].
    pub fn enable_async_loading(&self, enable: bool) {
        self.dispatcher.enable_async_loading(enable);
    }

    /// Start or stop the background refresh worker.
    pub async fn enable_periodic_updates(&self, enable: bool) {
        self.updater.enable(enable).await;
    }

    pub async fn status(&self, name: &str) -> Status {
        self.dispatcher.get_current_status(name).await
    }

    /// Current load result of `name`, without triggering any loading.
    pub async fn load_result(&self, name: &str) -> LoadResult {
        self.dispatcher.get_current_load_result(name).await
    }

    /// Current load results of every object accepted by `filter`,
    /// without triggering any loading.
    pub async fn load_results_matching<F>(&self, filter: F) -> Vec<LoadResult>
    where
        F: Fn(&str) -> bool,
    {
        self.dispatcher.get_current_load_results(filter).await
    }

    /// The currently loaded version of `name`, if any. Does not trigger
    /// any loading.
    pub async fn get_object(&self, name: &str) -> Option<Arc<dyn Loadable>> {
        self.dispatcher.get_current_load_result(name).await.object
    }

    /// Every currently loaded object; entries without a loaded version
    /// are skipped.
    pub async fn loaded_objects(&self) -> Vec<Arc<dyn Loadable>> {
        self.loaded_objects_matching(|_| true).await
    }

    /// Loaded objects accepted by `filter`; entries without a loaded
    /// version are skipped.
    pub async fn loaded_objects_matching<F>(&self, filter: F) -> Vec<Arc<dyn Loadable>>
    where
        F: Fn(&str) -> bool,
    {
        self.dispatcher
            .get_current_load_results(filter)
            .await
            .into_iter()
            .filter_map(|result| result.object)
            .collect()
    }

    pub async fn loaded_object_count(&self) -> usize {
        self.dispatcher.get_number_of_loaded_objects().await
    }

    pub async fn has_loaded_objects(&self) -> bool {
        self.dispatcher.has_loaded_objects().await
    }

    pub async fn tried_to_load_names(&self) -> Vec<String> {
        self.dispatcher.get_all_tried_to_load_names().await
    }

    /// Ensure `name` reaches a ready state, waiting up to `timeout`
    /// (or forever with [`WAIT`]).
    pub async fn try_load(&self, name: &str, timeout: Duration) -> LoadResult {
        self.dispatcher.try_load(name, timeout).await
    }

    pub async fn try_load_matching<F>(&self, filter: F, timeout: Duration) -> Vec<LoadResult>
    where
        F: Fn(&str) -> bool,
    {
        self.dispatcher.try_load_matching(filter, timeout).await
    }

    /// Force a complete reload of `name`, cancelling any load in flight.
    pub async fn try_load_or_reload(&self, name: &str, timeout: Duration) -> LoadResult {
        self.dispatcher.try_load_or_reload(name, timeout).await
    }

    pub async fn try_load_or_reload_matching<F>(
        &self,
        filter: F,
        timeout: Duration,
    ) -> Vec<LoadResult>
    where
        F: Fn(&str) -> bool,
    {
        self.dispatcher
            .try_load_or_reload_matching(filter, timeout)
            .await
    }

    /// Load `name` and return the object, waiting as long as it takes.
    /// A stored failure from an earlier refresh does not fail the call as
    /// long as some version is available.
    pub async fn load(&self, name: &str) -> Result<Arc<dyn Loadable>, CuratorError> {
        let result = self.try_load(name, WAIT).await;
        check_loaded(&result, false)?;
        object_of(result)
    }

    /// Load every object accepted by `filter`, waiting as long as it takes.
    pub async fn load_matching<F>(&self, filter: F) -> Result<Vec<Arc<dyn Loadable>>, CuratorError>
    where
        F: Fn(&str) -> bool,
    {
        let results = self.try_load_matching(filter, WAIT).await;
        check_all_loaded(&results, false)?;
        Ok(results
            .into_iter()
            .filter_map(|result| result.object)
            .collect())
    }

    /// Refresh the configuration, force a complete reload of `name`, and
    /// return the fresh object. Fails if the reload failed.
    pub async fn load_or_reload(&self, name: &str) -> Result<Arc<dyn Loadable>, CuratorError> {
        self.reload_config().await;
        let result = self.try_load_or_reload(name, WAIT).await;
        check_loaded(&result, true)?;
        object_of(result)
    }

    /// Refresh the configuration and force a complete reload of every
    /// object accepted by `filter`.
    pub async fn load_or_reload_matching<F>(
        &self,
        filter: F,
    ) -> Result<Vec<LoadResult>, CuratorError>
    where
        F: Fn(&str) -> bool,
    {
        self.reload_config().await;
        let results = self.try_load_or_reload_matching(filter, WAIT).await;
        check_all_loaded(&results, true)?;
        Ok(results)
    }

    /// Force a complete reload of everything that was ever tried to load.
    pub async fn reload_all_tried(&self) -> Result<Vec<LoadResult>, CuratorError> {
        let names: HashSet<String> = self.tried_to_load_names().await.into_iter().collect();
        self.load_or_reload_matching(move |name| names.contains(name))
            .await
    }

    /// Stop the background worker and every in-flight load. Call before
    /// dropping the curator when orderly teardown matters.
    pub async fn shutdown(&self) {
        self.updater.enable(false).await;
        self.dispatcher.shutdown().await;
    }
}

/// Validate that `result` carries a usable object.
///
/// With `check_no_errors`, a version loaded earlier does not excuse a
/// failed refresh: the stored error is surfaced.
pub fn check_loaded(result: &LoadResult, check_no_errors: bool) -> Result<(), CuratorError> {
    if result.object.is_some() && (!check_no_errors || result.error.is_none()) {
        return Ok(());
    }
    if result.status == Status::Loading {
        return Err(CuratorError::StillLoading {
            name: result.name.clone(),
        });
    }
    if let Some(error) = &result.error {
        return Err(CuratorError::LoadFailed {
            name: result.name.clone(),
            source: Arc::clone(error),
        });
    }
    if result.status == Status::NotExist {
        return Err(CuratorError::NotFound {
            name: result.name.clone(),
        });
    }
    Err(CuratorError::NeverLoaded {
        name: result.name.clone(),
    })
}

/// Batch [`check_loaded`]: the first failure is returned, the rest are
/// logged.
pub fn check_all_loaded(results: &[LoadResult], check_no_errors: bool) -> Result<(), CuratorError> {
    let mut first_error = None;
    for result in results {
        if let Err(error) = check_loaded(result, check_no_errors) {
            if first_error.is_none() {
                first_error = Some(error);
            } else {
                tracing::warn!(name = %result.name, %error, "object is not usable");
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

fn object_of(result: LoadResult) -> Result<Arc<dyn Loadable>, CuratorError> {
    let name = result.name;
    result.object.ok_or(CuratorError::NeverLoaded { name })
}
