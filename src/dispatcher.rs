//! The loading dispatcher: one cooperative state machine per object.
//!
//! Accepts config snapshots from the reader, keeps a per-object record of
//! the last loaded version, the last failure, and the next scheduled
//! refresh, and guarantees at most one in-flight load per name. Loads run
//! either on the calling task or on a spawned worker; superseded loads
//! are cancelled cooperatively by bumping the per-load id, so a stale
//! worker discovers the mismatch when it tries to commit and drops its
//! result.
//!
//! Waiters block on a [`Notify`] used as a condition variable: the
//! `Notified` future is enabled while the state lock is still held, so a
//! wakeup between releasing the lock and awaiting cannot be lost.

use std::collections::HashMap;
use std::fmt;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::backoff::UpdateBackoff;
use crate::error::SharedError;
use crate::loadable::{Loadable, ObjectFactory};
use crate::repository::{ObjectConfig, ObjectConfigs};

/// Sentinel timeout meaning "block until the load finishes".
pub const WAIT: Duration = Duration::MAX;

/// Externally visible state of a named object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The object is known but loading was never attempted.
    NotLoaded,
    /// A version of the object is available.
    Loaded,
    /// Loading was attempted and failed; no version is available.
    Failed,
    /// The first load is in progress.
    Loading,
    /// A version is available and a refresh is in progress.
    LoadedAndReloading,
    /// No version is available and a retry is in progress.
    FailedAndReloading,
    /// The name is absent from the current configuration.
    NotExist,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::NotLoaded,
        Status::Loaded,
        Status::Failed,
        Status::Loading,
        Status::LoadedAndReloading,
        Status::FailedAndReloading,
        Status::NotExist,
    ];
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::NotLoaded => "NOT_LOADED",
            Status::Loaded => "LOADED",
            Status::Failed => "FAILED",
            Status::Loading => "LOADING",
            Status::LoadedAndReloading => "LOADED_AND_RELOADING",
            Status::FailedAndReloading => "FAILED_AND_RELOADING",
            Status::NotExist => "NOT_EXIST",
        };
        f.write_str(s)
    }
}

/// Everything a caller learns about one object from a load or status query.
#[derive(Clone)]
pub struct LoadResult {
    pub name: String,
    pub status: Status,
    pub object: Option<Arc<dyn Loadable>>,
    pub error: Option<SharedError>,
    pub loading_start_time: Option<Instant>,
    pub loading_duration: Duration,
    /// Path of the config file the object was defined in.
    pub origin: String,
    pub repository_name: String,
}

impl LoadResult {
    fn not_exists(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: Status::NotExist,
            object: None,
            error: None,
            loading_start_time: None,
            loading_duration: Duration::ZERO,
            origin: String::new(),
            repository_name: String::new(),
        }
    }
}

impl fmt::Debug for LoadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadResult")
            .field("name", &self.name)
            .field("status", &self.status)
            .field("has_object", &self.object.is_some())
            .field("error", &self.error)
            .field("origin", &self.origin)
            .field("repository_name", &self.repository_name)
            .finish_non_exhaustive()
    }
}

struct Info {
    name: String,
    config: Arc<ObjectConfig>,
    object: Option<Arc<dyn Loadable>>,
    error: Option<SharedError>,
    loading_start_time: Option<Instant>,
    loading_end_time: Option<Instant>,
    /// Nonzero while a load is in flight; the id of that load.
    loading_id: u64,
    /// Consecutive failures since the last successful load.
    error_count: u64,
    /// When the background sweep should next consider the object.
    /// `None` means never.
    next_update_time: Option<Instant>,
    forced_to_reload: bool,
    config_changed: bool,
}

impl Info {
    fn new(name: String, config: Arc<ObjectConfig>) -> Self {
        Self {
            name,
            config,
            object: None,
            error: None,
            loading_start_time: None,
            loading_end_time: None,
            loading_id: 0,
            error_count: 0,
            next_update_time: None,
            forced_to_reload: false,
            config_changed: false,
        }
    }

    fn loaded(&self) -> bool {
        self.object.is_some()
    }

    fn failed(&self) -> bool {
        self.object.is_none() && self.error.is_some()
    }

    fn is_loading(&self) -> bool {
        self.loading_id != 0
    }

    fn tried_to_load(&self) -> bool {
        self.loaded() || self.failed() || self.is_loading()
    }

    fn ready(&self) -> bool {
        (self.loaded() || self.failed()) && !self.forced_to_reload
    }

    fn failed_to_reload(&self) -> bool {
        self.loaded() && self.error.is_some()
    }

    fn status(&self) -> Status {
        if self.object.is_some() {
            if self.is_loading() {
                Status::LoadedAndReloading
            } else {
                Status::Loaded
            }
        } else if self.error.is_some() {
            if self.is_loading() {
                Status::FailedAndReloading
            } else {
                Status::Failed
            }
        } else if self.is_loading() {
            Status::Loading
        } else {
            Status::NotLoaded
        }
    }

    fn loading_duration(&self) -> Duration {
        let Some(start) = self.loading_start_time else {
            return Duration::ZERO;
        };
        if self.is_loading() {
            start.elapsed()
        } else {
            self.loading_end_time
                .map_or(Duration::ZERO, |end| end.saturating_duration_since(start))
        }
    }

    fn load_result(&self) -> LoadResult {
        LoadResult {
            name: self.name.clone(),
            status: self.status(),
            object: self.object.clone(),
            error: self.error.clone(),
            loading_start_time: self.loading_start_time,
            loading_duration: self.loading_duration(),
            origin: self.config.path.clone(),
            repository_name: self.config.repository.clone(),
        }
    }

    /// Cooperative cancellation: the in-flight worker keeps running but
    /// finds the id mismatch at commit time and drops its result.
    fn cancel_loading(&mut self) {
        if !self.is_loading() {
            return;
        }
        self.loading_id = 0;
        self.loading_end_time = Some(Instant::now());
    }

    fn past_update_time(&self, now: Instant) -> bool {
        self.next_update_time.is_some_and(|t| now >= t)
    }
}

/// What a worker captures under the lock before calling the factory.
struct LoadPlan {
    config: Arc<ObjectConfig>,
    /// Current version, kept for bookkeeping even when it cannot be
    /// handed to the factory.
    previous: Option<Arc<dyn Loadable>>,
    /// The previous version is unusable: first load, changed config, or
    /// forced reload.
    fresh_start: bool,
    error_count: u64,
}

struct DispatcherState {
    configs: Option<Arc<ObjectConfigs>>,
    infos: HashMap<String, Info>,
    always_load_everything: bool,
    /// Join handles of in-flight workers, keyed by loading id. Workers
    /// remove their own entry when they finish.
    loading_tasks: HashMap<u64, JoinHandle<()>>,
    /// Always > 0; 0 in an `Info` means "not loading".
    next_loading_id: u64,
    rng: StdRng,
}

struct DispatcherInner {
    factory: Arc<dyn ObjectFactory>,
    kind: String,
    backoff: UpdateBackoff,
    async_loading: AtomicBool,
    state: Mutex<DispatcherState>,
    event: Notify,
}

/// Manages loading and reloading of the objects known from the current
/// config snapshot. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct LoadingDispatcher {
    inner: Arc<DispatcherInner>,
}

impl LoadingDispatcher {
    #[must_use]
    pub fn new(kind: impl Into<String>, factory: Arc<dyn ObjectFactory>) -> Self {
        Self::with_options(kind, factory, UpdateBackoff::default(), None)
    }

    /// Like [`new`](Self::new), with an explicit retry policy and an
    /// optional PRNG seed for deterministic refresh scheduling in tests.
    #[must_use]
    pub fn with_options(
        kind: impl Into<String>,
        factory: Arc<dyn ObjectFactory>,
        backoff: UpdateBackoff,
        seed: Option<u64>,
    ) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            inner: Arc::new(DispatcherInner {
                factory,
                kind: kind.into(),
                backoff,
                async_loading: AtomicBool::new(false),
                state: Mutex::new(DispatcherState {
                    configs: None,
                    infos: HashMap::new(),
                    always_load_everything: false,
                    loading_tasks: HashMap::new(),
                    next_loading_id: 1,
                    rng,
                }),
                event: Notify::new(),
            }),
        }
    }

    /// Reconcile the per-object records against a new snapshot.
    ///
    /// Objects whose config section changed are reloaded (if they were
    /// ever tried); new names are inserted; vanished names are dropped,
    /// waking any waiter stuck on them.
    pub async fn set_configuration(&self, new_configs: Arc<ObjectConfigs>) {
        let mut state = self.inner.state.lock().await;
        if state
            .configs
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &new_configs))
        {
            return;
        }
        state.configs = Some(Arc::clone(&new_configs));

        let mut removed_names = Vec::new();
        let mut names_to_load = Vec::new();

        for (name, info) in &mut state.infos {
            match new_configs.get(name) {
                None => removed_names.push(name.clone()),
                Some(new_config) => {
                    let config_is_same = info.config.same_section(new_config);
                    info.config = Arc::clone(new_config);
                    if !config_is_same {
                        info.config_changed = true;
                        if info.tried_to_load() {
                            // In use or was in use, reload with the new config.
                            info.cancel_loading();
                            names_to_load.push(name.clone());
                        }
                    }
                }
            }
        }

        for (name, config) in new_configs.iter() {
            if !state.infos.contains_key(name) {
                state
                    .infos
                    .insert(name.clone(), Info::new(name.clone(), Arc::clone(config)));
                if state.always_load_everything {
                    names_to_load.push(name.clone());
                }
            }
        }

        for name in removed_names {
            state.infos.remove(&name);
        }

        for name in names_to_load {
            DispatcherInner::start_loading(&self.inner, &mut state, &name).await;
        }

        drop(state);
        // Waiters must recheck: their target may have vanished or become
        // loadable under the new configuration.
        self.inner.event.notify_waiters();
    }

    /// When enabled, every known object starts loading as soon as it
    /// becomes known, without waiting for somebody to ask for it.
    pub async fn enable_always_load_everything(&self, enable: bool) {
        let mut state = self.inner.state.lock().await;
        if state.always_load_everything == enable {
            return;
        }
        state.always_load_everything = enable;

        if enable {
            let names: Vec<String> = state
                .infos
                .values()
                .filter(|info| !info.tried_to_load())
                .map(|info| info.name.clone())
                .collect();
            for name in names {
                DispatcherInner::start_loading(&self.inner, &mut state, &name).await;
            }
        }
    }

    /// When enabled, loads run on spawned workers and callers wait;
    /// otherwise the load runs inline on the calling task, with the
    /// dispatcher lock held for its whole duration.
    ///
    /// A factory that calls back into the loader for dependent objects
    /// requires async loading; the inline path would deadlock.
    pub fn enable_async_loading(&self, enable: bool) {
        self.inner.async_loading.store(enable, Ordering::Relaxed);
    }

    pub async fn get_current_status(&self, name: &str) -> Status {
        let state = self.inner.state.lock().await;
        state
            .infos
            .get(name)
            .map_or(Status::NotExist, Info::status)
    }

    /// Current load result without triggering any loading.
    pub async fn get_current_load_result(&self, name: &str) -> LoadResult {
        let state = self.inner.state.lock().await;
        state
            .infos
            .get(name)
            .map_or_else(|| LoadResult::not_exists(name), Info::load_result)
    }

    /// Current load results of every object accepted by `filter`, without
    /// triggering any loading.
    pub async fn get_current_load_results<F>(&self, filter: F) -> Vec<LoadResult>
    where
        F: Fn(&str) -> bool,
    {
        let state = self.inner.state.lock().await;
        collect_load_results(&state, &filter)
    }

    pub async fn get_number_of_loaded_objects(&self) -> usize {
        let state = self.inner.state.lock().await;
        state.infos.values().filter(|info| info.loaded()).count()
    }

    pub async fn has_loaded_objects(&self) -> bool {
        let state = self.inner.state.lock().await;
        state.infos.values().any(Info::loaded)
    }

    pub async fn get_all_tried_to_load_names(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        let mut names: Vec<String> = state
            .infos
            .values()
            .filter(|info| info.tried_to_load())
            .map(|info| info.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Ensure `name` reaches a ready state, waiting up to `timeout`
    /// (or forever with [`WAIT`]). On timeout the current, possibly
    /// not-ready state is returned.
    pub async fn try_load(&self, name: &str, timeout: Duration) -> LoadResult {
        self.load_one(name, timeout)
            .await
            .unwrap_or_else(|| LoadResult::not_exists(name))
    }

    /// [`try_load`](Self::try_load) over every name accepted by `filter`.
    pub async fn try_load_matching<F>(&self, filter: F, timeout: Duration) -> Vec<LoadResult>
    where
        F: Fn(&str) -> bool,
    {
        self.load_matching(&filter, timeout).await
    }

    /// Like [`try_load`](Self::try_load), but cancels any in-flight load
    /// first and forces a complete reload even when a version is already
    /// available.
    pub async fn try_load_or_reload(&self, name: &str, timeout: Duration) -> LoadResult {
        {
            let mut state = self.inner.state.lock().await;
            let Some(info) = state.infos.get_mut(name) else {
                return LoadResult::not_exists(name);
            };
            info.cancel_loading();
            info.forced_to_reload = true;
        }
        self.load_one(name, timeout)
            .await
            .unwrap_or_else(|| LoadResult::not_exists(name))
    }

    /// [`try_load_or_reload`](Self::try_load_or_reload) over every name
    /// accepted by `filter`.
    pub async fn try_load_or_reload_matching<F>(
        &self,
        filter: F,
        timeout: Duration,
    ) -> Vec<LoadResult>
    where
        F: Fn(&str) -> bool,
    {
        {
            let mut state = self.inner.state.lock().await;
            for info in state.infos.values_mut() {
                if filter(&info.name) {
                    info.cancel_loading();
                    info.forced_to_reload = true;
                }
            }
        }
        self.load_matching(&filter, timeout).await
    }

    /// Start refreshing every loaded object past its scheduled update
    /// time, and retry every failed one whose backoff elapsed.
    ///
    /// Runs in three passes so that `is_modified`, which is user code,
    /// is never called with the dispatcher lock held; object identity is
    /// re-checked across the gap.
    pub async fn reload_outdated(&self) {
        // Pass 1: collect the loaded objects that are due for a check.
        let candidates: Vec<(Arc<dyn Loadable>, bool)> = {
            let state = self.inner.state.lock().await;
            let now = Instant::now();
            state
                .infos
                .values()
                .filter(|info| info.past_update_time(now) && !info.is_loading() && info.loaded())
                .filter_map(|info| {
                    info.object
                        .clone()
                        .map(|object| (object, info.failed_to_reload()))
                })
                .collect()
        };

        // Pass 2: ask each object whether it changed, lock released.
        let mut should_update = Vec::with_capacity(candidates.len());
        for (object, mut update) in candidates {
            if !update {
                update = match object.is_modified().await {
                    Ok(modified) => modified,
                    Err(error) => {
                        tracing::warn!(
                            kind = %self.inner.kind,
                            name = %object.name(),
                            %error,
                            "could not check whether the object was modified, reloading it"
                        );
                        true
                    }
                };
            }
            should_update.push((object, update));
        }

        // Pass 3: start the reloads. Objects loaded while the lock was
        // released are not in the map and are skipped.
        let mut state = self.inner.state.lock().await;
        let now = Instant::now();
        let mut names_to_load = Vec::new();
        let mut names_to_reschedule = Vec::new();

        for info in state.infos.values() {
            if !info.past_update_time(now) || info.is_loading() {
                continue;
            }
            if let Some(object) = &info.object {
                let Some((_, update)) = should_update
                    .iter()
                    .find(|(candidate, _)| Arc::ptr_eq(candidate, object))
                else {
                    continue;
                };
                if *update {
                    names_to_load.push(info.name.clone());
                } else {
                    names_to_reschedule.push(info.name.clone());
                }
            } else if info.failed() {
                names_to_load.push(info.name.clone());
            }
        }

        for name in names_to_reschedule {
            let Some((object, error_count)) = state
                .infos
                .get(&name)
                .map(|info| (info.object.clone(), info.error_count))
            else {
                continue;
            };
            let next = self
                .inner
                .next_update_time(&mut state.rng, object.as_ref(), error_count);
            if let Some(info) = state.infos.get_mut(&name) {
                info.next_update_time = next;
            }
        }

        for name in names_to_load {
            DispatcherInner::start_loading(&self.inner, &mut state, &name).await;
        }
    }

    /// Stop every in-flight load and wait for the workers to finish.
    ///
    /// The info map is cleared first, so workers that are mid-factory
    /// find no match when they try to commit and drop their results.
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock().await;
            state.infos.clear();
        }
        self.inner.event.notify_waiters();

        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut state = self.inner.state.lock().await;
                if state.loading_tasks.is_empty() {
                    break;
                }
                state
                    .loading_tasks
                    .drain()
                    .map(|(_, handle)| handle)
                    .collect()
            };
            self.inner.event.notify_waiters();
            for handle in handles {
                let _ = handle.await;
            }
        }
    }

    async fn load_one(&self, name: &str, timeout: Duration) -> Option<LoadResult> {
        let deadline = deadline_for(timeout);
        loop {
            let mut notified = pin!(self.inner.event.notified());
            {
                let mut state = self.inner.state.lock().await;

                let needs_start = match state.infos.get(name) {
                    None => return None,
                    Some(info) if info.ready() => return Some(info.load_result()),
                    Some(info) => !info.is_loading(),
                };
                if needs_start {
                    DispatcherInner::start_loading(&self.inner, &mut state, name).await;
                }

                match state.infos.get(name) {
                    None => return None,
                    Some(info) if info.ready() => return Some(info.load_result()),
                    Some(info) => {
                        if deadline_expired(deadline) {
                            return Some(info.load_result());
                        }
                    }
                }

                notified.as_mut().enable();
            }

            if !wait_until(deadline, notified).await {
                let state = self.inner.state.lock().await;
                return state.infos.get(name).map(Info::load_result);
            }
        }
    }

    async fn load_matching<F>(&self, filter: &F, timeout: Duration) -> Vec<LoadResult>
    where
        F: Fn(&str) -> bool,
    {
        let deadline = deadline_for(timeout);
        loop {
            let mut notified = pin!(self.inner.event.notified());
            {
                let mut state = self.inner.state.lock().await;

                let names_to_start: Vec<String> = state
                    .infos
                    .values()
                    .filter(|info| filter(&info.name) && !info.ready() && !info.is_loading())
                    .map(|info| info.name.clone())
                    .collect();
                for name in names_to_start {
                    DispatcherInner::start_loading(&self.inner, &mut state, &name).await;
                }

                let all_ready = state
                    .infos
                    .values()
                    .all(|info| !filter(&info.name) || info.ready());
                if all_ready || deadline_expired(deadline) {
                    return collect_load_results(&state, filter);
                }

                notified.as_mut().enable();
            }

            if !wait_until(deadline, notified).await {
                let state = self.inner.state.lock().await;
                return collect_load_results(&state, filter);
            }
        }
    }
}

impl DispatcherInner {
    /// Begin loading `name` unless a load is already in flight. Either
    /// spawns a worker or, with async loading disabled, performs the load
    /// right here with the state lock held.
    async fn start_loading(this: &Arc<Self>, state: &mut DispatcherState, name: &str) {
        let loading_id = state.next_loading_id;
        {
            let Some(info) = state.infos.get_mut(name) else {
                return;
            };
            if info.is_loading() {
                return;
            }
            info.loading_id = loading_id;
            info.loading_start_time = Some(Instant::now());
            info.loading_end_time = None;
        }
        state.next_loading_id += 1;

        if this.async_loading.load(Ordering::Relaxed) {
            let worker = Arc::clone(this);
            let owned_name = name.to_string();
            let handle = tokio::spawn(async move {
                worker.do_loading_async(owned_name, loading_id).await;
            });
            // The worker blocks on the state lock we are holding, so the
            // handle is registered before its pre-check can run.
            state.loading_tasks.insert(loading_id, handle);
        } else {
            this.do_loading_sync(state, name, loading_id).await;
        }
    }

    async fn do_loading_sync(&self, state: &mut DispatcherState, name: &str, loading_id: u64) {
        let Some(plan) = plan_loading(state, name, loading_id) else {
            return;
        };
        let outcome = self.run_factory(name, &plan).await;
        self.finish_loading(state, name, loading_id, &plan, outcome);
        self.event.notify_waiters();
    }

    async fn do_loading_async(self: Arc<Self>, name: String, loading_id: u64) {
        let plan = {
            let state = self.state.lock().await;
            plan_loading(&state, &name, loading_id)
        };

        if let Some(plan) = plan {
            // The factory may be slow and may recursively consult the
            // loader; it must run without the state lock.
            let outcome = self.run_factory(&name, &plan).await;
            let mut state = self.state.lock().await;
            self.finish_loading(&mut state, &name, loading_id, &plan, outcome);
            state.loading_tasks.remove(&loading_id);
        } else {
            let mut state = self.state.lock().await;
            state.loading_tasks.remove(&loading_id);
        }

        self.event.notify_waiters();
    }

    async fn run_factory(
        &self,
        name: &str,
        plan: &LoadPlan,
    ) -> Result<Arc<dyn Loadable>, SharedError> {
        let previous = if plan.fresh_start {
            None
        } else {
            plan.previous.clone()
        };
        self.factory
            .create(name, &plan.config, previous)
            .await
            .map_err(SharedError::from)
    }

    /// Commit a finished load, unless the load was superseded while the
    /// lock was released, in which case the result is dropped silently.
    fn finish_loading(
        &self,
        state: &mut DispatcherState,
        name: &str,
        loading_id: u64,
        plan: &LoadPlan,
        outcome: Result<Arc<dyn Loadable>, SharedError>,
    ) {
        let (new_object, error) = match outcome {
            Ok(object) => (Some(object), None),
            Err(error) => (None, Some(error)),
        };
        let error_count = if error.is_some() {
            plan.error_count + 1
        } else {
            0
        };

        let effective_object = new_object.as_ref().or(plan.previous.as_ref());
        let next_update_time =
            self.next_update_time(&mut state.rng, effective_object, error_count);

        let Some(info) = state.infos.get_mut(name) else {
            return;
        };
        if !info.is_loading() || info.loading_id != loading_id {
            return;
        }

        if let Some(error) = &error {
            if plan.previous.is_some() {
                tracing::warn!(
                    kind = %self.kind,
                    name,
                    %error,
                    "could not update the object, leaving the previous version"
                );
            } else {
                tracing::warn!(kind = %self.kind, name, %error, "could not load the object");
            }
        }

        if let Some(object) = new_object {
            info.object = Some(object);
            info.config_changed = false;
        }
        info.error = error;
        info.error_count = error_count;
        info.loading_end_time = Some(Instant::now());
        info.loading_id = 0;
        info.forced_to_reload = false;
        info.next_update_time = next_update_time;
    }

    /// `None` means the object is never refreshed again (unless it fails
    /// or its config changes).
    fn next_update_time(
        &self,
        rng: &mut StdRng,
        object: Option<&Arc<dyn Loadable>>,
        error_count: u64,
    ) -> Option<Instant> {
        if let Some(object) = object {
            if !object.supports_updates() {
                return None;
            }

            let lifetime = object.lifetime();
            if lifetime.min_sec == 0 && lifetime.max_sec == 0 {
                return None;
            }

            if error_count == 0 {
                let hi = lifetime.max_sec.max(lifetime.min_sec);
                let seconds = rng.gen_range(lifetime.min_sec..=hi);
                return Some(Instant::now() + Duration::from_secs(seconds));
            }
        }

        Some(Instant::now() + self.backoff.delay(error_count, rng))
    }
}

fn plan_loading(state: &DispatcherState, name: &str, loading_id: u64) -> Option<LoadPlan> {
    let info = state.infos.get(name)?;
    // The object could have been removed or superseded before the worker
    // even started.
    if !info.is_loading() || info.loading_id != loading_id {
        return None;
    }
    Some(LoadPlan {
        config: Arc::clone(&info.config),
        previous: info.object.clone(),
        fresh_start: info.object.is_none() || info.config_changed || info.forced_to_reload,
        error_count: info.error_count,
    })
}

fn collect_load_results<F>(state: &DispatcherState, filter: &F) -> Vec<LoadResult>
where
    F: Fn(&str) -> bool,
{
    let mut results: Vec<LoadResult> = state
        .infos
        .values()
        .filter(|info| filter(&info.name))
        .map(Info::load_result)
        .collect();
    results.sort_by(|a, b| a.name.cmp(&b.name));
    results
}

fn deadline_for(timeout: Duration) -> Option<Instant> {
    if timeout == WAIT {
        return None;
    }
    // A timeout too large to represent is as good as unbounded.
    Instant::now().checked_add(timeout)
}

fn deadline_expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Await the enabled `Notified` future, bounded by `deadline`. Returns
/// false when the deadline elapsed first.
async fn wait_until(
    deadline: Option<Instant>,
    notified: std::pin::Pin<&mut tokio::sync::futures::Notified<'_>>,
) -> bool {
    match deadline {
        None => {
            notified.await;
            true
        }
        Some(deadline) => tokio::time::timeout_at(deadline.into(), notified)
            .await
            .is_ok(),
    }
}
