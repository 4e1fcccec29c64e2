//! Curator is a concurrent loader and registry for externally configured
//! objects.
//!
//! It discovers declarative object configurations from pluggable
//! repositories, materializes them into live objects through a
//! user-supplied factory, keeps each object in sync with its
//! configuration source, and refreshes it periodically according to its
//! lifetime. Callers ask for objects by name, blocking up to a timeout,
//! inspect load status, or force reloads; a background worker watches
//! for configuration and content changes.
//!
//! # Architecture
//!
//! - [`repository`] -- The [`ConfigRepository`](repository::ConfigRepository)
//!   trait for pluggable config backends, plus the bundled file-based and
//!   in-memory repositories.
//! - [`reader`] -- Reconciles every registered repository into one
//!   immutable snapshot mapping object name to config.
//! - [`dispatcher`] -- The per-object loading state machine: at most one
//!   in-flight load per name, concurrent waiters, cooperative
//!   cancellation, and the outdated-object sweep.
//! - [`updater`] -- Background worker that periodically re-reads the
//!   configuration and refreshes outdated objects.
//! - [`backoff`] -- Randomized exponential retry policy for failed loads.
//! - [`loadable`] -- The [`Loadable`](loadable::Loadable) and
//!   [`ObjectFactory`](loadable::ObjectFactory) traits the surrounding
//!   system implements.
//! - [`curator`] -- The [`Curator`](curator::Curator) facade tying it all
//!   together.
//! - [`error`] -- Unified error types using `thiserror`.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `toml` | TOML config file support |
//!
//! JSON config files are always supported.

pub mod backoff;
pub mod curator;
pub mod dispatcher;
pub mod error;
pub mod loadable;
pub mod reader;
pub mod repository;
pub mod updater;

pub use backoff::UpdateBackoff;
pub use curator::{check_all_loaded, check_loaded, Curator};
pub use dispatcher::{LoadResult, LoadingDispatcher, Status, WAIT};
pub use error::{BoxError, CuratorError, SharedError};
pub use loadable::{Lifetime, Loadable, ObjectFactory};
pub use reader::ConfigReader;
pub use repository::{
    ConfigRepository, ConfigTree, FileRepository, MemoryRepository, ObjectConfig, ObjectConfigs,
    RepositorySettings, INTERNAL_REPOSITORY_PREFIX,
};
pub use updater::PeriodicUpdater;
