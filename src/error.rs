//! Unified error types for curator.
//!
//! Defines [`CuratorError`] (the main crate error enum) plus the
//! [`BoxError`] / [`SharedError`] aliases used at the trait seams.
//! Repository and factory implementations return [`BoxError`] so they
//! are free to use their own error types; failures surfaced to load
//! waiters are stored as [`SharedError`] because many callers may
//! observe the same failed load.

use std::path::PathBuf;
use std::sync::Arc;

/// Error type accepted from user-supplied repositories, factories, and
/// loadable objects.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A load failure shared between the registry and every caller that
/// queries it.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CuratorError {
    #[error("'{name}' not found among the configured objects")]
    NotFound { name: String },

    #[error("'{name}' is still loading")]
    StillLoading { name: String },

    #[error("'{name}' was never tried to load")]
    NeverLoaded { name: String },

    #[error("loading '{name}' failed: {source}")]
    LoadFailed {
        name: String,
        #[source]
        source: SharedError,
    },

    #[error("config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("config file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
