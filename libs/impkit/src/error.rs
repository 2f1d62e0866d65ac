use std::path::PathBuf;

use impkit_bootstrap::paths::InstanceDirError;
use impkit_bootstrap::{ConfigError, UriError};
use thiserror::Error;

/// Failure to load one source file. Recoverable while importing resources:
/// the file is logged and skipped.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no source linked for '{key}'")]
    NotLinked { key: String },
    #[error("loading '{key}' failed")]
    LoadFailed {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Model registry lookups.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Model {name} not found in model registry\nAvailable models: {}", known.join(", "))]
    UnknownModel { name: String, known: Vec<String> },
    #[error("{name} is not a model: it has no table")]
    NotAModel { name: String },
    #[error("the global model registry is already installed")]
    GlobalAlreadyInstalled,
}

/// Fatal composition errors. Any of these aborts the pass.
#[derive(Debug, Error)]
pub enum ImpError {
    #[error("the engine is already initialized for this application")]
    AlreadyInitialized,
    #[error("the engine must be initialized before this call")]
    NotInitialized,
    #[error("app resources have already been imported")]
    ResourcesAlreadyImported,
    #[error("folder does not exist: {path:?}")]
    MissingFolder { path: PathBuf },
    #[error("not a folder: {path:?}")]
    NotAFolder { path: PathBuf },
    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no unit entry is linked for {path:?}")]
    NotAUnit { path: PathBuf },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    InstanceDir(#[from] InstanceDirError),
    #[error("database binding '{binding}' is invalid")]
    Uri {
        binding: String,
        #[source]
        source: UriError,
    },
    #[error("unit entry for {path:?} failed")]
    UnitEntry {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("unit '{name}' at {path:?} is already registered")]
    AlreadyRegistered { name: String, path: PathBuf },
    #[error("failed to import models from {path:?}: {reason}")]
    ModelImport { path: PathBuf, reason: String },
    /// Recoverable while importing resources; callers log and continue.
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("factory '{factory}' in '{key}' failed")]
    Factory {
        factory: String,
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("application host rejected the operation")]
    Host {
        #[source]
        source: anyhow::Error,
    },
    #[error("the database has already been initialized")]
    OrmAlreadyInitialized,
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
