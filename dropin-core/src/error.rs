//! Error types for dropin-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ModuleId, ModuleLocator, Pid};

/// Errors raised while loading the launcher configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load, with the file path and serde_yaml's line context.
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to serialize configuration for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An environment override could not be parsed.
    #[error("invalid value '{value}' for {var}")]
    InvalidOverride { var: &'static str, value: String },
}

/// Errors raised while reading a module manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open module archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("no manifest in {path}")]
    MissingManifest { path: PathBuf },

    #[error("manifest of {path} has no {attribute} attribute")]
    MissingIdentity {
        path: PathBuf,
        attribute: &'static str,
    },
}

/// Failures reported by a [`ModuleHost`](crate::host::ModuleHost).
#[derive(Debug, Error)]
pub enum HostError {
    #[error("cannot install {locator}: {reason}")]
    Install { locator: ModuleLocator, reason: String },

    #[error("cannot update module {id}: {reason}")]
    Update { id: ModuleId, reason: String },

    #[error("cannot start module {id}: {reason}")]
    Start { id: ModuleId, reason: String },

    #[error("cannot uninstall module {id}: {reason}")]
    Uninstall { id: ModuleId, reason: String },

    #[error("unknown module {0}")]
    UnknownModule(ModuleId),

    /// The host is stopping or restarting; callers treat this as non-fatal.
    #[error("module host is shutting down")]
    ShuttingDown,

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
}

impl HostError {
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, HostError::ShuttingDown)
    }
}

/// Failures reported by a [`ConfigStore`](crate::store::ConfigStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("configuration {0} was deleted")]
    Deleted(Pid),

    #[error("configuration store is unavailable")]
    Unavailable,

    #[error("configuration store rejected {pid}: {reason}")]
    Rejected { pid: Pid, reason: String },
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
