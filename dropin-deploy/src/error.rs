//! Error types for dropin-deploy.

use std::path::PathBuf;

use thiserror::Error;

use dropin_core::StoreError;

/// A syntax error inside a properties file.
#[derive(Debug, Error)]
#[error("line {line}: {reason}")]
pub struct PropertiesError {
    pub line: usize,
    pub reason: String,
}

/// Errors raised while applying a configuration file.
///
/// Deployer callbacks never return these: they are logged and the record
/// keeps its previous state.
#[derive(Debug, Error)]
pub enum DeployError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed properties in {path}: {source}")]
    Properties {
        path: PathBuf,
        #[source]
        source: PropertiesError,
    },

    /// The file name does not yield a configuration identifier.
    #[error("cannot derive a configuration PID from {0}")]
    InvalidName(PathBuf),

    #[error("configuration store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience constructor for [`DeployError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DeployError {
    DeployError::Io {
        path: path.into(),
        source,
    }
}
