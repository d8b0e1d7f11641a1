use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the launcher, the runtime and the control protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] dropin_core::ConfigError),

    #[error("watcher error: {0}")]
    Watch(#[from] dropin_watcher::WatchError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot open log file {path}: {source}")]
    Logging {
        path: PathBuf,
        #[source]
        source: tracing_appender::rolling::InitError,
    },

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
