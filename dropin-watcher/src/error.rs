use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("{0} exists but is not a directory")]
    NotADirectory(PathBuf),

    #[error("{0} is already watched")]
    AlreadyWatched(PathBuf),

    #[error("{path} is covered by the polled directory {parent}")]
    CoveredByParent { path: PathBuf, parent: PathBuf },
}

impl WatchError {
    /// Rejections caused by the directory table rather than by the filesystem.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            WatchError::AlreadyWatched(_) | WatchError::CoveredByParent { .. }
        )
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> WatchError {
    WatchError::Io {
        path: path.into(),
        source,
    }
}
