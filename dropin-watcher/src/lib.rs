//! Directory watching and deployer dispatch.
//!
//! - [`deployer`]: the [`Deployer`] contract and the [`Filtered`] adapter
//! - [`watcher`]: [`DirectoryWatcher`] and its per-directory pollers

pub mod deployer;
pub mod error;
pub mod watcher;

pub use deployer::{Deployer, Filtered};
pub use error::WatchError;
pub use watcher::{DirectoryWatcher, WatchedDirectoryStatus, DEFAULT_POLL_INTERVAL};
