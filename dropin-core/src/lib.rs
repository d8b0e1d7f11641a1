//! dropin core library: domain types, contracts of the external
//! collaborators, and the shared concurrency building blocks.
//!
//! - [`types`]: module and configuration domain types
//! - [`error`]: [`ConfigError`], [`HostError`], [`StoreError`], [`ManifestError`]
//! - [`config`]: launcher configuration loading
//! - [`registry`]: typed in-process service registry
//! - [`lock`]: re-entrant reader/writer lock with scoped guards
//! - [`manifest`]: module manifest reading
//! - [`host`]: [`ModuleHost`] contract and in-memory host
//! - [`store`]: [`ConfigStore`] contract and in-memory store

pub mod config;
pub mod error;
pub mod host;
pub mod lock;
pub mod manifest;
pub mod registry;
pub mod store;
pub mod types;

pub use config::LauncherConfig;
pub use error::{ConfigError, HostError, ManifestError, StoreError};
pub use host::{InMemoryModuleHost, ModuleHost};
pub use lock::ReentrantRwLock;
pub use registry::{ServiceCensus, ServiceId, ServiceListener, ServiceRegistry};
pub use store::{ConfigHandle, ConfigStore, InMemoryConfigStore};
pub use types::{ModuleId, ModuleLocator, ModuleSnapshot, ModuleState, Pid, Properties};
