//! # dropin-deploy
//!
//! The two reference deployers.
//!
//! - [`ModuleDeployer`] turns `.jar` module archives into installed, running
//!   modules of a [`ModuleHost`](dropin_core::ModuleHost).
//! - [`ConfigDeployer`] turns `.cfg` properties files into records of the
//!   current [`ConfigStore`](dropin_core::ConfigStore).

pub mod config;
pub mod error;
pub mod module;
pub mod pid;
pub mod properties;

pub use config::{ConfigDeployer, ConfigFileStatus};
pub use error::{DeployError, PropertiesError};
pub use module::{DeployedModule, ModuleDeployer, ModuleDeployerOptions};
pub use pid::ConfigName;
