//! Domain types shared by the watcher, the deployers and the stability engine.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Handle of a module installed in a [`ModuleHost`](crate::host::ModuleHost).
///
/// Handles are assigned by the host and never reused for the lifetime of the
/// host, so a stale handle can only ever resolve to "uninstalled".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub u64);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Persistent identity of a configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pid(pub String);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Pid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Pid {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Key/value content of a configuration record. Ordered so that logs and
/// status payloads are stable.
pub type Properties = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle state of a module inside the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    Installed,
    Resolved,
    Starting,
    Active,
    Stopping,
    Uninstalled,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleState::Installed => write!(f, "installed"),
            ModuleState::Resolved => write!(f, "resolved"),
            ModuleState::Starting => write!(f, "starting"),
            ModuleState::Active => write!(f, "active"),
            ModuleState::Stopping => write!(f, "stopping"),
            ModuleState::Uninstalled => write!(f, "uninstalled"),
        }
    }
}

/// Where the host should take a module's bytes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleLocator {
    /// The host reads the file in place on every install/update.
    Reference(PathBuf),
    /// The host copies the archive content at install time.
    Copy(PathBuf),
}

impl ModuleLocator {
    pub fn path(&self) -> &Path {
        match self {
            ModuleLocator::Reference(path) | ModuleLocator::Copy(path) => path,
        }
    }

    pub fn for_path(path: &Path, by_reference: bool) -> Self {
        if by_reference {
            ModuleLocator::Reference(path.to_path_buf())
        } else {
            ModuleLocator::Copy(path.to_path_buf())
        }
    }
}

impl fmt::Display for ModuleLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleLocator::Reference(path) => write!(f, "reference:{}", path.display()),
            ModuleLocator::Copy(path) => write!(f, "file:{}", path.display()),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// Point-in-time view of one module, as enumerated by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSnapshot {
    pub id: ModuleId,
    pub identity: String,
    pub state: ModuleState,
    pub attachment: bool,
    pub location: PathBuf,
}

impl ModuleSnapshot {
    /// A module is settled once it reached its terminal state: active for
    /// regular modules, resolved for attachment modules.
    pub fn is_settled(&self) -> bool {
        if self.attachment {
            self.state == ModuleState::Resolved
        } else {
            self.state == ModuleState::Active
        }
    }
}
