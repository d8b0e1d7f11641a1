//! Module deployer: keeps installed modules in sync with `.jar` files.
//!
//! ## File creation
//!
//! 1. Already mapped: update the module in place, refresh when
//!    `auto_refresh` is set, retry starting every other module that is not
//!    active, then start the updated module unless it is an attachment or
//!    already active.
//! 2. Not mapped: install (by reference when `use_references` is set), map
//!    the file, start the module unless it is an attachment, then retry
//!    starting every other module that is not active.
//!
//! Start retries are best-effort: a module whose requirements only appear
//! later starts on a later event, not through dependency ordering.
//!
//! Host failures are logged and leave the mapping as it was. Failures caused
//! by the host shutting down are expected during stop and logged at warn.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use dropin_core::manifest::{has_archive_extension, is_module};
use dropin_core::{HostError, ModuleHost, ModuleId, ModuleLocator, ModuleState};
use dropin_watcher::Deployer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleDeployerOptions {
    /// Install from the file in place instead of a copy.
    pub use_references: bool,
    /// Refresh the host after every update and uninstall.
    pub auto_refresh: bool,
}

impl Default for ModuleDeployerOptions {
    fn default() -> Self {
        Self {
            use_references: true,
            auto_refresh: false,
        }
    }
}

/// Status view of one deployed module file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployedModule {
    pub path: PathBuf,
    pub id: ModuleId,
    pub identity: Option<String>,
    pub state: ModuleState,
}

pub struct ModuleDeployer {
    host: Arc<dyn ModuleHost>,
    options: ModuleDeployerOptions,
    modules: Mutex<BTreeMap<PathBuf, ModuleId>>,
}

impl ModuleDeployer {
    pub fn new(host: Arc<dyn ModuleHost>, options: ModuleDeployerOptions) -> Self {
        Self {
            host,
            options,
            modules: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn options(&self) -> ModuleDeployerOptions {
        self.options
    }

    /// Handle of the module installed from `path`, if any.
    pub fn module_for(&self, path: &Path) -> Option<ModuleId> {
        self.modules.lock().get(path).copied()
    }

    pub fn deployed(&self) -> Vec<DeployedModule> {
        self.modules
            .lock()
            .iter()
            .map(|(path, id)| DeployedModule {
                path: path.clone(),
                id: *id,
                identity: self.host.identity(*id),
                state: self.host.state(*id),
            })
            .collect()
    }

    fn install(&self, path: &Path) -> Result<ModuleId, HostError> {
        let locator = ModuleLocator::for_path(path, self.options.use_references);
        tracing::info!(path = %path.display(), locator = %locator, "installing module");
        self.host.install(&locator)
    }

    fn label(&self, id: ModuleId) -> String {
        self.host
            .identity(id)
            .unwrap_or_else(|| id.to_string())
    }

    fn refresh(&self) {
        if !self.options.auto_refresh {
            return;
        }
        tracing::debug!("refreshing modules to purge stale references");
        if let Err(err) = self.host.refresh(&[]) {
            log_host_error(&err, "refresh modules", None);
        }
    }

    fn start(&self, id: ModuleId, path: &Path) {
        tracing::info!(module = %self.label(id), path = %path.display(), "starting module");
        if let Err(err) = self.host.start(id) {
            log_host_error(&err, "start module", Some(path));
        }
    }

    /// Try to start every mapped module other than `trigger` that is neither
    /// active nor an attachment.
    fn start_pending(&self, modules: &BTreeMap<PathBuf, ModuleId>, trigger: ModuleId) {
        for id in modules.values().copied().filter(|id| *id != trigger) {
            if self.host.state(id) == ModuleState::Active || self.host.is_attachment(id) {
                continue;
            }
            tracing::debug!(
                module = %self.label(id),
                trigger = %self.label(trigger),
                "retrying start",
            );
            if let Err(err) = self.host.start(id) {
                tracing::debug!(module = %self.label(id), error = %err, "module still not startable");
            }
        }
    }

    fn redeploy(&self, modules: &BTreeMap<PathBuf, ModuleId>, id: ModuleId, path: &Path) {
        tracing::info!(module = %self.label(id), path = %path.display(), "updating module");
        if let Err(err) = self.host.update(id) {
            log_host_error(&err, "update module", Some(path));
            return;
        }
        self.refresh();
        self.start_pending(modules, id);
        if self.host.state(id) != ModuleState::Active && !self.host.is_attachment(id) {
            self.start(id, path);
        }
    }
}

impl Deployer for ModuleDeployer {
    fn name(&self) -> &str {
        "module-deployer"
    }

    fn accept(&self, path: &Path) -> bool {
        has_archive_extension(path) && (!path.exists() || is_module(path))
    }

    fn on_file_create(&self, path: &Path) {
        tracing::debug!(path = %path.display(), "module file event");
        let mut modules = self.modules.lock();

        if let Some(id) = modules.get(path).copied() {
            self.redeploy(&modules, id, path);
            return;
        }

        let id = match self.install(path) {
            Ok(id) => id,
            Err(err) => {
                log_host_error(&err, "install module", Some(path));
                return;
            }
        };
        modules.insert(path.to_path_buf(), id);
        if !self.host.is_attachment(id) {
            self.start(id, path);
        }
        self.start_pending(&modules, id);
    }

    fn on_file_delete(&self, path: &Path) {
        let removed = self.modules.lock().remove(path);
        let Some(id) = removed else {
            return;
        };
        tracing::info!(module = %self.label(id), path = %path.display(), "uninstalling module");
        match self.host.uninstall(id) {
            Ok(()) => self.refresh(),
            Err(err) => log_host_error(&err, "uninstall module", Some(path)),
        }
    }

    /// Install every file first, then start the regular modules.
    fn open(&self, files: &[PathBuf]) {
        let mut modules = self.modules.lock();
        let mut to_start = Vec::new();
        for file in files {
            match self.install(file) {
                Ok(id) => {
                    modules.insert(file.clone(), id);
                    if !self.host.is_attachment(id) {
                        to_start.push((id, file));
                    }
                }
                Err(err) => log_host_error(&err, "install module", Some(file)),
            }
        }
        for (id, file) in to_start {
            self.start(id, file);
        }
    }
}

fn log_host_error(err: &HostError, action: &str, path: Option<&Path>) {
    let path = path.map(|path| path.display().to_string()).unwrap_or_default();
    if err.is_shutting_down() {
        tracing::warn!(path = %path, "cannot {action}: module host is stopping");
    } else {
        tracing::error!(path = %path, error = %err, "cannot {action}");
    }
}
