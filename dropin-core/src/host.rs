//! Module Host contract and the in-process reference host.
//!
//! The deployers only talk to the [`ModuleHost`] trait. [`InMemoryModuleHost`]
//! is the host the launcher runs with: it tracks module state from manifests
//! without loading any code.
//!
//! Reference host rules:
//! - installing a location that is already installed returns the existing
//!   handle; installing a second location with the same identity fails;
//! - a regular module starts only when every `Require-Modules` identity is
//!   active, otherwise it stays `Installed`;
//! - an attachment module is `Resolved` while its host module is installed,
//!   `Installed` otherwise, and can never be started;
//! - uninstalling a module leaves its dependents active until [`refresh`]
//!   (stale references), mirroring a real module runtime;
//! - once [`shutdown`] was called every operation fails with
//!   [`HostError::ShuttingDown`].
//!
//! [`refresh`]: ModuleHost::refresh
//! [`shutdown`]: InMemoryModuleHost::shutdown

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::error::HostError;
use crate::manifest::{read_manifest, ModuleManifest};
use crate::types::{ModuleId, ModuleLocator, ModuleSnapshot, ModuleState};

/// Operations the deployers and the stability engine need from the runtime
/// owning the modules.
pub trait ModuleHost: Send + Sync {
    fn install(&self, locator: &ModuleLocator) -> Result<ModuleId, HostError>;

    /// Re-read the module from its original location.
    fn update(&self, id: ModuleId) -> Result<(), HostError>;

    fn start(&self, id: ModuleId) -> Result<(), HostError>;

    fn uninstall(&self, id: ModuleId) -> Result<(), HostError>;

    fn is_attachment(&self, id: ModuleId) -> bool;

    /// State of a module; unknown handles are `Uninstalled`.
    fn state(&self, id: ModuleId) -> ModuleState;

    /// Identity of a module, for logging.
    fn identity(&self, id: ModuleId) -> Option<String>;

    /// Re-link modules to purge stale references. An empty slice means every
    /// module.
    fn refresh(&self, _ids: &[ModuleId]) -> Result<(), HostError> {
        Ok(())
    }

    /// Every module currently known to the host.
    fn modules(&self) -> Vec<ModuleSnapshot>;
}

#[derive(Debug)]
struct InstalledModule {
    locator: ModuleLocator,
    manifest: ModuleManifest,
    state: ModuleState,
}

#[derive(Debug, Default)]
struct HostState {
    modules: BTreeMap<ModuleId, InstalledModule>,
    next_id: u64,
    shutting_down: bool,
}

impl HostState {
    fn ensure_running(&self) -> Result<(), HostError> {
        if self.shutting_down {
            Err(HostError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    fn find_identity(&self, identity: &str) -> Option<(&ModuleId, &InstalledModule)> {
        self.modules
            .iter()
            .find(|(_, module)| module.manifest.identity == identity)
    }

    fn is_active(&self, identity: &str) -> bool {
        self.find_identity(identity)
            .map(|(_, module)| module.state == ModuleState::Active)
            .unwrap_or(false)
    }

    fn missing_requirement(&self, manifest: &ModuleManifest) -> Option<String> {
        manifest
            .requires
            .iter()
            .find(|required| !self.is_active(required))
            .cloned()
    }

    /// Attachment modules follow the presence of their host module.
    fn resolve_attachments(&mut self) {
        let present: Vec<String> = self
            .modules
            .values()
            .filter(|module| !module.manifest.is_attachment())
            .map(|module| module.manifest.identity.clone())
            .collect();
        for module in self.modules.values_mut() {
            if let Some(host) = &module.manifest.attachment_host {
                module.state = if present.iter().any(|identity| identity == host) {
                    ModuleState::Resolved
                } else {
                    ModuleState::Installed
                };
            }
        }
    }
}

/// In-process module host driven purely by manifests.
#[derive(Debug, Default)]
pub struct InMemoryModuleHost {
    state: Mutex<HostState>,
}

impl InMemoryModuleHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop every module and refuse further operations.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutting_down = true;
        for module in state.modules.values_mut() {
            if module.state == ModuleState::Active {
                module.state = ModuleState::Resolved;
            }
        }
        tracing::info!(modules = state.modules.len(), "module host shut down");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }

    /// Handle of the module carrying `identity`, if installed.
    pub fn find(&self, identity: &str) -> Option<ModuleId> {
        self.state
            .lock()
            .find_identity(identity)
            .map(|(id, _)| *id)
    }
}

impl ModuleHost for InMemoryModuleHost {
    fn install(&self, locator: &ModuleLocator) -> Result<ModuleId, HostError> {
        let mut state = self.state.lock();
        state.ensure_running()?;

        if let Some((id, _)) = state
            .modules
            .iter()
            .find(|(_, module)| module.locator.path() == locator.path())
        {
            return Ok(*id);
        }

        let manifest = read_manifest(locator.path()).map_err(|e| HostError::Install {
            locator: locator.clone(),
            reason: e.to_string(),
        })?;
        if let Some((_, existing)) = state.find_identity(&manifest.identity) {
            return Err(HostError::Install {
                locator: locator.clone(),
                reason: format!(
                    "module {} is already installed from {}",
                    manifest.identity,
                    existing.locator.path().display()
                ),
            });
        }

        state.next_id += 1;
        let id = ModuleId(state.next_id);
        state.modules.insert(
            id,
            InstalledModule {
                locator: locator.clone(),
                manifest,
                state: ModuleState::Installed,
            },
        );
        state.resolve_attachments();
        Ok(id)
    }

    fn update(&self, id: ModuleId) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.ensure_running()?;

        let location = state
            .modules
            .get(&id)
            .map(|module| module.locator.path().to_path_buf())
            .ok_or(HostError::UnknownModule(id))?;
        let manifest = read_manifest(&location).map_err(|e| HostError::Update {
            id,
            reason: e.to_string(),
        })?;
        if let Some((other, _)) = state.find_identity(&manifest.identity) {
            if *other != id {
                return Err(HostError::Update {
                    id,
                    reason: format!("module {} is already installed", manifest.identity),
                });
            }
        }

        let unmet = state.missing_requirement(&manifest);
        let Some(module) = state.modules.get_mut(&id) else {
            return Err(HostError::UnknownModule(id));
        };
        let was_active = module.state == ModuleState::Active;
        module.manifest = manifest;
        module.state = if was_active && unmet.is_none() && !module.manifest.is_attachment() {
            ModuleState::Active
        } else {
            ModuleState::Installed
        };
        state.resolve_attachments();
        Ok(())
    }

    fn start(&self, id: ModuleId) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.ensure_running()?;

        let module = state.modules.get(&id).ok_or(HostError::UnknownModule(id))?;
        if module.manifest.is_attachment() {
            return Err(HostError::Start {
                id,
                reason: format!(
                    "{} is an attachment module and cannot be started",
                    module.manifest.identity
                ),
            });
        }
        if module.state == ModuleState::Active {
            return Ok(());
        }
        if let Some(missing) = state.missing_requirement(&module.manifest) {
            return Err(HostError::Start {
                id,
                reason: format!("required module {missing} is not active"),
            });
        }
        if let Some(module) = state.modules.get_mut(&id) {
            module.state = ModuleState::Active;
        }
        Ok(())
    }

    fn uninstall(&self, id: ModuleId) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.ensure_running()?;
        state
            .modules
            .remove(&id)
            .ok_or(HostError::UnknownModule(id))?;
        state.resolve_attachments();
        Ok(())
    }

    fn is_attachment(&self, id: ModuleId) -> bool {
        self.state
            .lock()
            .modules
            .get(&id)
            .map(|module| module.manifest.is_attachment())
            .unwrap_or(false)
    }

    fn state(&self, id: ModuleId) -> ModuleState {
        self.state
            .lock()
            .modules
            .get(&id)
            .map(|module| module.state)
            .unwrap_or(ModuleState::Uninstalled)
    }

    fn identity(&self, id: ModuleId) -> Option<String> {
        self.state
            .lock()
            .modules
            .get(&id)
            .map(|module| module.manifest.identity.clone())
    }

    fn refresh(&self, ids: &[ModuleId]) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.ensure_running()?;

        // Stop dependents until nothing changes: stopping one module can
        // invalidate the modules requiring it.
        loop {
            let stale: Vec<ModuleId> = state
                .modules
                .iter()
                .filter(|(id, _)| ids.is_empty() || ids.contains(id))
                .filter(|(_, module)| module.state == ModuleState::Active)
                .filter(|(_, module)| state.missing_requirement(&module.manifest).is_some())
                .map(|(id, _)| *id)
                .collect();
            if stale.is_empty() {
                break;
            }
            for id in stale {
                if let Some(module) = state.modules.get_mut(&id) {
                    module.state = ModuleState::Installed;
                }
            }
        }
        state.resolve_attachments();
        Ok(())
    }

    fn modules(&self) -> Vec<ModuleSnapshot> {
        self.state
            .lock()
            .modules
            .iter()
            .map(|(id, module)| ModuleSnapshot {
                id: *id,
                identity: module.manifest.identity.clone(),
                state: module.state,
                attachment: module.manifest.is_attachment(),
                location: module.locator.path().to_path_buf(),
            })
            .collect()
    }
}
