//! Configuration deployer: pushes `.cfg` files into the configuration store.
//!
//! The store may come and go. While none is available every observed file is
//! kept as an unmanaged record; when a store arrives the unmanaged records
//! are applied, and when it leaves the live records fall back to unmanaged
//! without being deleted from the store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;

use dropin_core::registry::ListenerId;
use dropin_core::{ConfigHandle, ConfigStore, Pid, ServiceId, ServiceListener, ServiceRegistry};
use dropin_watcher::Deployer;

use crate::error::DeployError;
use crate::pid::{ConfigName, CONFIG_EXTENSION};
use crate::properties;

#[derive(Debug, Clone)]
enum ConfigRecord {
    /// Seen while no store was available.
    Unmanaged,
    Live(Arc<dyn ConfigHandle>),
}

/// Status view of one configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigFileStatus {
    pub path: PathBuf,
    pub managed: bool,
    pub pid: Option<Pid>,
    pub factory_pid: Option<Pid>,
}

#[derive(Default)]
struct ConfigState {
    store: Option<(ServiceId, Arc<dyn ConfigStore>)>,
    records: BTreeMap<PathBuf, ConfigRecord>,
}

pub struct ConfigDeployer {
    stores: ServiceRegistry<dyn ConfigStore>,
    state: Mutex<ConfigState>,
    listener: Mutex<Option<ListenerId>>,
}

impl ConfigDeployer {
    /// Create the deployer and start tracking `stores`. A store already
    /// registered is adopted immediately.
    pub fn new(stores: ServiceRegistry<dyn ConfigStore>) -> Arc<Self> {
        let deployer = Arc::new(Self {
            stores: stores.clone(),
            state: Mutex::new(ConfigState::default()),
            listener: Mutex::new(None),
        });
        let tracker = Arc::new(StoreTracker {
            deployer: Arc::downgrade(&deployer),
        });
        let listener = stores.subscribe(tracker);
        *deployer.listener.lock() = Some(listener);
        deployer
    }

    pub fn has_store(&self) -> bool {
        self.state.lock().store.is_some()
    }

    pub fn records(&self) -> Vec<ConfigFileStatus> {
        self.state
            .lock()
            .records
            .iter()
            .map(|(path, record)| match record {
                ConfigRecord::Unmanaged => ConfigFileStatus {
                    path: path.clone(),
                    managed: false,
                    pid: None,
                    factory_pid: None,
                },
                ConfigRecord::Live(handle) => ConfigFileStatus {
                    path: path.clone(),
                    managed: true,
                    pid: Some(handle.pid()),
                    factory_pid: handle.factory_pid(),
                },
            })
            .collect()
    }

    fn store_arrived(&self, id: ServiceId, store: &Arc<dyn ConfigStore>) {
        let mut state = self.state.lock();
        if state.store.is_some() {
            return;
        }
        tracing::info!(store = %id, "configuration store available");
        state.store = Some((id, Arc::clone(store)));
        self.replay(&mut state);
    }

    fn store_departed(&self, id: ServiceId) {
        let mut state = self.state.lock();
        if state.store.as_ref().map(|(current, _)| *current) != Some(id) {
            return;
        }
        tracing::info!(store = %id, "configuration store gone, configurations unmanaged");
        state.store = None;
        for record in state.records.values_mut() {
            *record = ConfigRecord::Unmanaged;
        }

        // Another registered store takes over.
        if let Some((next, store)) = self.stores.entries().into_iter().next() {
            tracing::info!(store = %next, "switching configuration store");
            state.store = Some((next, store));
            self.replay(&mut state);
        }
    }

    /// Apply every unmanaged record against the current store.
    fn replay(&self, state: &mut ConfigState) {
        let pending: Vec<PathBuf> = state
            .records
            .iter()
            .filter(|(_, record)| matches!(record, ConfigRecord::Unmanaged))
            .map(|(path, _)| path.clone())
            .collect();
        for path in pending {
            self.apply(state, &path);
        }
    }

    fn apply(&self, state: &mut ConfigState, path: &Path) {
        let Some(store) = state.store.as_ref().map(|(_, store)| Arc::clone(store)) else {
            tracing::warn!(path = %path.display(), "no configuration store, configuration deferred");
            state
                .records
                .insert(path.to_path_buf(), ConfigRecord::Unmanaged);
            return;
        };

        match push(store.as_ref(), state.records.get(path), path) {
            Ok(handle) => {
                state
                    .records
                    .insert(path.to_path_buf(), ConfigRecord::Live(handle));
            }
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "cannot apply configuration");
                state
                    .records
                    .entry(path.to_path_buf())
                    .or_insert(ConfigRecord::Unmanaged);
            }
        }
    }
}

/// Read `path` and update its record in `store`, reusing the live handle of
/// a previous push.
fn push(
    store: &dyn ConfigStore,
    previous: Option<&ConfigRecord>,
    path: &Path,
) -> Result<Arc<dyn ConfigHandle>, DeployError> {
    let name = ConfigName::from_path(path).ok_or_else(|| DeployError::InvalidName(path.to_path_buf()))?;
    let properties = properties::read(path)?;

    let handle = match previous {
        Some(ConfigRecord::Live(handle)) => Arc::clone(handle),
        _ => {
            let handle = match &name.qualifier {
                Some(qualifier) => store.get_or_create_factory(&name.pid, qualifier)?,
                None => store.get(&name.pid)?,
            };
            if handle.binding_location().is_some() {
                handle.clear_binding_location();
            }
            handle
        }
    };

    tracing::info!(
        pid = %handle.pid(),
        path = %path.display(),
        keys = properties.len(),
        "updating configuration",
    );
    handle.update(&properties)?;
    Ok(handle)
}

impl Deployer for ConfigDeployer {
    fn name(&self) -> &str {
        "config-deployer"
    }

    fn accept(&self, path: &Path) -> bool {
        path.extension().and_then(|ext| ext.to_str()) == Some(CONFIG_EXTENSION)
    }

    fn on_file_create(&self, path: &Path) {
        tracing::debug!(path = %path.display(), "configuration file event");
        let mut state = self.state.lock();
        self.apply(&mut state, path);
    }

    fn on_file_delete(&self, path: &Path) {
        let removed = self.state.lock().records.remove(path);
        if let Some(ConfigRecord::Live(handle)) = removed {
            tracing::info!(pid = %handle.pid(), path = %path.display(), "deleting configuration");
            if let Err(err) = handle.delete() {
                tracing::error!(pid = %handle.pid(), error = %err, "cannot delete configuration");
            }
        }
    }

    /// Stop tracking stores. Records become unmanaged; the store keeps its
    /// configurations.
    fn close(&self) {
        if let Some(listener) = self.listener.lock().take() {
            self.stores.unsubscribe(listener);
        }
        let mut state = self.state.lock();
        state.store = None;
        for record in state.records.values_mut() {
            *record = ConfigRecord::Unmanaged;
        }
    }
}

struct StoreTracker {
    deployer: Weak<ConfigDeployer>,
}

impl ServiceListener<dyn ConfigStore> for StoreTracker {
    fn on_arrival(&self, id: ServiceId, service: &Arc<dyn ConfigStore>) {
        if let Some(deployer) = self.deployer.upgrade() {
            deployer.store_arrived(id, service);
        }
    }

    fn on_departure(&self, id: ServiceId, _service: &Arc<dyn ConfigStore>) {
        if let Some(deployer) = self.deployer.upgrade() {
            deployer.store_departed(id);
        }
    }
}
