//! Wires the host, the configuration store, the watcher, both deployers and
//! the stability engine together.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dropin_core::{
    config::{self, INTERACTIVE_PREFIX},
    ConfigStore, InMemoryConfigStore, InMemoryModuleHost, LauncherConfig, ModuleHost,
    ModuleSnapshot, ServiceCensus, ServiceId, ServiceRegistry,
};
use dropin_deploy::{ConfigDeployer, ConfigFileStatus, ModuleDeployer, ModuleDeployerOptions};
use dropin_stability::{
    PendingWorkReporter, StabilityChecker, StabilityEngine, StabilityReport, StabilityTiming,
};
use dropin_watcher::{Deployer, DirectoryWatcher, Filtered, WatchedDirectoryStatus};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::DaemonError;

#[derive(Debug, Clone, Serialize)]
pub struct LauncherStatus {
    pub base: PathBuf,
    pub running: bool,
    pub modules: Vec<ModuleSnapshot>,
    pub directories: Vec<WatchedDirectoryStatus>,
    pub configurations: Vec<ConfigFileStatus>,
}

pub struct Launcher {
    base: PathBuf,
    config: LauncherConfig,
    host: Arc<InMemoryModuleHost>,
    store: InMemoryConfigStore,
    stores: ServiceRegistry<dyn ConfigStore>,
    deployers: ServiceRegistry<dyn Deployer>,
    checkers: ServiceRegistry<dyn StabilityChecker>,
    reporters: ServiceRegistry<dyn PendingWorkReporter>,
    watcher: DirectoryWatcher,
    modules: Arc<ModuleDeployer>,
    configs: Arc<ConfigDeployer>,
    engine: StabilityEngine,
    registrations: Mutex<Vec<Registration>>,
}

enum Registration {
    Store(ServiceId),
    Deployer(ServiceId),
}

impl Launcher {
    /// Read `<base>/conf/dropin.yaml` plus environment overrides and build.
    pub fn load(base: &Path) -> Result<Self, DaemonError> {
        let mut config = config::load_at(base)?;
        config.apply_env_overrides()?;
        Ok(Self::build(base, config))
    }

    pub fn build(base: &Path, config: LauncherConfig) -> Self {
        let census = ServiceCensus::new();
        let host = Arc::new(InMemoryModuleHost::new());
        let stores = ServiceRegistry::with_census(census.clone());
        let deployers = ServiceRegistry::with_census(census.clone());
        let checkers = ServiceRegistry::with_census(census.clone());
        let reporters = ServiceRegistry::with_census(census.clone());

        let modules = Arc::new(ModuleDeployer::new(
            host.clone(),
            ModuleDeployerOptions {
                use_references: config.use_references,
                auto_refresh: config.auto_refresh,
            },
        ));
        let configs = ConfigDeployer::new(stores.clone());
        let engine = StabilityEngine::new(
            host.clone(),
            census,
            reporters.clone(),
            checkers.clone(),
            StabilityTiming::from_config(&config.stability),
        );

        Self {
            base: base.to_path_buf(),
            watcher: DirectoryWatcher::new(deployers.clone()),
            store: InMemoryConfigStore::new(),
            config,
            host,
            stores,
            deployers,
            checkers,
            reporters,
            modules,
            configs,
            engine,
            registrations: Mutex::new(Vec::new()),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn host(&self) -> &Arc<InMemoryModuleHost> {
        &self.host
    }

    pub fn store(&self) -> &InMemoryConfigStore {
        &self.store
    }

    pub fn watcher(&self) -> &DirectoryWatcher {
        &self.watcher
    }

    pub fn engine(&self) -> &StabilityEngine {
        &self.engine
    }

    /// Registry for additional stability checkers.
    pub fn checkers(&self) -> &ServiceRegistry<dyn StabilityChecker> {
        &self.checkers
    }

    /// Registry for components reporting asynchronous work.
    pub fn reporters(&self) -> &ServiceRegistry<dyn PendingWorkReporter> {
        &self.reporters
    }

    /// Provision the core directory, watch the runtime and application
    /// directories, then make the store and the deployers available.
    pub fn start(&self) -> Result<(), DaemonError> {
        if self.watcher.is_running() {
            return Ok(());
        }
        let config = &self.config;
        let core = config.core_dir_at(&self.base);
        let runtime = config.runtime_dir_at(&self.base);
        let application = config.application_dir_at(&self.base);
        info!(base = %self.base.display(), interactive = config.interactive, "starting launcher");

        self.watcher.try_add(&core, None)?;
        self.watcher
            .try_add(&runtime, config.polling_for(config.watch_runtime))?;
        self.watcher
            .try_add(&application, config.polling_for(config.watch_application))?;
        self.watcher.start()?;

        let mut registrations = self.registrations.lock();
        registrations.push(Registration::Store(
            self.stores.register(Arc::new(self.store.clone())),
        ));
        registrations.push(Registration::Deployer(
            self.deployers.register(self.configs.clone()),
        ));
        registrations.push(Registration::Deployer(
            self.deployers.register(Arc::new(self.module_deployer())),
        ));
        Ok(())
    }

    /// Module deployer as registered: interactive-only modules are skipped
    /// unless interactive mode is on.
    fn module_deployer(&self) -> Filtered {
        let interactive = self.config.interactive;
        Filtered::new(self.modules.clone(), move |path| {
            interactive || !is_interactive_only(path)
        })
    }

    /// Stop watching, close the deployers, withdraw the store and shut the
    /// host down.
    pub fn stop(&self) {
        info!("stopping launcher");
        self.watcher.stop();
        for registration in self.registrations.lock().drain(..).rev() {
            match registration {
                Registration::Deployer(id) => {
                    self.deployers.unregister(id);
                }
                Registration::Store(id) => {
                    self.stores.unregister(id);
                }
            }
        }
        self.host.shutdown();
    }

    pub fn status(&self) -> LauncherStatus {
        LauncherStatus {
            base: self.base.clone(),
            running: self.watcher.is_running(),
            modules: self.host.modules(),
            directories: self.watcher.directories(),
            configurations: self.configs.records(),
        }
    }

    /// Quick probe of the system, as `is_stable` evaluates it.
    pub fn stability(&self) -> StabilityReport {
        self.engine.report_with(&self.engine.timing().quick())
    }

    /// Evaluate with the configured timing, blocking up to the full budget.
    pub fn wait_for_stability(&self) -> StabilityReport {
        let report = self.engine.report();
        if !report.stable {
            warn!("gave up waiting for stability");
        }
        report
    }
}

fn is_interactive_only(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with(INTERACTIVE_PREFIX))
        .unwrap_or(false)
}
