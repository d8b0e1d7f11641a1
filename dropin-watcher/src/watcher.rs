//! Directory watcher: owns the watched directories and fans file events out
//! to the registered deployers.
//!
//! Each polled directory gets its own [`notify::PollWatcher`] thread. A poll
//! tick runs every deployer callback on that thread, outside any lock, and a
//! panicking deployer is logged and skipped.
//!
//! Locking: the deployer list and the directory table are mutated under the
//! write side of a [`ReentrantRwLock`]; a poll tick computes the accepting
//! deployers under its read side. Compound operations (register a deployer
//! then open it on every directory, add a directory then open every deployer
//! on it) hold the write side for their whole duration, so a deployer never
//! misses a directory and never sees one twice.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use notify::event::EventKind;
use notify::{Config, Event, PollWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use walkdir::WalkDir;

use dropin_core::registry::ListenerId;
use dropin_core::{ReentrantRwLock, ServiceId, ServiceListener, ServiceRegistry};

use crate::deployer::{normalize, Deployer};
use crate::error::{io_err, WatchError};

/// Polling period used by [`DirectoryWatcher::add_watched`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileAction {
    Create,
    Change,
    Delete,
}

impl FileAction {
    fn from_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(FileAction::Create),
            EventKind::Modify(_) => Some(FileAction::Change),
            EventKind::Remove(_) => Some(FileAction::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileAction::Create => "creation",
            FileAction::Change => "change",
            FileAction::Delete => "deletion",
        })
    }
}

/// Status view of one watched directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchedDirectoryStatus {
    pub path: PathBuf,
    pub poll_interval_ms: Option<u64>,
    pub polling: bool,
}

struct PollerShared {
    directory: PathBuf,
    running: AtomicBool,
    // Held for the whole of a tick's delivery. Re-entrant so a deployer may
    // remove its own directory from inside a callback.
    in_flight: ReentrantMutex<()>,
}

struct Poller {
    shared: Arc<PollerShared>,
    watcher: PollWatcher,
}

impl Poller {
    fn start(core: Weak<WatcherCore>, directory: &Path, period: Duration) -> Result<Self, WatchError> {
        let shared = Arc::new(PollerShared {
            directory: directory.to_path_buf(),
            running: AtomicBool::new(true),
            in_flight: ReentrantMutex::new(()),
        });
        let tick = Arc::clone(&shared);
        let config = Config::default().with_poll_interval(period);
        let mut watcher = PollWatcher::new(
            move |event: notify::Result<Event>| dispatch(&core, &tick, event),
            config,
        )?;
        watcher.watch(directory, RecursiveMode::Recursive)?;
        tracing::debug!(
            path = %directory.display(),
            period_ms = period.as_millis() as u64,
            "poller started",
        );
        Ok(Self { shared, watcher })
    }

    fn halt(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }

    /// Stop delivering and wait for the tick in progress, unless the calling
    /// thread still holds the watcher lock (the tick may be waiting on it).
    fn stop(self, lock: &ReentrantRwLock) {
        self.halt();
        if lock.write_hold_count() == 0 && lock.read_hold_count() == 0 {
            let _drained = self.shared.in_flight.lock();
        }
        drop(self.watcher);
        tracing::debug!(path = %self.shared.directory.display(), "poller stopped");
    }
}

struct WatchedDirectory {
    path: PathBuf,
    canonical: PathBuf,
    poll: Option<Duration>,
    poller: Option<Poller>,
}

#[derive(Default)]
struct State {
    running: bool,
    listener: Option<ListenerId>,
    deployers: Vec<(ServiceId, Arc<dyn Deployer>)>,
    directories: Vec<WatchedDirectory>,
}

impl State {
    /// Decide whether `canonical` may be added with the given polling mode.
    fn admit(&self, path: &Path, canonical: &Path, polled: bool) -> Result<(), WatchError> {
        if let Some(existing) = self.directories.iter().find(|d| d.canonical == canonical) {
            // Only a provisioned-once directory may be upgraded to polling.
            if existing.poll.is_some() || !polled {
                return Err(WatchError::AlreadyWatched(path.to_path_buf()));
            }
            return Ok(());
        }
        if let Some(parent) = self
            .directories
            .iter()
            .find(|d| d.poll.is_some() && canonical.starts_with(&d.canonical))
        {
            return Err(WatchError::CoveredByParent {
                path: path.to_path_buf(),
                parent: parent.path.clone(),
            });
        }
        Ok(())
    }

    fn deployer_list(&self) -> Vec<Arc<dyn Deployer>> {
        self.deployers
            .iter()
            .map(|(_, deployer)| Arc::clone(deployer))
            .collect()
    }
}

struct WatcherCore {
    lock: ReentrantRwLock,
    state: Mutex<State>,
}

impl WatcherCore {
    /// Open every deployer on `directory`.
    fn open_deployers(&self, directory: &Path) {
        let _write = self.lock.write();
        let files = list_files(directory);
        let deployers = self.state.lock().deployer_list();
        for deployer in deployers {
            open_deployer(&deployer, directory, &files);
        }
    }

    fn deployer_arrived(&self, id: ServiceId, deployer: &Arc<dyn Deployer>) {
        let _write = self.lock.write();
        let directories = {
            let mut state = self.state.lock();
            if !state.running {
                return;
            }
            state.deployers.push((id, Arc::clone(deployer)));
            state
                .directories
                .iter()
                .map(|d| d.path.clone())
                .collect::<Vec<_>>()
        };
        tracing::debug!(deployer = deployer.name(), "deployer arrived");
        for directory in directories {
            let files = list_files(&directory);
            open_deployer(deployer, &directory, &files);
        }
    }

    fn deployer_departed(&self, id: ServiceId) {
        let _write = self.lock.write();
        self.state
            .lock()
            .deployers
            .retain(|(deployer_id, _)| *deployer_id != id);
    }
}

struct DeployerTracker {
    core: Weak<WatcherCore>,
}

impl ServiceListener<dyn Deployer> for DeployerTracker {
    fn on_arrival(&self, id: ServiceId, service: &Arc<dyn Deployer>) {
        if let Some(core) = self.core.upgrade() {
            core.deployer_arrived(id, service);
        }
    }

    fn on_departure(&self, id: ServiceId, service: &Arc<dyn Deployer>) {
        if let Some(core) = self.core.upgrade() {
            core.deployer_departed(id);
            tracing::debug!(deployer = service.name(), "deployer departed");
        }
    }
}

/// Watches directories and dispatches their file events to the deployers
/// registered in a [`ServiceRegistry`].
///
/// Directories can be added before [`start`](Self::start); their pollers
/// only run once the watcher is started.
pub struct DirectoryWatcher {
    core: Arc<WatcherCore>,
    deployers: ServiceRegistry<dyn Deployer>,
}

impl DirectoryWatcher {
    pub fn new(deployers: ServiceRegistry<dyn Deployer>) -> Self {
        Self {
            core: Arc::new(WatcherCore {
                lock: ReentrantRwLock::new(),
                state: Mutex::new(State::default()),
            }),
            deployers,
        }
    }

    pub fn deployers(&self) -> &ServiceRegistry<dyn Deployer> {
        &self.deployers
    }

    pub fn is_running(&self) -> bool {
        self.core.state.lock().running
    }

    /// Start the pollers of every directory added so far and begin tracking
    /// deployers. Every deployer already registered is opened on every
    /// directory.
    pub fn start(&self) -> Result<(), WatchError> {
        let _write = self.core.lock.write();
        {
            let mut state = self.core.state.lock();
            if state.running {
                return Ok(());
            }
            let directories: Vec<String> = state
                .directories
                .iter()
                .map(|d| d.path.display().to_string())
                .collect();
            tracing::info!(directories = ?directories, "starting directory watcher");

            for directory in state.directories.iter_mut() {
                let Some(period) = directory.poll else {
                    tracing::debug!(path = %directory.path.display(), "no file monitoring");
                    continue;
                };
                if directory.poller.is_none() {
                    let poller =
                        Poller::start(Arc::downgrade(&self.core), &directory.path, period)?;
                    directory.poller = Some(poller);
                }
            }
            state.running = true;
        }

        // Replays every registered deployer through `deployer_arrived`.
        let tracker = Arc::new(DeployerTracker {
            core: Arc::downgrade(&self.core),
        });
        let listener = self.deployers.subscribe(tracker);
        self.core.state.lock().listener = Some(listener);
        Ok(())
    }

    /// Stop every poller, wait for deliveries in progress, then close every
    /// deployer. Directories are forgotten.
    pub fn stop(&self) {
        let (pollers, deployers, listener) = {
            let _write = self.core.lock.write();
            let mut state = self.core.state.lock();
            if !state.running && state.directories.is_empty() {
                return;
            }
            state.running = false;
            let pollers: Vec<Poller> = state
                .directories
                .drain(..)
                .filter_map(|directory| directory.poller)
                .collect();
            for poller in &pollers {
                poller.halt();
            }
            (
                pollers,
                std::mem::take(&mut state.deployers),
                state.listener.take(),
            )
        };

        if let Some(listener) = listener {
            self.deployers.unsubscribe(listener);
        }
        for poller in pollers {
            poller.stop(&self.core.lock);
        }
        for (_, deployer) in deployers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| deployer.close()));
            if let Err(payload) = outcome {
                tracing::error!(
                    deployer = deployer.name(),
                    panic = %panic_message(payload.as_ref()),
                    "deployer panicked while closing",
                );
            }
        }
        tracing::info!("directory watcher stopped");
    }

    /// Add `directory`, polled with `poll` or provisioned once when `None`.
    ///
    /// Returns `false` (and logs why) when the directory is already watched,
    /// covered by a polled ancestor, or cannot be used.
    pub fn add(&self, directory: impl AsRef<Path>, poll: Option<Duration>) -> bool {
        let directory = directory.as_ref();
        match self.try_add(directory, poll) {
            Ok(()) => true,
            Err(err) if err.is_rejection() => {
                tracing::warn!(path = %directory.display(), error = %err, "directory not added");
                false
            }
            Err(err) => {
                tracing::error!(path = %directory.display(), error = %err, "cannot watch directory");
                false
            }
        }
    }

    /// [`add`](Self::add) with [`DEFAULT_POLL_INTERVAL`] when `watch` is set.
    pub fn add_watched(&self, directory: impl AsRef<Path>, watch: bool) -> bool {
        self.add(directory, watch.then_some(DEFAULT_POLL_INTERVAL))
    }

    pub fn try_add(&self, directory: &Path, poll: Option<Duration>) -> Result<(), WatchError> {
        let poll = poll.filter(|period| !period.is_zero());
        let directory = &absolute(directory)?;
        if directory.exists() && !directory.is_dir() {
            return Err(WatchError::NotADirectory(directory.to_path_buf()));
        }

        let _write = self.core.lock.write();
        let mut canonical = normalize(directory).unwrap_or_else(|| directory.to_path_buf());
        let running = {
            let state = self.core.state.lock();
            state.admit(directory, &canonical, poll.is_some())?;
            state.running
        };

        let poller = match poll {
            Some(period) => {
                if !directory.is_dir() {
                    tracing::info!(path = %directory.display(), "creating missing watched directory");
                    std::fs::create_dir_all(directory).map_err(|e| io_err(directory, e))?;
                    canonical = normalize(directory).unwrap_or(canonical);
                }
                if running {
                    Some(Poller::start(Arc::downgrade(&self.core), directory, period)?)
                } else {
                    None
                }
            }
            None => None,
        };

        {
            let mut state = self.core.state.lock();
            match state.directories.iter_mut().find(|d| d.canonical == canonical) {
                Some(existing) => {
                    existing.poll = poll;
                    existing.poller = poller;
                }
                None => state.directories.push(WatchedDirectory {
                    path: directory.to_path_buf(),
                    canonical,
                    poll,
                    poller,
                }),
            }
        }
        tracing::info!(
            path = %directory.display(),
            poll_ms = poll.map(|period| period.as_millis() as u64),
            "directory added",
        );

        if running {
            self.core.open_deployers(directory);
        }
        Ok(())
    }

    /// Stop polling `directory` and forget it. Deployers are not closed.
    ///
    /// Returns `false` when the directory was not tracked.
    pub fn remove(&self, directory: impl AsRef<Path>) -> bool {
        let directory = directory.as_ref();
        let Ok(directory) = absolute(directory) else {
            return false;
        };
        let canonical = normalize(&directory).unwrap_or_else(|| directory.clone());
        let removed = {
            let _write = self.core.lock.write();
            let mut state = self.core.state.lock();
            let position = state
                .directories
                .iter()
                .position(|d| d.canonical == canonical);
            position.map(|position| state.directories.remove(position))
        };
        let Some(removed) = removed else {
            return false;
        };
        if let Some(poller) = removed.poller {
            poller.stop(&self.core.lock);
        }
        tracing::info!(path = %directory.display(), "directory removed");
        true
    }

    /// Watched directories in insertion order.
    pub fn directories(&self) -> Vec<WatchedDirectoryStatus> {
        self.core
            .state
            .lock()
            .directories
            .iter()
            .map(|d| WatchedDirectoryStatus {
                path: d.path.clone(),
                poll_interval_ms: d.poll.map(|period| period.as_millis() as u64),
                polling: d.poller.is_some(),
            })
            .collect()
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Deliver one poller event to every accepting deployer.
fn dispatch(core: &Weak<WatcherCore>, poller: &PollerShared, event: notify::Result<Event>) {
    let event = match event {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(path = %poller.directory.display(), error = %err, "poller error");
            return;
        }
    };
    let Some(action) = FileAction::from_kind(&event.kind) else {
        return;
    };
    let Some(core) = core.upgrade() else {
        return;
    };

    let _in_flight = poller.in_flight.lock();
    for path in &event.paths {
        if action != FileAction::Delete && !path.is_file() {
            continue;
        }
        let accepting = {
            let _read = core.lock.read();
            if !poller.running.load(Ordering::SeqCst) {
                return;
            }
            let deployers = core.state.lock().deployer_list();
            deployers
                .into_iter()
                .filter(|deployer| deployer.accept(path))
                .collect::<Vec<_>>()
        };
        if accepting.is_empty() {
            continue;
        }

        tracing::info!(
            path = %path.display(),
            directory = %poller.directory.display(),
            action = %action,
            deployers = accepting.len(),
            "file event",
        );
        for deployer in accepting {
            deliver(&deployer, action, path);
        }
    }
}

fn deliver(deployer: &Arc<dyn Deployer>, action: FileAction, path: &Path) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match action {
        FileAction::Create => deployer.on_file_create(path),
        FileAction::Change => deployer.on_file_change(path),
        FileAction::Delete => deployer.on_file_delete(path),
    }));
    if let Err(payload) = outcome {
        tracing::error!(
            deployer = deployer.name(),
            path = %path.display(),
            action = %action,
            panic = %panic_message(payload.as_ref()),
            "deployer failed",
        );
    }
}

fn open_deployer(deployer: &Arc<dyn Deployer>, directory: &Path, files: &[PathBuf]) {
    let accepted: Vec<PathBuf> = files
        .iter()
        .filter(|file| deployer.accept(file))
        .cloned()
        .collect();
    tracing::info!(
        deployer = deployer.name(),
        directory = %directory.display(),
        files = accepted.len(),
        "opening deployer",
    );
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| deployer.open(&accepted)));
    if let Err(payload) = outcome {
        tracing::error!(
            deployer = deployer.name(),
            directory = %directory.display(),
            panic = %panic_message(payload.as_ref()),
            "deployer failed while opening",
        );
    }
}

/// Resolve a relative `path` against the working directory so that the
/// watched entry does not depend on whether the directory exists yet.
fn absolute(path: &Path) -> Result<PathBuf, WatchError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| io_err(path, e))?;
    Ok(cwd.join(path))
}

/// Every regular file under `directory`, recursively, sorted by path.
fn list_files(directory: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(directory)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::debug!(path = %directory.display(), error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
