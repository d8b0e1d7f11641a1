//! Directory watcher behaviour against real directories.
//!
//! Polled directories use a 20 ms period; timing assertions go through
//! `eventually`, which gives the pollers a few seconds before failing.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dropin_core::ServiceRegistry;
use dropin_watcher::{Deployer, DirectoryWatcher};
use parking_lot::Mutex;
use rstest::rstest;
use tempfile::TempDir;

const FAST: Option<Duration> = Some(Duration::from_millis(20));

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Records every callback as a short string, e.g. `create:a.txt`.
struct RecordingDeployer {
    extension: &'static str,
    events: Mutex<Vec<String>>,
}

impl RecordingDeployer {
    fn new(extension: &'static str) -> Arc<Self> {
        Arc::new(Self {
            extension,
            events: Mutex::new(Vec::new()),
        })
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn record(&self, kind: &str, path: &Path) {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        self.events.lock().push(format!("{kind}:{name}"));
    }
}

impl Deployer for RecordingDeployer {
    fn accept(&self, path: &Path) -> bool {
        path.extension().and_then(|ext| ext.to_str()) == Some(self.extension)
    }

    fn on_file_create(&self, path: &Path) {
        self.record("create", path);
    }

    fn on_file_change(&self, path: &Path) {
        self.record("change", path);
    }

    fn on_file_delete(&self, path: &Path) {
        self.record("delete", path);
    }

    fn open(&self, files: &[PathBuf]) {
        let names: Vec<String> = files
            .iter()
            .map(|file| file.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        self.events.lock().push(format!("open:[{}]", names.join(",")));
    }

    fn close(&self) {
        self.events.lock().push("close".to_string());
    }
}

struct PanickingDeployer;

impl Deployer for PanickingDeployer {
    fn accept(&self, _path: &Path) -> bool {
        true
    }

    fn on_file_create(&self, _path: &Path) {
        panic!("deployer bug");
    }

    fn open(&self, _files: &[PathBuf]) {
        panic!("deployer bug while opening");
    }
}

fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("timed out waiting for {what}");
}

fn watcher() -> DirectoryWatcher {
    DirectoryWatcher::new(ServiceRegistry::new())
}

// ---------------------------------------------------------------------------
// 1. Directory table
// ---------------------------------------------------------------------------

#[test]
fn re_adding_a_polled_directory_is_rejected() {
    let root = TempDir::new().unwrap();
    let watcher = watcher();
    assert!(watcher.add(root.path(), FAST));
    assert!(!watcher.add(root.path(), FAST));
    assert!(!watcher.add(root.path(), None));
    assert_eq!(watcher.directories().len(), 1);
}

#[rstest]
#[case::polled_parent(FAST, false)]
#[case::provisioned_parent(None, true)]
fn child_admission_depends_on_parent_polling(
    #[case] parent_poll: Option<Duration>,
    #[case] admitted: bool,
) {
    let root = TempDir::new().unwrap();
    let child = root.path().join("child");
    std::fs::create_dir_all(&child).unwrap();

    let watcher = watcher();
    assert!(watcher.add(root.path(), parent_poll));
    assert_eq!(watcher.add(&child, FAST), admitted);
}

#[test]
fn provisioned_directory_can_be_upgraded_to_polling_once() {
    let root = TempDir::new().unwrap();
    let watcher = watcher();
    assert!(watcher.add(root.path(), None));
    assert!(!watcher.add(root.path(), None));
    assert!(watcher.add(root.path(), FAST));
    assert!(!watcher.add(root.path(), FAST));

    let directories = watcher.directories();
    assert_eq!(directories.len(), 1);
    assert_eq!(directories[0].poll_interval_ms, Some(20));
}

#[test]
fn polled_directory_is_created_when_missing() {
    let root = TempDir::new().unwrap();
    let missing = root.path().join("a/b");
    let watcher = watcher();
    assert!(watcher.add(&missing, FAST));
    assert!(missing.is_dir());
}

#[test]
fn regular_file_is_not_a_directory() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("plain.txt");
    std::fs::write(&file, "x").unwrap();
    assert!(!watcher().add(&file, FAST));
}

// ---------------------------------------------------------------------------
// 2. Opening deployers
// ---------------------------------------------------------------------------

#[test]
fn late_deployer_is_opened_on_every_directory() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    std::fs::write(first.path().join("a.txt"), "a").unwrap();
    std::fs::write(first.path().join("ignored.bin"), "b").unwrap();

    let registry = ServiceRegistry::<dyn Deployer>::new();
    let watcher = DirectoryWatcher::new(registry.clone());
    assert!(watcher.add(first.path(), FAST));
    assert!(watcher.add(second.path(), None));
    watcher.start().unwrap();

    let deployer = RecordingDeployer::new("txt");
    registry.register(deployer.clone());
    assert_eq!(deployer.events(), vec!["open:[a.txt]", "open:[]"]);
}

#[test]
fn deployers_registered_before_start_are_opened_on_start() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("a.txt"), "a").unwrap();

    let registry = ServiceRegistry::<dyn Deployer>::new();
    let deployer = RecordingDeployer::new("txt");
    registry.register(deployer.clone());

    let watcher = DirectoryWatcher::new(registry);
    assert!(watcher.add(root.path(), None));
    assert!(deployer.events().is_empty(), "nothing happens before start");

    watcher.start().unwrap();
    assert_eq!(deployer.events(), vec!["open:[a.txt]"]);
}

#[test]
fn directory_added_while_running_opens_existing_deployers() {
    let root = TempDir::new().unwrap();
    std::fs::create_dir_all(root.path().join("nested")).unwrap();
    std::fs::write(root.path().join("nested/deep.txt"), "d").unwrap();

    let registry = ServiceRegistry::<dyn Deployer>::new();
    let watcher = DirectoryWatcher::new(registry.clone());
    watcher.start().unwrap();
    let deployer = RecordingDeployer::new("txt");
    registry.register(deployer.clone());
    assert!(deployer.events().is_empty(), "no directory yet");

    assert!(watcher.add(root.path(), None));
    assert_eq!(deployer.events(), vec!["open:[deep.txt]"]);
}

// ---------------------------------------------------------------------------
// 3. Event fan-out
// ---------------------------------------------------------------------------

#[test]
fn file_lifecycle_reaches_accepting_deployers_only() {
    let root = TempDir::new().unwrap();
    let registry = ServiceRegistry::<dyn Deployer>::new();
    let watcher = DirectoryWatcher::new(registry.clone());
    assert!(watcher.add(root.path(), FAST));
    watcher.start().unwrap();

    let text = RecordingDeployer::new("txt");
    let other = RecordingDeployer::new("cfg");
    registry.register(text.clone());
    registry.register(other.clone());

    let file = root.path().join("a.txt");
    std::fs::write(&file, "one").unwrap();
    eventually("creation", || text.events().contains(&"create:a.txt".to_string()));

    thread::sleep(Duration::from_millis(50));
    std::fs::write(&file, "two, longer").unwrap();
    eventually("change", || text.events().contains(&"change:a.txt".to_string()));

    std::fs::remove_file(&file).unwrap();
    eventually("deletion", || text.events().contains(&"delete:a.txt".to_string()));

    assert_eq!(other.events(), vec!["open:[]"]);
}

#[test]
fn panicking_deployer_does_not_stop_the_poller() {
    let root = TempDir::new().unwrap();
    let registry = ServiceRegistry::<dyn Deployer>::new();
    let watcher = DirectoryWatcher::new(registry.clone());
    assert!(watcher.add(root.path(), FAST));
    watcher.start().unwrap();

    registry.register(Arc::new(PanickingDeployer));
    let survivor = RecordingDeployer::new("txt");
    registry.register(survivor.clone());

    std::fs::write(root.path().join("first.txt"), "1").unwrap();
    eventually("first file", || survivor.events().contains(&"create:first.txt".to_string()));
    std::fs::write(root.path().join("second.txt"), "2").unwrap();
    eventually("second file", || survivor.events().contains(&"create:second.txt".to_string()));
}

#[test]
fn unregistered_deployer_receives_nothing_more() {
    let root = TempDir::new().unwrap();
    let registry = ServiceRegistry::<dyn Deployer>::new();
    let watcher = DirectoryWatcher::new(registry.clone());
    assert!(watcher.add(root.path(), FAST));
    watcher.start().unwrap();

    let gone = RecordingDeployer::new("txt");
    let stays = RecordingDeployer::new("txt");
    let id = registry.register(gone.clone());
    registry.register(stays.clone());
    registry.unregister(id);

    std::fs::write(root.path().join("late.txt"), "x").unwrap();
    eventually("delivery", || stays.events().contains(&"create:late.txt".to_string()));
    assert_eq!(gone.events(), vec!["open:[]"]);
}

// ---------------------------------------------------------------------------
// 4. Removal and shutdown
// ---------------------------------------------------------------------------

#[test]
fn removed_directory_is_no_longer_polled() {
    let root = TempDir::new().unwrap();
    let registry = ServiceRegistry::<dyn Deployer>::new();
    let watcher = DirectoryWatcher::new(registry.clone());
    assert!(watcher.add(root.path(), FAST));
    watcher.start().unwrap();
    let deployer = RecordingDeployer::new("txt");
    registry.register(deployer.clone());

    assert!(watcher.remove(root.path()));
    assert!(!watcher.remove(root.path()), "second removal is a no-op");

    std::fs::write(root.path().join("after.txt"), "x").unwrap();
    thread::sleep(Duration::from_millis(150));
    assert_eq!(deployer.events(), vec!["open:[]"], "no close, no events");
}

#[test]
fn stop_closes_deployers_after_the_last_delivery() {
    let root = TempDir::new().unwrap();
    let registry = ServiceRegistry::<dyn Deployer>::new();
    let watcher = DirectoryWatcher::new(registry.clone());
    assert!(watcher.add(root.path(), FAST));
    watcher.start().unwrap();
    let deployer = RecordingDeployer::new("txt");
    registry.register(deployer.clone());

    std::fs::write(root.path().join("a.txt"), "a").unwrap();
    eventually("creation", || deployer.events().len() >= 2);

    watcher.stop();
    assert!(!watcher.is_running());
    assert!(watcher.directories().is_empty());
    assert_eq!(deployer.events().last().map(String::as_str), Some("close"));

    std::fs::write(root.path().join("b.txt"), "b").unwrap();
    thread::sleep(Duration::from_millis(150));
    assert_eq!(deployer.events().last().map(String::as_str), Some("close"));

    // Registering after stop is ignored by the watcher.
    let late = RecordingDeployer::new("txt");
    registry.register(late.clone());
    assert!(late.events().is_empty());
}
