//! Lifecycle tests for the in-memory module host.
//!
//! Each test builds its own archives in an isolated `TempDir`.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use dropin_core::{
    host::{InMemoryModuleHost, ModuleHost},
    manifest::MANIFEST_PATH,
    HostError, ModuleLocator, ModuleState,
};
use rstest::rstest;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_module(dir: &Path, file: &str, headers: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(file);
    let mut zip = zip::ZipWriter::new(File::create(&path).expect("create archive"));
    zip.start_file(MANIFEST_PATH, zip::write::FileOptions::default())
        .expect("start manifest");
    let mut manifest = String::from("Manifest-Version: 1.0\n");
    for (name, value) in headers {
        manifest.push_str(&format!("{name}: {value}\n"));
    }
    zip.write_all(manifest.as_bytes()).expect("write manifest");
    zip.finish().expect("finish archive");
    path
}

fn reference(path: &Path) -> ModuleLocator {
    ModuleLocator::Reference(path.to_path_buf())
}

// ---------------------------------------------------------------------------
// 1. Install / start
// ---------------------------------------------------------------------------

#[test]
fn install_then_start_reaches_active() {
    let dir = TempDir::new().expect("tempdir");
    let jar = write_module(dir.path(), "a.jar", &[("Module-Identity", "m1")]);
    let host = InMemoryModuleHost::new();

    let id = host.install(&reference(&jar)).expect("install");
    assert_eq!(host.state(id), ModuleState::Installed);
    host.start(id).expect("start");
    assert_eq!(host.state(id), ModuleState::Active);
    assert_eq!(host.find("m1"), Some(id));
}

#[test]
fn installing_same_location_twice_returns_same_handle() {
    let dir = TempDir::new().expect("tempdir");
    let jar = write_module(dir.path(), "a.jar", &[("Module-Identity", "m1")]);
    let host = InMemoryModuleHost::new();

    let first = host.install(&reference(&jar)).expect("install");
    let second = host.install(&reference(&jar)).expect("install again");
    assert_eq!(first, second);
    assert_eq!(host.modules().len(), 1);
}

#[test]
fn duplicate_identity_from_other_location_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let a = write_module(dir.path(), "a.jar", &[("Module-Identity", "m1")]);
    let b = write_module(dir.path(), "b.jar", &[("Module-Identity", "m1")]);
    let host = InMemoryModuleHost::new();

    host.install(&reference(&a)).expect("install a");
    let err = host.install(&reference(&b)).unwrap_err();
    assert!(matches!(err, HostError::Install { .. }), "got: {err}");
}

#[rstest]
#[case::missing_requirement(&[("Module-Identity", "app"), ("Require-Modules", "base")])]
#[case::one_of_two_missing(&[("Module-Identity", "app"), ("Require-Modules", "other, base")])]
fn start_fails_until_requirements_are_active(#[case] headers: &[(&str, &str)]) {
    let dir = TempDir::new().expect("tempdir");
    let app = write_module(dir.path(), "app.jar", headers);
    let host = InMemoryModuleHost::new();

    let id = host.install(&reference(&app)).expect("install");
    assert!(matches!(host.start(id), Err(HostError::Start { .. })));
    assert_eq!(host.state(id), ModuleState::Installed);
}

#[test]
fn start_succeeds_once_dependency_is_active() {
    let dir = TempDir::new().expect("tempdir");
    let app = write_module(
        dir.path(),
        "app.jar",
        &[("Module-Identity", "app"), ("Require-Modules", "base")],
    );
    let base = write_module(dir.path(), "base.jar", &[("Module-Identity", "base")]);
    let host = InMemoryModuleHost::new();

    let app_id = host.install(&reference(&app)).expect("install app");
    let base_id = host.install(&reference(&base)).expect("install base");
    host.start(base_id).expect("start base");
    host.start(app_id).expect("start app");
    assert_eq!(host.state(app_id), ModuleState::Active);
}

// ---------------------------------------------------------------------------
// 2. Attachment modules
// ---------------------------------------------------------------------------

#[test]
fn attachment_resolves_with_its_host_and_never_starts() {
    let dir = TempDir::new().expect("tempdir");
    let frag = write_module(
        dir.path(),
        "frag.jar",
        &[("Module-Identity", "frag"), ("Attachment-Host", "core")],
    );
    let core = write_module(dir.path(), "core.jar", &[("Module-Identity", "core")]);
    let host = InMemoryModuleHost::new();

    let frag_id = host.install(&reference(&frag)).expect("install frag");
    assert_eq!(host.state(frag_id), ModuleState::Installed);
    assert!(host.is_attachment(frag_id));

    let core_id = host.install(&reference(&core)).expect("install core");
    assert_eq!(host.state(frag_id), ModuleState::Resolved);
    assert!(matches!(host.start(frag_id), Err(HostError::Start { .. })));

    host.uninstall(core_id).expect("uninstall core");
    assert_eq!(host.state(frag_id), ModuleState::Installed);
}

// ---------------------------------------------------------------------------
// 3. Update / uninstall / refresh
// ---------------------------------------------------------------------------

#[test]
fn update_rereads_manifest_from_location() {
    let dir = TempDir::new().expect("tempdir");
    let jar = write_module(dir.path(), "a.jar", &[("Module-Identity", "m1")]);
    let host = InMemoryModuleHost::new();
    let id = host.install(&reference(&jar)).expect("install");
    host.start(id).expect("start");

    write_module(
        dir.path(),
        "a.jar",
        &[("Module-Identity", "m1"), ("Module-Version", "2.0")],
    );
    host.update(id).expect("update");
    assert_eq!(host.state(id), ModuleState::Active);
}

#[test]
fn dependents_stay_active_until_refresh() {
    let dir = TempDir::new().expect("tempdir");
    let base = write_module(dir.path(), "base.jar", &[("Module-Identity", "base")]);
    let app = write_module(
        dir.path(),
        "app.jar",
        &[("Module-Identity", "app"), ("Require-Modules", "base")],
    );
    let host = InMemoryModuleHost::new();
    let base_id = host.install(&reference(&base)).expect("install base");
    let app_id = host.install(&reference(&app)).expect("install app");
    host.start(base_id).expect("start base");
    host.start(app_id).expect("start app");

    host.uninstall(base_id).expect("uninstall");
    assert_eq!(host.state(base_id), ModuleState::Uninstalled);
    assert_eq!(host.state(app_id), ModuleState::Active, "stale until refresh");

    host.refresh(&[]).expect("refresh");
    assert_eq!(host.state(app_id), ModuleState::Installed);
}

#[test]
fn every_operation_fails_while_shutting_down() {
    let dir = TempDir::new().expect("tempdir");
    let jar = write_module(dir.path(), "a.jar", &[("Module-Identity", "m1")]);
    let host = InMemoryModuleHost::new();
    let id = host.install(&reference(&jar)).expect("install");
    host.start(id).expect("start");

    host.shutdown();
    assert!(host.start(id).unwrap_err().is_shutting_down());
    assert!(host.update(id).unwrap_err().is_shutting_down());
    assert!(host.uninstall(id).unwrap_err().is_shutting_down());
    assert_eq!(host.state(id), ModuleState::Resolved);
}

#[test]
fn unknown_handle_is_uninstalled() {
    let host = InMemoryModuleHost::new();
    assert_eq!(host.state(dropin_core::ModuleId(99)), ModuleState::Uninstalled);
    assert!(matches!(
        host.uninstall(dropin_core::ModuleId(99)),
        Err(HostError::UnknownModule(_))
    ));
}
