use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command as StdCommand, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn dropin(base: &Path) -> Command {
    let mut cmd = Command::cargo_bin("dropin").expect("dropin binary");
    cmd.arg("--base").arg(base).env_remove("DROPIN_BASE");
    cmd
}

fn write_module(dir: &Path, file: &str, identity: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(file);
    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
    zip.start_file("META-INF/MANIFEST.MF", zip::write::FileOptions::default())
        .unwrap();
    writeln!(zip, "Module-Identity: {identity}").unwrap();
    zip.finish().unwrap();
    path
}

// ---------------------------------------------------------------------------
// Without a running launcher
// ---------------------------------------------------------------------------

#[test]
fn init_lays_out_the_base_directory() {
    let base = TempDir::new().unwrap();
    dropin(base.path())
        .args(["init", "--watch-runtime"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized launcher"));

    for dir in ["core", "runtime", "application"] {
        assert!(base.path().join(dir).is_dir(), "{dir} created");
    }
    let yaml = std::fs::read_to_string(base.path().join("conf/dropin.yaml")).unwrap();
    assert!(yaml.contains("watch_runtime: true"));

    dropin(base.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    dropin(base.path()).args(["init", "--force"]).assert().success();
}

#[test]
fn status_and_stop_report_a_missing_launcher() {
    let base = TempDir::new().unwrap();
    dropin(base.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("launcher is not running"));
    dropin(base.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"running\": false"));
    dropin(base.path())
        .arg("stop")
        .assert()
        .success()
        .stdout(predicate::str::contains("launcher is not running"));
}

#[test]
fn stability_needs_a_running_launcher() {
    let base = TempDir::new().unwrap();
    dropin(base.path())
        .arg("stability")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to query launcher stability"));
}

#[test]
fn logs_tolerate_missing_files() {
    let base = TempDir::new().unwrap();
    dropin(base.path())
        .args(["logs", "--stderr-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("log file not found"))
        .stdout(predicate::str::contains("dropin-err.log"));
}

#[test]
fn logs_print_the_tail() {
    let base = TempDir::new().unwrap();
    let logs = base.path().join("logs");
    std::fs::create_dir_all(&logs).unwrap();
    std::fs::write(logs.join("dropin.log"), "first-line\nsecond-line\nthird-line\n").unwrap();

    dropin(base.path())
        .args(["logs", "--lines", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("second-line\nthird-line"))
        .stdout(predicate::str::contains("first-line").not());
}

// ---------------------------------------------------------------------------
// Against a launcher process
// ---------------------------------------------------------------------------

struct Launcher {
    child: Child,
}

impl Launcher {
    fn start(base: &Path) -> Self {
        let child = StdCommand::new(env!("CARGO_BIN_EXE_dropin"))
            .arg("--base")
            .arg(base)
            .arg("start")
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn launcher");
        let socket = base.join("run/dropin.sock");
        let deadline = Instant::now() + Duration::from_secs(10);
        while !socket.exists() {
            assert!(Instant::now() < deadline, "launcher socket never appeared");
            sleep(Duration::from_millis(20));
        }
        Self { child }
    }

    fn wait(mut self, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        while Instant::now() < deadline {
            if let Ok(Some(status)) = self.child.try_wait() {
                return status.success();
            }
            sleep(Duration::from_millis(20));
        }
        false
    }
}

impl Drop for Launcher {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn launcher_lifecycle_over_the_socket() {
    let base = TempDir::new().unwrap();
    dropin(base.path()).arg("init").assert().success();
    write_module(&base.path().join("core"), "base.jar", "base");

    let launcher = Launcher::start(base.path());

    dropin(base.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"identity\": \"base\""))
        .stdout(predicate::str::contains("\"state\": \"active\""));
    dropin(base.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 modules (1 settled)"));
    dropin(base.path())
        .arg("stability")
        .assert()
        .success()
        .stdout(predicate::str::contains("module-state"));

    dropin(base.path())
        .arg("stop")
        .assert()
        .success()
        .stdout(predicate::str::contains("stop requested"));
    assert!(launcher.wait(Duration::from_secs(10)), "launcher exits cleanly");
}
