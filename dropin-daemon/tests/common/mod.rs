#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Write a module archive with the given identity.
pub fn write_module(dir: &Path, file: &str, identity: &str) -> PathBuf {
    std::fs::create_dir_all(dir).expect("module dir");
    let path = dir.join(file);
    let mut zip = zip::ZipWriter::new(File::create(&path).expect("create archive"));
    zip.start_file("META-INF/MANIFEST.MF", zip::write::FileOptions::default())
        .expect("start manifest");
    writeln!(zip, "Manifest-Version: 1.0\nModule-Identity: {identity}").expect("write manifest");
    zip.finish().expect("finish archive");
    path
}

/// A launcher configuration polling fast enough for tests.
pub fn write_config(base: &Path, extra: &str) {
    let conf = base.join("conf");
    std::fs::create_dir_all(&conf).expect("conf dir");
    std::fs::write(
        conf.join("dropin.yaml"),
        format!("poll_interval_ms: 20\nstability:\n  grace_ms: 5\n  attempts: 20\n{extra}"),
    )
    .expect("write config");
}

pub fn eventually(what: &str, within: Duration, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("timed out after {within:?} waiting for {what}");
}
