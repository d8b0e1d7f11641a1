//! Fixtures shared by the deployer integration tests.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Write a module archive carrying `headers` in its manifest.
pub fn write_module(dir: &Path, file: &str, headers: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(file);
    let mut zip = zip::ZipWriter::new(File::create(&path).expect("create archive"));
    zip.start_file("META-INF/MANIFEST.MF", zip::write::FileOptions::default())
        .expect("start manifest");
    let mut manifest = String::from("Manifest-Version: 1.0\n");
    for (name, value) in headers {
        manifest.push_str(&format!("{name}: {value}\n"));
    }
    zip.write_all(manifest.as_bytes()).expect("write manifest");
    zip.finish().expect("finish archive");
    path
}

pub fn identity(name: &str) -> [(&str, &str); 1] {
    [("Module-Identity", name)]
}

/// Poll `condition` every 10 ms until it holds or `within` elapses.
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
