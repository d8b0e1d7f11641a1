//! Runtime locations under the base directory. Pure functions, no I/O.

use std::path::{Path, PathBuf};

pub const SOCKET_FILE: &str = "dropin.sock";
pub const STDOUT_LOG: &str = "dropin.log";
pub const STDERR_LOG: &str = "dropin-err.log";

pub fn conf_dir(base: &Path) -> PathBuf {
    base.join("conf")
}

pub fn run_dir(base: &Path) -> PathBuf {
    base.join("run")
}

pub fn socket_path(base: &Path) -> PathBuf {
    run_dir(base).join(SOCKET_FILE)
}

pub fn logs_dir(base: &Path) -> PathBuf {
    base.join("logs")
}

pub fn stdout_log_path(base: &Path) -> PathBuf {
    logs_dir(base).join(STDOUT_LOG)
}

pub fn stderr_log_path(base: &Path) -> PathBuf {
    logs_dir(base).join(STDERR_LOG)
}
