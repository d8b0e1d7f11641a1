//! Size-based rotation of the launcher logs.
//!
//! `dropin.log` and `dropin-err.log` are rotated past 10 MiB, keeping five
//! numbered backups: `dropin.log` → `dropin.log.1` → … → `dropin.log.5`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::paths::{stderr_log_path, stdout_log_path};

pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

pub const MAX_BACKUPS: usize = 5;

/// Rotate `log` when it is at least `max_bytes` long.
///
/// The oldest backup is dropped, the others shift up by one and the live
/// file is copied to `.1`, then truncated in place. Writers holding it open
/// in append mode keep logging to the same path. Returns whether a rotation
/// happened; a missing file is not an error.
pub fn rotate_if_needed(log: &Path, max_bytes: u64, backups: usize) -> io::Result<bool> {
    let size = match fs::metadata(log) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes {
        return Ok(false);
    }

    let oldest = backup_path(log, backups);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..backups).rev() {
        let from = backup_path(log, n);
        if from.exists() {
            fs::rename(&from, backup_path(log, n + 1))?;
        }
    }
    fs::copy(log, backup_path(log, 1))?;
    fs::OpenOptions::new().write(true).open(log)?.set_len(0)?;
    Ok(true)
}

/// Rotate both launcher logs under `base`. Failures are logged and do not
/// stop the other file from rotating.
pub fn rotate_logs(base: &Path) {
    for log in [stdout_log_path(base), stderr_log_path(base)] {
        match rotate_if_needed(&log, MAX_LOG_BYTES, MAX_BACKUPS) {
            Ok(true) => info!(path = %log.display(), "log rotated"),
            Ok(false) => {}
            Err(err) => warn!(path = %log.display(), error = %err, "log rotation failed"),
        }
    }
}

fn backup_path(log: &Path, n: usize) -> PathBuf {
    let mut name = log.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{n}"));
    log.with_file_name(name)
}
