//! `dropin start|stop|logs`: launcher process lifecycle.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use dropin_daemon::paths::{stderr_log_path, stdout_log_path};
use dropin_daemon::{request_stop, start_blocking, DaemonError};

pub fn start(base: &Path) -> Result<()> {
    start_blocking(base).context("launcher exited with error")
}

pub fn stop(base: &Path) -> Result<()> {
    match request_stop(base) {
        Ok(()) => println!("launcher stop requested"),
        Err(DaemonError::DaemonNotRunning { .. }) => println!("launcher is not running"),
        Err(err) => return Err(err).context("failed to stop launcher"),
    }
    Ok(())
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Show only the stderr log file.
    #[arg(long)]
    pub stderr_only: bool,
}

impl LogsArgs {
    pub fn run(self, base: &Path) -> Result<()> {
        if !self.stderr_only {
            print_tail(&stdout_log_path(base), self.lines)
                .context("failed to read launcher log")?;
        }
        print_tail(&stderr_log_path(base), self.lines).context("failed to read launcher error log")
    }
}

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut tail = VecDeque::<String>::with_capacity(lines);
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if tail.len() == lines {
            tail.pop_front();
        }
        if lines > 0 {
            tail.push_back(line);
        }
    }

    println!("==> {} <==", path.display());
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
