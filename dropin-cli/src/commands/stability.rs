//! `dropin stability`: evaluate the checkers of a running launcher.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use dropin_daemon::request_stability;

#[derive(Args, Debug)]
pub struct StabilityArgs {
    /// Wait with the configured grace period and attempts instead of a
    /// quick probe.
    #[arg(long)]
    pub wait: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StabilityArgs {
    pub fn run(self, base: &Path) -> Result<()> {
        let report =
            request_stability(base, self.wait).context("failed to query launcher stability")?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to render report JSON")?
            );
        } else {
            print_report(&report);
        }

        if report["stable"].as_bool() != Some(true) {
            anyhow::bail!("system is not stable");
        }
        Ok(())
    }
}

fn print_report(report: &Value) {
    let checkers = report["checkers"].as_array().cloned().unwrap_or_default();
    for checker in checkers {
        let name = checker["name"].as_str().unwrap_or("?");
        let priority = checker["priority"].as_i64().unwrap_or_default();
        let result = &checker["result"];
        let line = match result["status"].as_str() {
            Some("stable") => "stable".green().to_string(),
            Some("unstable") => format!(
                "{} {}",
                "unstable".red().bold(),
                result["reason"].as_str().unwrap_or_default()
            ),
            _ => "not run".bright_black().to_string(),
        };
        println!("{priority:>4}  {name:<16} {line}");
    }
}
