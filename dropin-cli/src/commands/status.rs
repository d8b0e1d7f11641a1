//! `dropin status`: what the running launcher has deployed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use serde_json::{json, Value};
use tabled::{settings::Style, Table, Tabled};

use dropin_core::{ModuleSnapshot, ModuleState};
use dropin_daemon::{paths::socket_path, request_status, DaemonError};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Deserialize)]
struct StatusView {
    modules: Vec<ModuleSnapshot>,
    directories: Vec<DirectoryView>,
    configurations: Vec<ConfigView>,
}

#[derive(Debug, Deserialize)]
struct DirectoryView {
    path: PathBuf,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ConfigView {
    path: PathBuf,
    managed: bool,
    pid: Option<String>,
    factory_pid: Option<String>,
}

#[derive(Tabled)]
struct ModuleRow {
    #[tabled(rename = "id")]
    id: u64,
    #[tabled(rename = "module")]
    identity: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "location")]
    location: String,
}

#[derive(Tabled)]
struct DirectoryRow {
    #[tabled(rename = "directory")]
    path: String,
    #[tabled(rename = "monitoring")]
    monitoring: String,
}

#[derive(Tabled)]
struct ConfigRow {
    #[tabled(rename = "file")]
    file: String,
    #[tabled(rename = "pid")]
    pid: String,
    #[tabled(rename = "factory")]
    factory: String,
}

impl StatusArgs {
    pub fn run(self, base: &Path) -> Result<()> {
        let status = match request_status(base) {
            Ok(status) => status,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = json!({
                    "running": false,
                    "socket": socket_path(base).display().to_string(),
                });
                if self.json {
                    print_json(&payload)?;
                } else {
                    println!("launcher is not running ({})", socket_path(base).display());
                }
                return Ok(());
            }
            Err(err) => return Err(err).context("failed to query launcher status"),
        };

        if self.json {
            return print_json(&status);
        }
        let view: StatusView =
            serde_json::from_value(status).context("unexpected launcher status payload")?;
        print_tables(view);
        Ok(())
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render status JSON")?
    );
    Ok(())
}

fn print_tables(view: StatusView) {
    let settled = view.modules.iter().filter(|m| m.is_settled()).count();
    println!(
        "dropin v{} | {} modules ({} settled) | {} directories | {} configurations",
        env!("CARGO_PKG_VERSION"),
        view.modules.len(),
        settled,
        view.directories.len(),
        view.configurations.len(),
    );

    if view.modules.is_empty() {
        println!("No modules deployed.");
    } else {
        let rows: Vec<ModuleRow> = view
            .modules
            .iter()
            .map(|module| ModuleRow {
                id: module.id.0,
                identity: module.identity.clone(),
                state: state_label(module),
                location: module.location.display().to_string(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    let rows: Vec<DirectoryRow> = view
        .directories
        .into_iter()
        .map(|dir| DirectoryRow {
            path: dir.path.display().to_string(),
            monitoring: match dir.poll_interval_ms {
                Some(ms) => format!("every {ms} ms"),
                None => "provisioned once".to_string(),
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if !view.configurations.is_empty() {
        let rows: Vec<ConfigRow> = view
            .configurations
            .into_iter()
            .map(|config| ConfigRow {
                file: config.path.display().to_string(),
                pid: match (config.managed, config.pid) {
                    (true, Some(pid)) => pid,
                    _ => "not managed".yellow().to_string(),
                },
                factory: config.factory_pid.unwrap_or_default(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }
}

fn state_label(module: &ModuleSnapshot) -> String {
    let label = module.state.to_string();
    match module.state {
        _ if module.is_settled() => label.green().to_string(),
        ModuleState::Uninstalled => label.bright_black().to_string(),
        _ => label.yellow().to_string(),
    }
}
