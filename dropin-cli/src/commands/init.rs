//! `dropin init`: lay out a base directory.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use dropin_core::{config, LauncherConfig};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Deploy interactive-console modules from the core directory.
    #[arg(long)]
    pub interactive: bool,

    /// Poll the runtime directory instead of provisioning it once.
    #[arg(long)]
    pub watch_runtime: bool,

    /// Overwrite an existing configuration file.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self, base: &Path) -> Result<()> {
        let path = config::config_path_at(base);
        if path.exists() && !self.force {
            anyhow::bail!(
                "{} already exists; pass --force to overwrite it",
                path.display()
            );
        }

        let config = LauncherConfig {
            interactive: self.interactive,
            watch_runtime: self.watch_runtime,
            ..LauncherConfig::default()
        };
        for dir in [
            config.core_dir_at(base),
            config.runtime_dir_at(base),
            config.application_dir_at(base),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let path = config::save_at(base, &config).context("failed to write configuration")?;

        println!("✓ Initialized launcher in {}", base.display());
        println!("  Configuration: {}", path.display());
        Ok(())
    }
}
