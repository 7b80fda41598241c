//! `gitmirror init [--config <path>] [--force]`

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use gitmirror_core::config::{self, DEFAULT_CONFIG_PATH};
use gitmirror_core::Config;

/// Write a configuration record seeded from environment variables.
#[derive(Args, Debug)]
pub struct InitArgs {
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        if self.config.exists() && !self.force {
            bail!(
                "{} already exists; pass --force to overwrite it",
                self.config.display()
            );
        }

        let cfg = Config::from_env();
        config::save_at(&self.config, &cfg)
            .with_context(|| format!("failed to write {}", self.config.display()))?;

        println!("{} Wrote {}", "✓".green(), self.config.display());
        println!("  repository: {}", cfg.repo_url);
        println!(
            "  partitions: {} / {}",
            cfg.target_path_a.display(),
            cfg.target_path_b.display()
        );
        if cfg.webhook_secret.is_empty() {
            println!(
                "  {} webhook_secret is empty; notifications will not be authenticated",
                "!".yellow()
            );
        }
        Ok(())
    }
}
