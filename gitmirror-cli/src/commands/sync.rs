//! `gitmirror sync`: one-shot update of the active partition.
//!
//! The update rewrites the active checkout in place (large-file mode replaces
//! it outright), so it refuses to run while a server answers on the
//! configured notification port.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use gitmirror_core::config::{self, DEFAULT_CONFIG_PATH};
use gitmirror_sync::{bootstrap, BootstrapAction, SyncOutcome};

use super::status::{fetch_health, health_url};

#[derive(Args, Debug)]
pub struct SyncArgs {
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Sync even though a server appears to be running.
    #[arg(long)]
    pub force: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        gitmirror_daemon::init_console_tracing();

        let cfg = config::load_at(&self.config)
            .with_context(|| format!("failed to load {}; run `gitmirror init` first", self.config.display()))?;
        cfg.validate().context("invalid configuration")?;

        let url = health_url(cfg.webhook_port);
        if !self.force && fetch_health(&url).is_some() {
            bail!(
                "a gitmirror server is running ({url}); send it a notification instead, or pass --force"
            );
        }

        let partitions = cfg.partitions();
        let action = bootstrap(&cfg.source(), &partitions, true)
            .with_context(|| format!("failed to sync {}", partitions.active_path().display()))?;

        let path = partitions.active_path().display();
        match action {
            BootstrapAction::Cloned(head) => {
                println!("{} cloned into {path}: {head}", "✓".green())
            }
            BootstrapAction::Pulled { outcome: SyncOutcome::UpToDate, .. } => {
                println!("{} {path} is already up to date", "✓".green())
            }
            BootstrapAction::Pulled { repaired, .. } => {
                let how = if repaired { " (re-cloned)" } else { "" };
                println!("{} updated {path}{how}", "✓".green())
            }
            BootstrapAction::Skipped => println!("{path} left unchanged"),
        }
        Ok(())
    }
}
