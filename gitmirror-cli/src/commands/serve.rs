//! `gitmirror serve`: run the daemon in the foreground.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use gitmirror_core::config::DEFAULT_CONFIG_PATH;
use gitmirror_daemon::{start_blocking, ServeOptions};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Configuration file; created from defaults and environment if missing.
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Emit log lines as JSON objects.
    #[arg(long)]
    pub json_logs: bool,

    /// Seconds a retired content listener may keep draining.
    #[arg(long, default_value_t = 5)]
    pub grace_secs: u64,
}

impl ServeArgs {
    pub fn run(self) -> Result<()> {
        let mut options = ServeOptions::new(&self.config);
        options.json_logs = self.json_logs;
        options.grace_period = std::time::Duration::from_secs(self.grace_secs);
        start_blocking(options).context("server exited with error")
    }
}
