//! `gitmirror status`: query `/health` of a running server.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::{json, Value};

use gitmirror_core::config::{self, DEFAULT_CONFIG_PATH};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let cfg = config::load_at(&self.config)
            .with_context(|| format!("failed to load {}", self.config.display()))?;
        let url = health_url(cfg.webhook_port);

        let health = fetch_health(&url);
        if self.json {
            let payload = match &health {
                Some(report) => report.clone(),
                None => json!({ "running": false, "url": url }),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render status JSON")?
            );
            return Ok(());
        }

        match health {
            Some(report) => print_report(&report),
            None => println!("{} server is not running ({url})", "✗".red()),
        }
        Ok(())
    }
}

pub(crate) fn health_url(webhook_port: u16) -> String {
    format!("http://127.0.0.1:{webhook_port}/health")
}

pub(crate) fn fetch_health(url: &str) -> Option<Value> {
    let agent = ureq::AgentBuilder::new().timeout(HEALTH_TIMEOUT).build();
    agent.get(url).call().ok()?.into_json().ok()
}

fn print_report(report: &Value) {
    let field = |v: &Value| v.as_str().unwrap_or("-").to_string();
    println!(
        "{} {} (version {}, up {})",
        "✓".green(),
        field(&report["status"]).bold(),
        field(&report["version"]),
        field(&report["uptime"])
    );
    println!("  repository:   {}", field(&report["repo"]["url"]));
    println!(
        "  partition:    {} at {}",
        field(&report["repo"]["partition"]),
        field(&report["repo"]["active_path"])
    );
    let exists = report["repoExists"].as_bool().unwrap_or(false);
    println!(
        "  checkout:     {}",
        if exists { "present".green() } else { "missing".red() }
    );
    println!("  serving from: {}", field(&report["content_root"]));
    println!("  started at:   {}", field(&report["started_at"]));
}
