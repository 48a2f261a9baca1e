//! `poseidon status` — query a running daemon over HTTP.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::{json, Value};

use poseidon_core::config::DEFAULT_PORT;
use poseidon_core::DaemonConfig;

/// Arguments for `poseidon status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Daemon port; defaults to the port configured for the current directory.
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let port = self.port.unwrap_or_else(|| {
            DaemonConfig::load_at(Path::new("."))
                .map(|config| config.port)
                .unwrap_or(DEFAULT_PORT)
        });
        let url = format!("http://{}:{port}/status", self.host);

        let status = fetch_status(&url).unwrap_or_else(|err| {
            json!({
                "running": false,
                "url": url,
                "error": format!("{err:#}"),
            })
        });

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("failed to render status JSON")?
            );
        } else {
            print!("{}", render_summary(&status));
        }
        Ok(())
    }
}

fn fetch_status(url: &str) -> Result<Value> {
    let response = ureq::get(url)
        .timeout(Duration::from_secs(2))
        .call()
        .with_context(|| format!("no daemon answering at {url}"))?;
    response
        .into_json::<Value>()
        .context("daemon returned malformed status")
}

fn render_summary(status: &Value) -> String {
    if status["running"] != json!(true) {
        return format!(
            "{} {}\n",
            "■".bright_black().bold(),
            "daemon is not running".bold()
        );
    }

    let client = match status["connection_id"].as_u64() {
        Some(id) if status["connected"] == json!(true) => format!("connected (#{id})").green(),
        _ => "waiting for client".yellow(),
    };
    let mut out = format!(
        "{} {} {}\n",
        "■".green().bold(),
        "poseidon".bold(),
        status["version"].as_str().unwrap_or("?")
    );
    out.push_str(&format!(
        "  root       {}\n",
        status["watch_root"].as_str().unwrap_or("?")
    ));
    out.push_str(&format!("  client     {client}\n"));
    out.push_str(&format!(
        "  queued     {}\n",
        status["queued"].as_u64().unwrap_or(0)
    ));
    out.push_str(&format!(
        "  in flight  {}\n",
        status["outstanding"].as_u64().unwrap_or(0)
    ));
    out
}
