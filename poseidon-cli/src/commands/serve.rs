//! Default mode: load config, apply flag overrides, run the daemon.

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use poseidon_core::{DaemonConfig, MimeFailurePolicy, TlsConfig};
use poseidon_daemon::start_blocking;

/// Flags override values from `<root>/.poseidon.yaml`.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Directory to watch.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Port to listen on.
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Address to bind.
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Origin allowed to connect; repeatable. Replaces the configured list.
    #[arg(long = "allow-origin", value_name = "ORIGIN")]
    pub allow_origins: Vec<String>,

    /// Window path sent to the client in `settings:reloadOnChange`.
    #[arg(long)]
    pub window_path: Option<String>,

    /// Tell the client not to reload on change.
    #[arg(long)]
    pub no_reload: bool,

    /// Use the polling watcher instead of native notifications.
    #[arg(long)]
    pub poll: bool,

    #[arg(long, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Do not upload existing files when a client connects.
    #[arg(long)]
    pub no_initial_sync: bool,

    /// What to do when a file's MIME type cannot be resolved: skip or stall.
    #[arg(long, value_name = "POLICY")]
    pub mime_failure: Option<MimeFailurePolicy>,

    /// PEM certificate chain; serves over TLS together with `--tls-key`.
    #[arg(long, value_name = "FILE", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key for `--tls-cert`.
    #[arg(long, value_name = "FILE", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,
}

impl ServeArgs {
    pub fn run(self) -> Result<()> {
        let config = self.load_config()?;
        start_blocking(config).context("daemon exited with error")
    }

    pub fn load_config(&self) -> Result<DaemonConfig> {
        let mut config = DaemonConfig::load_at(&self.root)
            .with_context(|| format!("failed to load config for {}", self.root.display()))?;
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut DaemonConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if !self.allow_origins.is_empty() {
            config.allowed_origins = self.allow_origins.clone();
        }
        if let Some(window_path) = &self.window_path {
            config.window_path = Some(window_path.clone());
        }
        if self.no_reload {
            config.reload_on_change = false;
        }
        if self.poll {
            config.watch.poll = true;
        }
        if let Some(interval) = self.poll_interval_ms {
            config.watch.poll_interval_ms = interval;
        }
        if self.no_initial_sync {
            config.watch.initial_sync = false;
        }
        if let Some(policy) = self.mime_failure {
            config.mime_failure = policy;
        }
        if let (Some(cert), Some(key)) = (&self.tls_cert, &self.tls_key) {
            config.tls = Some(TlsConfig {
                cert: cert.clone(),
                key: key.clone(),
            });
        }
        if self.json_logs {
            config.json_logs = true;
        }
    }
}
