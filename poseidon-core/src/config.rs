//! Daemon configuration.
//!
//! Loaded from an optional `.poseidon.yaml` at the watch root. The file is a
//! dotfile, so the watcher never syncs it. Command-line flags are applied on
//! top by the binary.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CONFIG_FILE: &str = ".poseidon.yaml";
pub const DEFAULT_PORT: u16 = 23001;
pub const DEFAULT_ORIGIN: &str = "https://playcanvas.com";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// What the translator does when the MIME resolver fails for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeFailurePolicy {
    /// Log the failure and move on to the next queued action.
    #[default]
    Skip,
    /// Hold the queue on the failed action until the connection drops.
    Stall,
}

impl FromStr for MimeFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "stall" => Ok(Self::Stall),
            other => Err(format!(
                "unknown mime failure policy '{other}'; expected: skip, stall"
            )),
        }
    }
}

impl fmt::Display for MimeFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MimeFailurePolicy::Skip => write!(f, "skip"),
            MimeFailurePolicy::Stall => write!(f, "stall"),
        }
    }
}

/// Filesystem watcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Use the polling backend instead of native notifications.
    pub poll: bool,
    pub poll_interval_ms: u64,
    /// Enqueue every existing file as `Created` when watching (re)starts.
    pub initial_sync: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll: false,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            initial_sync: true,
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// PEM certificate chain and private key for serving over TLS.
///
/// Relative paths in `.poseidon.yaml` resolve against the watch root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl TlsConfig {
    fn resolve_against(&mut self, root: &Path) {
        self.cert = root.join(&self.cert);
        self.key = root.join(&self.key);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub port: u16,
    pub bind: IpAddr,
    /// Origins allowed to open the client connection.
    pub allowed_origins: Vec<String>,
    /// Forwarded verbatim to the client as `settings:reloadOnChange`.
    pub window_path: Option<String>,
    pub reload_on_change: bool,
    pub watch: WatchConfig,
    pub mime_failure: MimeFailurePolicy,
    pub json_logs: bool,
    /// Serve over TLS when set; plain HTTP otherwise.
    pub tls: Option<TlsConfig>,
    /// Watch root; set by [`DaemonConfig::load_at`], never read from the file.
    #[serde(skip)]
    pub root: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            allowed_origins: vec![DEFAULT_ORIGIN.to_string()],
            window_path: None,
            reload_on_change: true,
            watch: WatchConfig::default(),
            mime_failure: MimeFailurePolicy::default(),
            json_logs: false,
            tls: None,
            root: PathBuf::from("."),
        }
    }
}

impl DaemonConfig {
    /// Load `<root>/.poseidon.yaml`, falling back to defaults when absent.
    ///
    /// The returned config carries the canonicalized `root`.
    ///
    /// # Errors
    /// [`ConfigError::InvalidRoot`] if `root` is not a directory,
    /// [`ConfigError::Parse`] if the file exists but is malformed.
    pub fn load_at(root: &Path) -> Result<Self, ConfigError> {
        if !root.is_dir() {
            return Err(ConfigError::InvalidRoot {
                path: root.to_path_buf(),
            });
        }
        let root = root.canonicalize().map_err(|source| ConfigError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        let path = root.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            Self::from_yaml(&contents).map_err(|source| ConfigError::Parse { path, source })?
        } else {
            Self::default()
        };

        if let Some(tls) = config.tls.as_mut() {
            tls.resolve_against(&root);
        }
        config.root = root;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes to unit, not a mapping.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed.eq_ignore_ascii_case(origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = DaemonConfig::default();
        assert_eq!(config.port, 23001);
        assert_eq!(config.allowed_origins, vec!["https://playcanvas.com"]);
        assert!(config.reload_on_change);
        assert!(config.watch.initial_sync);
        assert_eq!(config.mime_failure, MimeFailurePolicy::Skip);
        assert_eq!(config.tls, None);
    }

    #[test]
    fn tls_section_needs_both_paths() {
        let config =
            DaemonConfig::from_yaml("tls:\n  cert: certs/dev.crt\n  key: certs/dev.key\n")
                .expect("parse");
        let tls = config.tls.expect("tls");
        assert_eq!(tls.cert, PathBuf::from("certs/dev.crt"));
        assert_eq!(tls.key, PathBuf::from("certs/dev.key"));

        assert!(DaemonConfig::from_yaml("tls:\n  cert: certs/dev.crt\n").is_err());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = DaemonConfig::from_yaml("port: 4000\nwatch:\n  poll: true\n").expect("parse");
        assert_eq!(config.port, 4000);
        assert!(config.watch.poll);
        assert_eq!(config.watch.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.allowed_origins, vec![DEFAULT_ORIGIN]);
    }

    #[test]
    fn mime_policy_parses_case_insensitively() {
        assert_eq!("Stall".parse::<MimeFailurePolicy>(), Ok(MimeFailurePolicy::Stall));
        assert!("retry".parse::<MimeFailurePolicy>().is_err());
    }

    #[test]
    fn wildcard_origin_allows_anything() {
        let config = DaemonConfig {
            allowed_origins: vec!["*".to_string()],
            ..DaemonConfig::default()
        };
        assert!(config.is_origin_allowed("https://example.com"));
    }
}
