//! Error types for poseidon-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading daemon configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure reading the config file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error — includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The watch root does not exist or is not a directory.
    #[error("watch root is not a directory: {path}")]
    InvalidRoot { path: PathBuf },
}
