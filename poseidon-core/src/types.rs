//! Domain types for the change-to-event pipeline.
//!
//! Paths carried by [`RawEvent`] are watch-root-relative `PathBuf`s; wire
//! representations (`/`-separated strings) are produced only at the edge by
//! [`crate::classify::split_path`] and [`crate::classify::to_wire_path`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::classify::to_wire_path;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Token linking an outbound request to its acknowledgment (`file:<id>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub String);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the inbound event that acknowledges this id.
    pub fn ack_event(&self) -> String {
        format!("file:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Logical file category driving downstream handling on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Script,
    Json,
    Shader,
    Text,
    Html,
    Css,
}

impl SemanticType {
    pub fn as_str(self) -> &'static str {
        match self {
            SemanticType::Script => "script",
            SemanticType::Json => "json",
            SemanticType::Shader => "shader",
            SemanticType::Text => "text",
            SemanticType::Html => "html",
            SemanticType::Css => "css",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of raw filesystem change reported by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    RemovedDir,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Removed => write!(f, "removed"),
            ChangeKind::RemovedDir => write!(f, "removed_dir"),
        }
    }
}

/// What a [`PendingRequest`] asks the remote side to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Update,
    Remove,
    RemoveFolder,
}

impl RequestKind {
    /// Suffix used when minting correlation ids.
    pub fn id_label(self) -> &'static str {
        match self {
            RequestKind::Update => "updated",
            RequestKind::Remove => "removed",
            RequestKind::RemoveFolder => "folder-removed",
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One change emitted by the filesystem watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: ChangeKind,
    /// Watch-root-relative path. Absolute paths are tolerated and joined onto
    /// the root as-is.
    pub path: PathBuf,
}

impl RawEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Created, path)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Modified, path)
    }

    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Removed, path)
    }

    pub fn removed_dir(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::RemovedDir, path)
    }
}

/// A [`RawEvent`] waiting its turn in the change queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedAction {
    /// Arrival order, starting at 1.
    pub sequence: u64,
    pub event: RawEvent,
}

/// A request built by the translator, sent once and retired on acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub id: CorrelationId,
    pub kind: RequestKind,
    pub directory: String,
    pub filename: String,
    pub file_type: Option<SemanticType>,
    pub mime_type: Option<String>,
    pub contents: Option<String>,
}

// ---------------------------------------------------------------------------
// Correlation id minting
// ---------------------------------------------------------------------------

/// Mints `<unix-millis>-<sequence>_<path>_<kind>` ids.
///
/// The sequence is monotonic for the lifetime of the generator, so two ids
/// for the same path and kind minted within one millisecond still differ.
#[derive(Debug, Default)]
pub struct CorrelationIds {
    next: AtomicU64,
}

impl CorrelationIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&self, path: &Path, kind: RequestKind) -> CorrelationId {
        let sequence = self.next.fetch_add(1, Ordering::Relaxed);
        let millis = Utc::now().timestamp_millis();
        CorrelationId(format!(
            "{millis}-{sequence}_{}_{}",
            to_wire_path(path),
            kind.id_label()
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
