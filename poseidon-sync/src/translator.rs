//! Event translation: one queued action → at most one acknowledged request.
//!
//! | event       | eligibility      | message          |
//! |-------------|------------------|------------------|
//! | Created     | extension table  | `file:updated`   |
//! | Modified    | extension table  | `file:updated`   |
//! | Removed     | extension table  | `file:removed`   |
//! | RemovedDir  | always           | `folder:removed` |
//!
//! Contents are read fresh for every action; two identical modifications
//! produce two round trips.

use std::path::{Path, PathBuf};

use poseidon_core::classify::{classify, split_path, to_wire_path};
use poseidon_core::{
    ChangeKind, CorrelationId, CorrelationIds, MimeFailurePolicy, PendingRequest, QueuedAction,
    RequestKind, SemanticType,
};

use crate::connection::{AckOutcome, AckWait, Connection};
use crate::mime::MimeResolver;

/// Why an action produced no network traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Extension not in the allow-list.
    Ineligible,
    /// File read back empty.
    Empty,
    /// File missing, unreadable, or not UTF-8.
    Unreadable,
    /// MIME resolution failed under [`MimeFailurePolicy::Skip`].
    MimeUnresolved,
}

/// How a single translation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    Skipped(SkipReason),
    Acknowledged(CorrelationId),
    /// The connection dropped while the request awaited its acknowledgment.
    Abandoned,
    /// The connection dropped before the request went out. The action is
    /// still owed to the next connection.
    Retry,
}

#[derive(Debug)]
pub struct EventTranslator<M> {
    root: PathBuf,
    mime: M,
    mime_failure: MimeFailurePolicy,
    ids: CorrelationIds,
}

impl<M: MimeResolver> EventTranslator<M> {
    pub fn new(root: impl Into<PathBuf>, mime: M, mime_failure: MimeFailurePolicy) -> Self {
        Self {
            root: root.into(),
            mime,
            mime_failure,
            ids: CorrelationIds::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Translate `action` over `connection`, returning once the request is
    /// acknowledged, abandoned, or skipped.
    pub async fn translate(&self, action: &QueuedAction, connection: &Connection) -> Translation {
        let path = action.event.path.as_path();
        match action.event.kind {
            ChangeKind::Created | ChangeKind::Modified => self.upload(path, connection).await,
            ChangeKind::Removed => self.remove_file(path, connection).await,
            ChangeKind::RemovedDir => self.remove_folder(path, connection).await,
        }
    }

    async fn upload(&self, path: &Path, connection: &Connection) -> Translation {
        let Some(file_type) = classify(path).semantic_type() else {
            return Translation::Skipped(SkipReason::Ineligible);
        };

        let absolute = self.root.join(path);
        let contents = match tokio::fs::read_to_string(&absolute).await {
            Ok(contents) if contents.is_empty() => {
                return Translation::Skipped(SkipReason::Empty);
            }
            Ok(contents) => contents,
            Err(err) => {
                tracing::debug!(path = %absolute.display(), error = %err, "skipping unreadable file");
                return Translation::Skipped(SkipReason::Unreadable);
            }
        };

        let mime_type = match self.mime.resolve(&absolute).await {
            Ok(mime_type) => mime_type,
            Err(err) => return self.mime_failed(err, connection).await,
        };

        let (directory, filename) = split_path(path);
        let request = PendingRequest {
            id: self.ids.mint(path, RequestKind::Update),
            kind: RequestKind::Update,
            directory,
            filename: filename.clone(),
            file_type: Some(file_type),
            mime_type: Some(mime_type),
            contents: Some(contents),
        };
        let wait = match send(&request, connection) {
            Ok(wait) => wait,
            Err(outcome) => return outcome,
        };
        tracing::info!(
            connection = connection.id(),
            file = %filename,
            "file {filename} was edited, uploading changes...",
        );
        let outcome = await_ack(&request, wait).await;
        if let Translation::Acknowledged(_) = outcome {
            tracing::info!(
                connection = connection.id(),
                file = %filename,
                "{filename} was successfully uploaded.",
            );
        }
        outcome
    }

    async fn remove_file(&self, path: &Path, connection: &Connection) -> Translation {
        let Some(file_type) = classify(path).semantic_type() else {
            return Translation::Skipped(SkipReason::Ineligible);
        };

        let (directory, filename) = split_path(path);
        let request = removal(
            self.ids.mint(path, RequestKind::Remove),
            directory,
            filename.clone(),
            file_type,
        );
        let wait = match send(&request, connection) {
            Ok(wait) => wait,
            Err(outcome) => return outcome,
        };
        tracing::info!(
            connection = connection.id(),
            file = %filename,
            "file {filename} was removed, uploading changes...",
        );
        let outcome = await_ack(&request, wait).await;
        if let Translation::Acknowledged(_) = outcome {
            tracing::info!(connection = connection.id(), file = %filename, "{filename} was deleted.");
        }
        outcome
    }

    async fn remove_folder(&self, path: &Path, connection: &Connection) -> Translation {
        let wire_path = to_wire_path(path);
        let request = PendingRequest {
            id: self.ids.mint(path, RequestKind::RemoveFolder),
            kind: RequestKind::RemoveFolder,
            directory: wire_path.clone(),
            filename: String::new(),
            file_type: None,
            mime_type: None,
            contents: None,
        };
        let wait = match send(&request, connection) {
            Ok(wait) => wait,
            Err(outcome) => return outcome,
        };
        tracing::info!(
            connection = connection.id(),
            path = %wire_path,
            "path {wire_path} was removed, uploading changes...",
        );
        let outcome = await_ack(&request, wait).await;
        if let Translation::Acknowledged(_) = outcome {
            tracing::info!(connection = connection.id(), path = %wire_path, "{wire_path} was deleted.");
        }
        outcome
    }

    async fn mime_failed(
        &self,
        err: crate::error::MimeError,
        connection: &Connection,
    ) -> Translation {
        match self.mime_failure {
            MimeFailurePolicy::Skip => {
                tracing::error!(error = %err, "mime resolution failed, skipping");
                Translation::Skipped(SkipReason::MimeUnresolved)
            }
            MimeFailurePolicy::Stall => {
                tracing::error!(error = %err, "mime resolution failed, holding queue until disconnect");
                connection.severed().await;
                Translation::Abandoned
            }
        }
    }
}

/// Register and send `request`. A connection severed before the send yields
/// [`Translation::Retry`].
fn send(request: &PendingRequest, connection: &Connection) -> Result<AckWait, Translation> {
    connection.request(request).map_err(|err| {
        if connection.is_severed() {
            tracing::debug!(id = %request.id, error = %err, "connection gone before send, retrying");
            Translation::Retry
        } else {
            tracing::warn!(id = %request.id, error = %err, "request not sent");
            Translation::Abandoned
        }
    })
}

async fn await_ack(request: &PendingRequest, wait: AckWait) -> Translation {
    match wait.wait().await {
        AckOutcome::Acknowledged => Translation::Acknowledged(request.id.clone()),
        AckOutcome::Abandoned => {
            tracing::debug!(id = %request.id, "request abandoned by disconnect");
            Translation::Abandoned
        }
    }
}

fn removal(
    id: CorrelationId,
    directory: String,
    filename: String,
    file_type: SemanticType,
) -> PendingRequest {
    PendingRequest {
        id,
        kind: RequestKind::Remove,
        directory,
        filename,
        file_type: Some(file_type),
        mime_type: None,
        contents: None,
    }
}
