//! Wire messages exchanged with the remote client.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{CorrelationId, PendingRequest, RequestKind, SemanticType};

/// Daemon → client messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundMessage {
    #[serde(rename = "file:updated")]
    FileUpdated(FileUpdated),
    #[serde(rename = "file:removed")]
    FileRemoved(FileRemoved),
    #[serde(rename = "folder:removed")]
    FolderRemoved(FolderRemoved),
    #[serde(rename = "settings:reloadOnChange")]
    ReloadOnChange(ReloadOnChange),
}

impl OutboundMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundMessage::FileUpdated(_) => "file:updated",
            OutboundMessage::FileRemoved(_) => "file:removed",
            OutboundMessage::FolderRemoved(_) => "folder:removed",
            OutboundMessage::ReloadOnChange(_) => "settings:reloadOnChange",
        }
    }

    /// Correlation id carried by request messages; `None` for settings.
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        match self {
            OutboundMessage::FileUpdated(m) => Some(&m.id),
            OutboundMessage::FileRemoved(m) => Some(&m.id),
            OutboundMessage::FolderRemoved(m) => Some(&m.id),
            OutboundMessage::ReloadOnChange(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpdated {
    pub id: CorrelationId,
    /// Directory part of the path.
    pub path: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub file_type: SemanticType,
    pub mimetype: String,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRemoved {
    pub id: CorrelationId,
    pub path: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub file_type: SemanticType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRemoved {
    pub id: CorrelationId,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadOnChange {
    #[serde(rename = "windowPath")]
    pub window_path: String,
    pub state: bool,
}

/// Client → daemon frame. Only acknowledgments carry meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl InboundMessage {
    pub fn ack(id: &CorrelationId) -> Self {
        Self {
            event: id.ack_event(),
            data: None,
        }
    }

    /// The correlation id this frame acknowledges, if it is `file:<id>`.
    pub fn acknowledged_id(&self) -> Option<CorrelationId> {
        self.event
            .strip_prefix("file:")
            .filter(|id| !id.is_empty())
            .map(CorrelationId::from)
    }
}

/// Error for a [`PendingRequest`] missing a field its kind requires.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?} request {id} is missing `{field}`")]
pub struct IncompleteRequest {
    pub id: CorrelationId,
    pub kind: RequestKind,
    pub field: &'static str,
}

impl TryFrom<&PendingRequest> for OutboundMessage {
    type Error = IncompleteRequest;

    fn try_from(request: &PendingRequest) -> Result<Self, Self::Error> {
        let missing = |field| IncompleteRequest {
            id: request.id.clone(),
            kind: request.kind,
            field,
        };

        match request.kind {
            RequestKind::Update => Ok(OutboundMessage::FileUpdated(FileUpdated {
                id: request.id.clone(),
                path: request.directory.clone(),
                filename: request.filename.clone(),
                file_type: request.file_type.ok_or_else(|| missing("file_type"))?,
                mimetype: request.mime_type.clone().ok_or_else(|| missing("mime_type"))?,
                contents: request.contents.clone().ok_or_else(|| missing("contents"))?,
            })),
            RequestKind::Remove => Ok(OutboundMessage::FileRemoved(FileRemoved {
                id: request.id.clone(),
                path: request.directory.clone(),
                filename: request.filename.clone(),
                file_type: request.file_type.ok_or_else(|| missing("file_type"))?,
            })),
            RequestKind::RemoveFolder => Ok(OutboundMessage::FolderRemoved(FolderRemoved {
                id: request.id.clone(),
                path: request.directory.clone(),
            })),
        }
    }
}
