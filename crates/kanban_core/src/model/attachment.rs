//! Card attachment metadata.
//!
//! File bytes live behind the `BlobStore` collaborator; this record only
//! keeps the storage path and descriptive fields.

use crate::model::hierarchy::EntityId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AttachmentId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub uuid: AttachmentId,
    pub card_uuid: EntityId,
    /// Generated storage file name, e.g. `<uuid>.png`.
    pub filename: String,
    /// Client supplied file name.
    pub original_name: String,
    pub mime_type: String,
    /// Blob storage path, e.g. `attachments/<uuid>.png`.
    pub path: String,
    pub size: i64,
    /// Epoch ms.
    pub created_at: i64,
}

/// Insert payload for attachment metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttachment {
    pub uuid: AttachmentId,
    pub card_uuid: EntityId,
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub path: String,
    pub size: i64,
}
