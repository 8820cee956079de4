//! Card attachment use-cases.
//!
//! # Responsibility
//! - Validate uploads, write bytes through the blob store and record
//!   attachment metadata against an existing card.
//!
//! # Invariants
//! - Only `image/*` mime types are accepted.
//! - Bytes are stored before the metadata row; a failed row insert removes
//!   the blob again (best-effort).
//! - Blob paths are `attachments/<uuid>.<ext>` and never derived from the
//!   client-supplied file name.

use crate::error::{HierarchyError, HierarchyResult};
use crate::model::attachment::{Attachment, AttachmentId, NewAttachment};
use crate::model::hierarchy::{EntityId, EntityKind};
use crate::repo::hierarchy_repo::HierarchyStore;
use crate::service::collaborators::BlobStore;
use crate::service::hierarchy_api::HierarchyApi;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Lifetime of attachment URLs when the caller has no preference.
pub const DEFAULT_URL_EXPIRY: Duration = Duration::from_secs(15 * 60);

const ATTACHMENT_PREFIX: &str = "attachments";
const MAX_ORIGINAL_NAME_CHARS: usize = 255;

static IMAGE_MIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^image/([a-z0-9][a-z0-9.+-]*)$").expect("valid image mime regex")
});

/// Short-lived read access to one attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentUrl {
    pub url: String,
    /// Expiry in epoch milliseconds.
    pub expires_at: i64,
}

impl<S: HierarchyStore> HierarchyApi<S> {
    /// Stores `bytes` for `card_uuid` and records the attachment.
    pub fn attach_file(
        &self,
        card_uuid: EntityId,
        original_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> HierarchyResult<Attachment> {
        let blobs = self.require_blobs()?;
        let original_name = normalize_original_name(original_name)?;
        let (mime_type, extension) = parse_image_mime(mime_type)?;
        if bytes.is_empty() {
            return Err(HierarchyError::invalid("attachment must not be empty"));
        }
        let size = i64::try_from(bytes.len())
            .map_err(|_| HierarchyError::invalid("attachment is too large"))?;
        self.get_card(card_uuid)?;

        let uuid = Uuid::new_v4();
        let filename = format!("{uuid}.{extension}");
        let path = format!("{ATTACHMENT_PREFIX}/{filename}");
        blobs.put(&path, bytes)?;

        let record = NewAttachment {
            uuid,
            card_uuid,
            filename,
            original_name,
            mime_type,
            path,
            size,
        };
        match self.store().insert_attachment(&record) {
            Ok(attachment) => {
                info!(
                    "event=attachment_upload module=service status=ok card={} attachment={} size={}",
                    card_uuid, uuid, size
                );
                self.record_op("attachment_upload");
                Ok(attachment)
            }
            Err(err) => {
                self.discard_blobs(std::slice::from_ref(&record.path));
                warn!(
                    "event=attachment_upload module=service status=error card={} error={}",
                    card_uuid, err
                );
                // The card may have been deleted between the check and the insert.
                if self.store().get_card(card_uuid)?.is_none() {
                    return Err(HierarchyError::not_found(
                        EntityKind::Card.as_str(),
                        card_uuid,
                    ));
                }
                Err(err.into())
            }
        }
    }

    pub fn get_attachment(&self, uuid: AttachmentId) -> HierarchyResult<Attachment> {
        self.store()
            .get_attachment(uuid)?
            .ok_or_else(|| HierarchyError::not_found("attachment", uuid))
    }

    /// Attachments of one card, oldest first.
    pub fn list_attachments(&self, card_uuid: EntityId) -> HierarchyResult<Vec<Attachment>> {
        self.get_card(card_uuid)?;
        Ok(self.store().list_attachments(card_uuid)?)
    }

    /// Signed/temporary URL for one attachment.
    pub fn attachment_url(
        &self,
        uuid: AttachmentId,
        expiry: Duration,
    ) -> HierarchyResult<AttachmentUrl> {
        if expiry.is_zero() {
            return Err(HierarchyError::invalid("url expiry must be positive"));
        }
        let blobs = self.require_blobs()?;
        let attachment = self.get_attachment(uuid)?;
        let url = blobs.temporary_url(&attachment.path, expiry)?;
        let expires_at = SystemTime::now()
            .checked_add(expiry)
            .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
            .and_then(|since| i64::try_from(since.as_millis()).ok())
            .unwrap_or(i64::MAX);
        Ok(AttachmentUrl { url, expires_at })
    }

    /// Streams the stored bytes of one attachment.
    pub fn open_attachment(&self, uuid: AttachmentId) -> HierarchyResult<Box<dyn Read + Send>> {
        let blobs = self.require_blobs()?;
        let attachment = self.get_attachment(uuid)?;
        Ok(blobs.read_stream(&attachment.path)?)
    }

    /// Removes the metadata row, then the blob (best-effort).
    pub fn delete_attachment(&self, uuid: AttachmentId) -> HierarchyResult<()> {
        let attachment = self.get_attachment(uuid)?;
        self.store().delete_attachment(uuid)?;
        self.discard_blobs(std::slice::from_ref(&attachment.path));
        self.record_op("attachment_delete");
        Ok(())
    }

    fn require_blobs(&self) -> HierarchyResult<&Arc<dyn BlobStore>> {
        self.blobs
            .as_ref()
            .ok_or_else(|| HierarchyError::invalid("no blob store configured"))
    }
}

fn normalize_original_name(value: &str) -> HierarchyResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(HierarchyError::invalid("file name must not be blank"));
    }
    if trimmed.chars().count() > MAX_ORIGINAL_NAME_CHARS {
        return Err(HierarchyError::invalid(format!(
            "file name must be at most {MAX_ORIGINAL_NAME_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Returns the normalized mime type and the file extension stored blobs get.
fn parse_image_mime(value: &str) -> HierarchyResult<(String, String)> {
    let normalized = value.trim().to_ascii_lowercase();
    let Some(captures) = IMAGE_MIME_RE.captures(&normalized) else {
        return Err(HierarchyError::invalid("only image files are allowed"));
    };
    let subtype = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let extension = match subtype {
        "jpeg" | "pjpeg" => "jpg".to_string(),
        "svg+xml" => "svg".to_string(),
        "x-icon" | "vnd.microsoft.icon" => "ico".to_string(),
        other => other
            .trim_start_matches("x-")
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect(),
    };
    let extension = if extension.is_empty() {
        "bin".to_string()
    } else {
        extension
    };
    Ok((normalized, extension))
}

#[cfg(test)]
mod tests {
    use super::{normalize_original_name, parse_image_mime};
    use crate::error::HierarchyError;

    #[test]
    fn image_mime_types_map_to_extensions() {
        assert_eq!(
            parse_image_mime("image/jpeg").unwrap(),
            ("image/jpeg".to_string(), "jpg".to_string())
        );
        assert_eq!(parse_image_mime(" Image/PNG ").unwrap().1, "png");
        assert_eq!(parse_image_mime("image/svg+xml").unwrap().1, "svg");
        assert_eq!(parse_image_mime("image/x-portable-bitmap").unwrap().1, "portablebitmap");
    }

    #[test]
    fn non_image_mime_types_are_rejected() {
        for value in ["application/pdf", "text/plain", "image/", "image", ""] {
            let err = parse_image_mime(value).unwrap_err();
            assert!(matches!(err, HierarchyError::InvalidArgument(_)), "{value}");
        }
    }

    #[test]
    fn original_name_is_trimmed_and_required() {
        assert_eq!(normalize_original_name(" cat.png ").unwrap(), "cat.png");
        assert!(normalize_original_name("  ").is_err());
    }
}
