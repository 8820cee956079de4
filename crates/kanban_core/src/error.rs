//! Caller-facing error taxonomy of the hierarchy API.
//!
//! # Invariants
//! - `NotFound` and `InvalidArgument` are caller errors: nothing was written.
//! - `Busy` is the only retryable variant: nothing was written.
//! - `Storage` means the store rejected the one atomic write; nothing was
//!   written.
//! - `Blob` means attachment bytes could not be stored or read. A failed
//!   store leaves no metadata row behind.

use crate::engine::lock::LockError;
use crate::repo::hierarchy_repo::StoreError;
use crate::service::collaborators::BlobError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type HierarchyResult<T> = Result<T, HierarchyError>;

#[derive(Debug)]
pub enum HierarchyError {
    /// Referenced entity, parent or attachment is absent.
    NotFound { kind: &'static str, uuid: Uuid },
    /// Missing or malformed input.
    InvalidArgument(String),
    /// A sibling-set lock could not be acquired in bounded time.
    Busy(LockError),
    /// Underlying persistence failure.
    Storage(StoreError),
    /// Attachment bytes could not be stored or read.
    Blob(BlobError),
}

impl HierarchyError {
    pub(crate) fn not_found(kind: &'static str, uuid: Uuid) -> Self {
        Self::NotFound { kind, uuid }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Whether the caller may retry the same request with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_))
    }

    /// Stable machine-readable code for logs and outer layers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Busy(_) => "busy",
            Self::Storage(_) | Self::Blob(_) => "storage_failure",
        }
    }
}

impl Display for HierarchyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { kind, uuid } => write!(f, "{kind} not found: {uuid}"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::Busy(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "storage failure: {err}"),
            Self::Blob(err) => write!(f, "storage failure: {err}"),
        }
    }
}

impl Error for HierarchyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Busy(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::Blob(err) => Some(err),
            Self::NotFound { .. } | Self::InvalidArgument(_) => None,
        }
    }
}

impl From<LockError> for HierarchyError {
    fn from(value: LockError) -> Self {
        Self::Busy(value)
    }
}

impl From<BlobError> for HierarchyError {
    fn from(value: BlobError) -> Self {
        Self::Blob(value)
    }
}

impl From<StoreError> for HierarchyError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::RowNotFound { kind, uuid } => Self::NotFound { kind, uuid },
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::HierarchyError;
    use crate::engine::lock::LockError;
    use crate::model::hierarchy::SiblingSetKey;
    use crate::repo::hierarchy_repo::StoreError;
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn only_busy_is_retryable() {
        let busy = HierarchyError::from(LockError::Timeout {
            key: SiblingSetKey::cards_of(Uuid::nil()),
            waited: Duration::from_millis(5),
        });
        assert!(busy.is_retryable());
        assert_eq!(busy.code(), "busy");

        let invalid = HierarchyError::invalid("title is required");
        assert!(!invalid.is_retryable());
        assert_eq!(invalid.code(), "invalid_argument");
    }

    #[test]
    fn missing_row_maps_to_not_found() {
        let uuid = Uuid::new_v4();
        let err = HierarchyError::from(StoreError::RowNotFound { kind: "card", uuid });
        assert!(matches!(err, HierarchyError::NotFound { kind: "card", uuid: id } if id == uuid));

        let err = HierarchyError::from(StoreError::Poisoned);
        assert_eq!(err.code(), "storage_failure");
    }
}
