//! Positioning engine: lock registry, position math, reorder and delete
//! orchestration.
//!
//! # Responsibility
//! - Turn create/move/delete/renumber requests into lock-guarded, single
//!   atomic store writes.
//!
//! # Invariants
//! - Positions are only computed while the owning sibling set is locked.
//! - Parents are re-validated under lock before anything is written.

pub mod compactor;
pub mod lock;
pub mod position;
pub mod reorder;

use crate::error::{HierarchyError, HierarchyResult};
use crate::model::hierarchy::{EntityKind, SiblingSetKey};
use crate::repo::hierarchy_repo::HierarchyStore;

/// Fails with `NotFound` when the parent row of `key` does not exist.
///
/// Board sets are keyed by an external owner id and always exist.
pub(crate) fn ensure_parent_exists<S: HierarchyStore + ?Sized>(
    store: &S,
    key: SiblingSetKey,
) -> HierarchyResult<()> {
    let Some(parent_kind) = key.kind.parent_kind() else {
        return Ok(());
    };
    match store.get_entry(parent_kind, key.parent_uuid)? {
        Some(_) => Ok(()),
        None => Err(HierarchyError::not_found(
            parent_kind.as_str(),
            key.parent_uuid,
        )),
    }
}

/// Child sets owned by one entity: the cards of a list, the lists of a board.
pub(crate) fn child_key(kind: EntityKind, uuid: uuid::Uuid) -> Option<SiblingSetKey> {
    kind.child_kind()
        .map(|child_kind| SiblingSetKey::new(child_kind, uuid))
}
