//! Cascading deletes and sibling-set renumbering.
//!
//! # Invariants
//! - A delete locks every child set it removes plus the set it leaves, in
//!   global lock order (cards, then lists, then boards).
//! - Deletes leave gaps; only `renumber` closes them.
//! - Renumbering assigns stride multiples in current display order and
//!   resets the set's high-water mark.

use super::lock::{LockError, SiblingLocks};
use super::position::PositionAssigner;
use super::{child_key, ensure_parent_exists};
use crate::error::{HierarchyError, HierarchyResult};
use crate::model::hierarchy::{EntityId, EntityKind, SiblingEntry, SiblingSetKey};
use crate::repo::hierarchy_repo::{DeleteOutcome, HierarchyStore};
use log::{debug, info};
use std::time::Instant;

pub struct DeletionCompactor<'a, S: HierarchyStore + ?Sized> {
    store: &'a S,
    locks: &'a SiblingLocks,
    assigner: PositionAssigner,
    max_attempts: u32,
}

impl<'a, S: HierarchyStore + ?Sized> DeletionCompactor<'a, S> {
    pub fn new(
        store: &'a S,
        locks: &'a SiblingLocks,
        assigner: PositionAssigner,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            locks,
            assigner,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Deletes one entity with all its descendants.
    pub fn delete(&self, kind: EntityKind, uuid: EntityId) -> HierarchyResult<DeleteOutcome> {
        let started_at = Instant::now();
        let mut entry = self.require_entry(kind, uuid)?;

        for _ in 0..self.max_attempts {
            let keys = self.delete_lock_keys(kind, &entry)?;
            let guard = self.locks.lock_sets(&keys)?;

            let current = self.require_entry(kind, uuid)?;
            if current.parent_uuid != entry.parent_uuid {
                entry = current;
                continue;
            }
            // A list created or moved into the board before we queued has
            // a card set we do not hold yet.
            let stale = self
                .delete_lock_keys(kind, &current)?
                .iter()
                .any(|key| !guard.covers(key));
            if stale {
                debug!(
                    "event=entity_delete module=engine status=retry kind={} uuid={} reason=children_changed",
                    kind, uuid
                );
                continue;
            }

            let outcome = self.store.delete_cascade(kind, uuid)?;
            info!(
                "event=entity_delete module=engine status=ok kind={} uuid={} boards={} lists={} cards={} attachments={} duration_ms={}",
                kind,
                uuid,
                outcome.boards_removed,
                outcome.lists_removed,
                outcome.cards_removed,
                outcome.attachment_paths.len(),
                started_at.elapsed().as_millis()
            );
            return Ok(outcome);
        }

        Err(LockError::Contended {
            key: SiblingSetKey::new(kind, entry.parent_uuid),
            attempts: self.max_attempts,
        }
        .into())
    }

    /// Renumbers one set to `stride, 2*stride, ...` in display order.
    ///
    /// Returns the number of members renumbered.
    pub fn renumber(&self, key: SiblingSetKey) -> HierarchyResult<usize> {
        let _guard = self.locks.lock_set(key)?;
        ensure_parent_exists(self.store, key)?;

        let set = self.store.siblings(key)?;
        if set.is_empty() && set.high_water == 0 {
            return Ok(0);
        }
        let assignments = self.assigner.renumbered(&set.ids());
        self.store.reassign_positions(key, &assignments)?;
        debug!(
            "event=set_renumber module=engine status=ok set={} members={}",
            key,
            assignments.len()
        );
        Ok(assignments.len())
    }

    /// Renumbers every non-empty set: owners' boards, boards' lists, lists'
    /// cards. Each set is locked on its own.
    ///
    /// Returns the number of sets renumbered.
    pub fn renumber_all(&self) -> HierarchyResult<usize> {
        let started_at = Instant::now();
        let mut sets = 0;
        for kind in [EntityKind::Board, EntityKind::List, EntityKind::Card] {
            for parent in self.store.sibling_parents(kind)? {
                match self.renumber(SiblingSetKey::new(kind, parent)) {
                    Ok(_) => sets += 1,
                    // Parent deleted since it was listed.
                    Err(HierarchyError::NotFound { .. }) => {}
                    Err(err) => return Err(err),
                }
            }
        }
        info!(
            "event=renumber_all module=engine status=ok sets={} duration_ms={}",
            sets,
            started_at.elapsed().as_millis()
        );
        Ok(sets)
    }

    fn delete_lock_keys(
        &self,
        kind: EntityKind,
        entry: &SiblingEntry,
    ) -> HierarchyResult<Vec<SiblingSetKey>> {
        let mut keys = vec![SiblingSetKey::new(kind, entry.parent_uuid)];
        if let Some(children) = child_key(kind, entry.uuid) {
            keys.push(children);
            if kind == EntityKind::Board {
                for list in self.store.siblings(children)?.members {
                    keys.push(SiblingSetKey::cards_of(list.uuid));
                }
            }
        }
        Ok(keys)
    }

    fn require_entry(&self, kind: EntityKind, uuid: EntityId) -> HierarchyResult<SiblingEntry> {
        self.store
            .get_entry(kind, uuid)?
            .ok_or_else(|| HierarchyError::not_found(kind.as_str(), uuid))
    }
}
