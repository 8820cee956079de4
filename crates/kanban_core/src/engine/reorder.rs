//! Index-based reorder and cross-parent move orchestration.
//!
//! # Responsibility
//! - Resolve the moved entity and its destination, lock source and
//!   destination sets, compute the new position and persist it in one
//!   store call.
//! - Append new members to a locked set (creation path).
//!
//! # Invariants
//! - Validation failures return before any lock is requested.
//! - The entity lands at the requested index of the destination, counted
//!   without the entity itself, clamped into `[0, len]`.
//! - Source and destination sets are both held across read, compute and
//!   write; a stale read (entity changed parent while queued) is retried
//!   with the fresh parent, up to the configured attempt budget.

use super::ensure_parent_exists;
use super::lock::{LockError, SiblingLocks};
use super::position::{PositionAssigner, Slot};
use crate::error::{HierarchyError, HierarchyResult};
use crate::model::hierarchy::{EntityId, EntityKind, SiblingEntry, SiblingSetKey};
use crate::repo::hierarchy_repo::{HierarchyStore, Placement, PositionUpdate, StoreResult};
use log::{debug, info};
use std::time::Instant;
use uuid::Uuid;

/// Outcome of one move request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The entity already sat at the requested index; nothing was written.
    Unchanged { uuid: EntityId, position: i64 },
    /// The entity was written with a new position (and maybe parent).
    Moved(PositionUpdate),
}

impl MoveOutcome {
    pub fn renumbered(&self) -> bool {
        matches!(self, Self::Moved(update) if !update.renumbered.is_empty())
    }
}

/// Orchestrates moves and appends over a store and a lock registry.
pub struct ReorderEngine<'a, S: HierarchyStore + ?Sized> {
    store: &'a S,
    locks: &'a SiblingLocks,
    assigner: PositionAssigner,
    max_attempts: u32,
}

impl<'a, S: HierarchyStore + ?Sized> ReorderEngine<'a, S> {
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

    /// Moves `uuid` so it ends up at `target_index` among the members of
    /// `(kind, destination_parent)`.
    ///
    /// Boards never change owner: a destination other than the current owner
    /// is rejected as an invalid argument.
    pub fn move_entity(
        &self,
        kind: EntityKind,
        uuid: EntityId,
        destination_parent: Uuid,
        target_index: usize,
    ) -> HierarchyResult<MoveOutcome> {
        let started_at = Instant::now();
        let mut entry = self.require_entry(kind, uuid)?;
        if kind == EntityKind::Board && destination_parent != entry.parent_uuid {
            return Err(HierarchyError::invalid("boards cannot change owner"));
        }
        let destination = SiblingSetKey::new(kind, destination_parent);
        ensure_parent_exists(self.store, destination)?;

        for _ in 0..self.max_attempts {
            let source = SiblingSetKey::new(kind, entry.parent_uuid);
            let _guard = self.locks.lock_sets(&[source, destination])?;

            let current = self.require_entry(kind, uuid)?;
            if current.parent_uuid != entry.parent_uuid {
                debug!(
                    "event=entity_move module=engine status=retry kind={} uuid={} reason=parent_changed",
                    kind, uuid
                );
                entry = current;
                continue;
            }
            ensure_parent_exists(self.store, destination)?;

            let outcome = self.apply_move(kind, current, destination, target_index)?;
            info!(
                "event=entity_move module=engine status=ok kind={} uuid={} cross_parent={} renumbered={} duration_ms={}",
                kind,
                uuid,
                source != destination,
                outcome.renumbered(),
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

    /// Appends a new member to `key` using `insert`, which receives the
    /// placement and performs the write.
    ///
    /// The set stays locked across placement and insert. When no position is
    /// left after the current maximum, the placement carries a renumbering of
    /// the set that `insert` commits together with the new row.
    pub fn append_with<T>(
        &self,
        key: SiblingSetKey,
        insert: impl FnOnce(&Placement) -> StoreResult<T>,
    ) -> HierarchyResult<T> {
        let _guard = self.locks.lock_set(key)?;
        ensure_parent_exists(self.store, key)?;

        let set = self.store.siblings(key)?;
        let placement = match self.assigner.append_slot(&set.positions(), set.high_water) {
            Slot::At(position) => Placement::at(position),
            Slot::Renumber => {
                let renumbered = self.assigner.renumbered(&set.ids());
                let positions: Vec<i64> = renumbered.iter().map(|(_, p)| *p).collect();
                let high_water = positions.last().copied().unwrap_or(0);
                let position = self
                    .assigner
                    .append_position(&positions, high_water)
                    .ok_or_else(|| {
                        HierarchyError::invalid(format!("sibling set {key} has no free position"))
                    })?;
                Placement {
                    position,
                    renumbered,
                }
            }
        };
        Ok(insert(&placement)?)
    }

    fn apply_move(
        &self,
        kind: EntityKind,
        entry: SiblingEntry,
        destination: SiblingSetKey,
        target_index: usize,
    ) -> HierarchyResult<MoveOutcome> {
        let set = self.store.siblings(destination)?;
        let others: Vec<SiblingEntry> = set
            .members
            .iter()
            .copied()
            .filter(|member| member.uuid != entry.uuid)
            .collect();
        let index = target_index.min(others.len());

        if entry.parent_uuid == destination.parent_uuid {
            let current_index = set.members.iter().position(|m| m.uuid == entry.uuid);
            if current_index == Some(index) {
                return Ok(MoveOutcome::Unchanged {
                    uuid: entry.uuid,
                    position: entry.position,
                });
            }
        }

        let positions: Vec<i64> = others.iter().map(|member| member.position).collect();
        let update = match self.assigner.insert_slot(&positions, index, set.high_water) {
            Slot::At(position) => PositionUpdate {
                uuid: entry.uuid,
                destination,
                position,
                renumbered: Vec::new(),
            },
            Slot::Renumber => {
                let mut order: Vec<EntityId> = others.iter().map(|member| member.uuid).collect();
                order.insert(index, entry.uuid);
                let renumbered = self.assigner.renumbered(&order);
                let position = renumbered[index].1;
                PositionUpdate {
                    uuid: entry.uuid,
                    destination,
                    position,
                    renumbered,
                }
            }
        };

        self.store.update_position(kind, &update)?;
        Ok(MoveOutcome::Moved(update))
    }

    fn require_entry(&self, kind: EntityKind, uuid: EntityId) -> HierarchyResult<SiblingEntry> {
        self.store
            .get_entry(kind, uuid)?
            .ok_or_else(|| HierarchyError::not_found(kind.as_str(), uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::{MoveOutcome, ReorderEngine};
    use crate::db::open_db_in_memory;
    use crate::engine::lock::SiblingLocks;
    use crate::engine::position::PositionAssigner;
    use crate::error::HierarchyError;
    use crate::model::hierarchy::{EntityKind, NewBoard, NewCard, NewList, SiblingSetKey};
    use crate::repo::hierarchy_repo::{HierarchyStore, Placement, SqliteHierarchyStore};
    use std::time::Duration;
    use uuid::Uuid;

    fn store_with_list() -> (SqliteHierarchyStore, Uuid) {
        let store = SqliteHierarchyStore::try_new(open_db_in_memory().unwrap()).unwrap();
        let board = store
            .insert_board(
                &NewBoard {
                    owner_uuid: Uuid::new_v4(),
                    title: "Board".to_string(),
                    description: None,
                    first_list_title: None,
                },
                &Placement::at(1),
            )
            .unwrap();
        let list = store
            .insert_list(
                &NewList {
                    board_uuid: board.uuid,
                    title: "Todo".to_string(),
                },
                &Placement::at(1),
            )
            .unwrap();
        (store, list.uuid)
    }

    fn card(store: &SqliteHierarchyStore, list_uuid: Uuid, position: i64) -> Uuid {
        store
            .insert_card(
                &NewCard {
                    list_uuid,
                    title: format!("card {position}"),
                    description: None,
                },
                &Placement::at(position),
            )
            .unwrap()
            .uuid
    }

    #[test]
    fn moving_to_current_index_writes_nothing() {
        let (store, list) = store_with_list();
        let locks = SiblingLocks::new(Duration::from_millis(200));
        let engine = ReorderEngine::new(&store, &locks, PositionAssigner::default(), 3);
        let a = card(&store, list, 1);
        card(&store, list, 2);

        let outcome = engine.move_entity(EntityKind::Card, a, list, 0).unwrap();
        assert_eq!(outcome, MoveOutcome::Unchanged { uuid: a, position: 1 });
    }

    #[test]
    fn exhausted_gap_renumbers_with_entity_in_place() {
        let (store, list) = store_with_list();
        let locks = SiblingLocks::new(Duration::from_millis(200));
        let engine = ReorderEngine::new(&store, &locks, PositionAssigner::default(), 3);
        let a = card(&store, list, 1);
        let b = card(&store, list, 2);
        let c = card(&store, list, 3);

        let outcome = engine.move_entity(EntityKind::Card, c, list, 0).unwrap();
        assert!(outcome.renumbered());

        let set = store.siblings(SiblingSetKey::cards_of(list)).unwrap();
        assert_eq!(set.ids(), vec![c, a, b]);
        assert_eq!(set.positions(), vec![1, 2, 3]);
    }

    #[test]
    fn missing_entity_is_not_found() {
        let (store, list) = store_with_list();
        let locks = SiblingLocks::new(Duration::from_millis(200));
        let engine = ReorderEngine::new(&store, &locks, PositionAssigner::default(), 3);

        let err = engine
            .move_entity(EntityKind::Card, Uuid::new_v4(), list, 0)
            .unwrap_err();
        assert!(matches!(err, HierarchyError::NotFound { kind: "card", .. }));
        assert_eq!(locks.tracked_sets(), 0);
    }

    #[test]
    fn append_uses_next_position_after_high_water() {
        let (store, list) = store_with_list();
        let locks = SiblingLocks::new(Duration::from_millis(200));
        let engine = ReorderEngine::new(&store, &locks, PositionAssigner::default(), 3);
        card(&store, list, 1);
        let last = card(&store, list, 2);
        store.delete_cascade(EntityKind::Card, last).unwrap();

        let placement = engine
            .append_with(SiblingSetKey::cards_of(list), |placement| {
                Ok(placement.clone())
            })
            .unwrap();
        assert_eq!(placement, Placement::at(3));
    }

    #[test]
    fn overflowing_append_carries_renumbering_into_the_insert() {
        let (store, list) = store_with_list();
        let locks = SiblingLocks::new(Duration::from_millis(200));
        let engine = ReorderEngine::new(&store, &locks, PositionAssigner::default(), 3);
        let last = card(&store, list, i64::MAX);

        let placement = engine
            .append_with(SiblingSetKey::cards_of(list), |placement| {
                Ok(placement.clone())
            })
            .unwrap();
        assert_eq!(
            placement,
            Placement {
                position: 2,
                renumbered: vec![(last, 1)],
            }
        );
        // Nothing was written before the insert ran.
        let set = store.siblings(SiblingSetKey::cards_of(list)).unwrap();
        assert_eq!(set.positions(), vec![i64::MAX]);
    }
}
