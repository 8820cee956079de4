//! Request/response boundary of the board/list/card hierarchy.
//!
//! # Responsibility
//! - Validate caller input, then delegate structural changes to the reorder
//!   engine and the deletion compactor.
//! - Own the lock registry shared by every request served by one store.
//!
//! # Invariants
//! - Requests failing validation return before any lock is taken.
//! - Titles are trimmed, non-blank and bounded by `max_title_chars`.
//! - Target indexes below zero are clamped to zero, beyond the end to the end.
//! - Metrics writes are best-effort and never change an operation's result.

use crate::config::{ConfigError, HierarchyConfig};
use crate::engine::compactor::DeletionCompactor;
use crate::engine::ensure_parent_exists;
use crate::engine::lock::SiblingLocks;
use crate::engine::position::PositionAssigner;
use crate::engine::reorder::ReorderEngine;
use crate::error::{HierarchyError, HierarchyResult};
use crate::model::hierarchy::{
    Board, BoardList, Card, EntityId, EntityKind, NewBoard, NewCard, NewList, OwnerId,
    SiblingSetKey,
};
use crate::repo::hierarchy_repo::{DeleteOutcome, DuplicatePosition, HierarchyStore};
use crate::service::collaborators::{BlobStore, MetricsSink, NoopMetricsSink};
use log::{info, warn};
use std::sync::Arc;

/// Hierarchy use-case facade over a store implementation.
///
/// Shareable across request threads (`Arc<HierarchyApi<_>>`); every
/// structural operation serializes on the sibling sets it touches.
pub struct HierarchyApi<S: HierarchyStore> {
    store: S,
    locks: SiblingLocks,
    config: HierarchyConfig,
    assigner: PositionAssigner,
    pub(crate) blobs: Option<Arc<dyn BlobStore>>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
}

impl<S: HierarchyStore> HierarchyApi<S> {
    /// Creates an API over `store` after validating `config`.
    pub fn new(store: S, config: HierarchyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            locks: SiblingLocks::new(config.lock_timeout()),
            assigner: PositionAssigner::new(config.renumber_stride),
            store,
            config,
            blobs: None,
            metrics: Arc::new(NoopMetricsSink),
        })
    }

    /// Creates an API with the default configuration.
    pub fn with_default_config(store: S) -> Self {
        let config = HierarchyConfig::default();
        Self {
            locks: SiblingLocks::new(config.lock_timeout()),
            assigner: PositionAssigner::new(config.renumber_stride),
            store,
            config,
            blobs: None,
            metrics: Arc::new(NoopMetricsSink),
        }
    }

    /// Attaches the blob store used for attachment bytes.
    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Attaches the metrics sink receiving operation counters.
    pub fn with_metrics_sink(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    /// Appends a new board to the owner's boards.
    ///
    /// With `default_list_title` configured, the board's first list is
    /// written in the same transaction; either both exist or neither does.
    pub fn create_board(
        &self,
        owner_uuid: OwnerId,
        title: &str,
        description: Option<&str>,
    ) -> HierarchyResult<Board> {
        let first_list_title = match &self.config.default_list_title {
            Some(list_title) => Some(self.normalize_title(list_title)?),
            None => None,
        };
        let board = NewBoard {
            owner_uuid,
            title: self.normalize_title(title)?,
            description: normalize_description(description),
            first_list_title,
        };
        // The new board's list set is unreachable until this commits, so the
        // owner's board set is the only lock needed.
        let created = self
            .reorder()
            .append_with(SiblingSetKey::boards_of(owner_uuid), |placement| {
                self.store.insert_board(&board, placement)
            })?;
        self.record_op("board_create");
        if board.first_list_title.is_some() {
            self.record_op("list_create");
        }
        Ok(created)
    }

    pub fn get_board(&self, uuid: EntityId) -> HierarchyResult<Board> {
        self.store
            .get_board(uuid)?
            .ok_or_else(|| HierarchyError::not_found(EntityKind::Board.as_str(), uuid))
    }

    /// Lists the owner's boards in display order.
    pub fn list_boards(&self, owner_uuid: OwnerId) -> HierarchyResult<Vec<Board>> {
        Ok(self.store.list_boards(owner_uuid)?)
    }

    /// Updates title and/or description. `Some("")` clears the description.
    pub fn update_board(
        &self,
        uuid: EntityId,
        title: Option<&str>,
        description: Option<&str>,
    ) -> HierarchyResult<Board> {
        let current = self.get_board(uuid)?;
        let title = match title {
            Some(value) => self.normalize_title(value)?,
            None => current.title,
        };
        let description = match description {
            Some(value) => normalize_description(Some(value)),
            None => current.description,
        };
        self.store
            .update_board_details(uuid, &title, description.as_deref())?;
        self.record_op("board_update");
        self.get_board(uuid)
    }

    /// Moves a board to `target_index` among its owner's boards.
    pub fn reorder_board(&self, uuid: EntityId, target_index: i64) -> HierarchyResult<Board> {
        let owner = self.get_board(uuid)?.owner_uuid;
        self.reorder()
            .move_entity(EntityKind::Board, uuid, owner, clamp_index(target_index))?;
        self.record_op("board_reorder");
        self.get_board(uuid)
    }

    /// Deletes a board with all of its lists, cards and attachments.
    pub fn delete_board(&self, uuid: EntityId) -> HierarchyResult<DeleteOutcome> {
        self.delete(EntityKind::Board, uuid, "board_delete")
    }

    pub fn create_list(&self, board_uuid: EntityId, title: &str) -> HierarchyResult<BoardList> {
        let list = NewList {
            board_uuid,
            title: self.normalize_title(title)?,
        };
        let key = SiblingSetKey::lists_of(board_uuid);
        ensure_parent_exists(&self.store, key)?;

        let created = self.reorder().append_with(key, |placement| {
            self.store.insert_list(&list, placement)
        })?;
        self.record_op("list_create");
        Ok(created)
    }

    pub fn get_list(&self, uuid: EntityId) -> HierarchyResult<BoardList> {
        self.store
            .get_list(uuid)?
            .ok_or_else(|| HierarchyError::not_found(EntityKind::List.as_str(), uuid))
    }

    pub fn list_lists(&self, board_uuid: EntityId) -> HierarchyResult<Vec<BoardList>> {
        ensure_parent_exists(&self.store, SiblingSetKey::lists_of(board_uuid))?;
        Ok(self.store.list_lists(board_uuid)?)
    }

    pub fn update_list(&self, uuid: EntityId, title: Option<&str>) -> HierarchyResult<BoardList> {
        let current = self.get_list(uuid)?;
        let title = match title {
            Some(value) => self.normalize_title(value)?,
            None => current.title,
        };
        self.store.update_list_title(uuid, &title)?;
        self.record_op("list_update");
        self.get_list(uuid)
    }

    /// Moves a list to `target_index` of `destination_board`'s lists.
    pub fn move_list(
        &self,
        uuid: EntityId,
        destination_board: EntityId,
        target_index: i64,
    ) -> HierarchyResult<BoardList> {
        self.reorder().move_entity(
            EntityKind::List,
            uuid,
            destination_board,
            clamp_index(target_index),
        )?;
        self.record_op("list_move");
        self.get_list(uuid)
    }

    pub fn delete_list(&self, uuid: EntityId) -> HierarchyResult<DeleteOutcome> {
        self.delete(EntityKind::List, uuid, "list_delete")
    }

    pub fn create_card(
        &self,
        list_uuid: EntityId,
        title: &str,
        description: Option<&str>,
    ) -> HierarchyResult<Card> {
        let card = NewCard {
            list_uuid,
            title: self.normalize_title(title)?,
            description: normalize_description(description),
        };
        let key = SiblingSetKey::cards_of(list_uuid);
        ensure_parent_exists(&self.store, key)?;

        let created = self.reorder().append_with(key, |placement| {
            self.store.insert_card(&card, placement)
        })?;
        self.record_op("card_create");
        Ok(created)
    }

    pub fn get_card(&self, uuid: EntityId) -> HierarchyResult<Card> {
        self.store
            .get_card(uuid)?
            .ok_or_else(|| HierarchyError::not_found(EntityKind::Card.as_str(), uuid))
    }

    pub fn list_cards(&self, list_uuid: EntityId) -> HierarchyResult<Vec<Card>> {
        ensure_parent_exists(&self.store, SiblingSetKey::cards_of(list_uuid))?;
        Ok(self.store.list_cards(list_uuid)?)
    }

    /// Updates title and/or description. `Some("")` clears the description.
    pub fn update_card(
        &self,
        uuid: EntityId,
        title: Option<&str>,
        description: Option<&str>,
    ) -> HierarchyResult<Card> {
        let current = self.get_card(uuid)?;
        let title = match title {
            Some(value) => self.normalize_title(value)?,
            None => current.title,
        };
        let description = match description {
            Some(value) => normalize_description(Some(value)),
            None => current.description,
        };
        self.store
            .update_card_details(uuid, &title, description.as_deref())?;
        self.record_op("card_update");
        self.get_card(uuid)
    }

    /// Moves a card to `target_index` of `destination_list`'s cards. The
    /// destination may be the card's current list.
    pub fn move_card(
        &self,
        uuid: EntityId,
        destination_list: EntityId,
        target_index: i64,
    ) -> HierarchyResult<Card> {
        self.reorder().move_entity(
            EntityKind::Card,
            uuid,
            destination_list,
            clamp_index(target_index),
        )?;
        self.record_op("card_move");
        self.get_card(uuid)
    }

    pub fn delete_card(&self, uuid: EntityId) -> HierarchyResult<DeleteOutcome> {
        self.delete(EntityKind::Card, uuid, "card_delete")
    }

    /// Renumbers one sibling set; returns the number of members renumbered.
    pub fn renumber_set(&self, key: SiblingSetKey) -> HierarchyResult<usize> {
        ensure_parent_exists(&self.store, key)?;
        let renumbered = self.compactor().renumber(key)?;
        self.record_op("set_renumber");
        Ok(renumbered)
    }

    /// Renumbers every sibling set; returns the number of sets renumbered.
    pub fn renumber_all(&self) -> HierarchyResult<usize> {
        let sets = self.compactor().renumber_all()?;
        self.record_op("renumber_all");
        Ok(sets)
    }

    /// Positions shared by more than one member of a set. Empty when healthy.
    pub fn integrity_report(&self) -> HierarchyResult<Vec<DuplicatePosition>> {
        let duplicates = self.store.duplicate_positions()?;
        if duplicates.is_empty() {
            info!("event=integrity_check module=service status=ok duplicates=0");
        } else {
            warn!(
                "event=integrity_check module=service status=error duplicates={}",
                duplicates.len()
            );
        }
        Ok(duplicates)
    }

    fn reorder(&self) -> ReorderEngine<'_, S> {
        ReorderEngine::new(
            &self.store,
            &self.locks,
            self.assigner,
            self.config.max_lock_attempts,
        )
    }

    fn compactor(&self) -> DeletionCompactor<'_, S> {
        DeletionCompactor::new(
            &self.store,
            &self.locks,
            self.assigner,
            self.config.max_lock_attempts,
        )
    }

    fn delete(
        &self,
        kind: EntityKind,
        uuid: EntityId,
        op: &'static str,
    ) -> HierarchyResult<DeleteOutcome> {
        let outcome = self.compactor().delete(kind, uuid)?;
        self.discard_blobs(&outcome.attachment_paths);
        self.record_op(op);
        Ok(outcome)
    }

    /// Removes blobs whose metadata rows are already gone. Failures leave an
    /// unreferenced blob behind and are only logged.
    pub(crate) fn discard_blobs(&self, paths: &[String]) {
        let Some(blobs) = &self.blobs else {
            return;
        };
        for path in paths {
            if let Err(err) = blobs.delete(path) {
                warn!(
                    "event=blob_delete module=service status=error path={} error={}",
                    path, err
                );
            }
        }
    }

    pub(crate) fn record_op(&self, op: &str) {
        let key = format!("kanban:ops:{op}");
        if let Err(err) = self.metrics.increment(&key) {
            warn!(
                "event=metrics_write module=service status=error key={} error={}",
                key, err
            );
        }
    }

    pub(crate) fn normalize_title(&self, value: &str) -> HierarchyResult<String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(HierarchyError::invalid("title must not be blank"));
        }
        let max = self.config.max_title_chars;
        if trimmed.chars().count() > max {
            return Err(HierarchyError::invalid(format!(
                "title must be at most {max} characters"
            )));
        }
        Ok(trimmed.to_string())
    }
}

fn normalize_description(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|description| !description.is_empty())
        .map(str::to_string)
}

fn clamp_index(target_index: i64) -> usize {
    usize::try_from(target_index.max(0)).unwrap_or(usize::MAX)
}
