//! Hierarchy store contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist boards, lists, cards and attachment metadata.
//! - Read sibling sets in display order and apply position changes atomically.
//! - Keep SQL details and the two-phase renumbering trick inside this file.
//!
//! # Invariants
//! - Sibling listing is deterministic: `position ASC, uuid ASC`.
//! - Every structural write (insert, position update, renumber, cascade
//!   delete) runs in one `IMMEDIATE` transaction: all rows change or none do.
//! - The store never chooses positions. Callers compute them while holding
//!   the sibling-set lock; the `UNIQUE (parent, position)` constraint is the
//!   last line that rejects a collision.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::attachment::{Attachment, AttachmentId, NewAttachment};
use crate::model::hierarchy::{
    Board, BoardList, Card, EntityId, EntityKind, NewBoard, NewCard, NewList, OwnerId,
    SiblingEntry, SiblingSet, SiblingSetKey,
};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Result type used by hierarchy store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from hierarchy store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Row addressed by a write does not exist.
    RowNotFound { kind: &'static str, uuid: Uuid },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
    /// A previous holder of the connection panicked mid-operation.
    Poisoned,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::RowNotFound { kind, uuid } => write!(f, "{kind} row not found: {uuid}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "hierarchy store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "hierarchy store requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid hierarchy data: {message}"),
            Self::Poisoned => write!(f, "hierarchy store connection is poisoned"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One position change, optionally carrying a renumbering of the destination.
///
/// With an empty `renumbered`, only the entity row changes: its parent becomes
/// `destination.parent_uuid` and its position becomes `position`. With a
/// non-empty `renumbered`, every listed member (the entity included) receives
/// its new position and the set's high-water mark is reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionUpdate {
    pub uuid: EntityId,
    pub destination: SiblingSetKey,
    pub position: i64,
    pub renumbered: Vec<(EntityId, i64)>,
}

/// Where an inserted row lands in its sibling set.
///
/// A non-empty `renumbered` rewrites the existing members in the same
/// transaction as the insert, before it, and resets the set's high-water mark.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placement {
    pub position: i64,
    pub renumbered: Vec<(EntityId, i64)>,
}

impl Placement {
    pub fn at(position: i64) -> Self {
        Self {
            position,
            renumbered: Vec::new(),
        }
    }
}

/// Rows removed by one cascading delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub boards_removed: usize,
    pub lists_removed: usize,
    pub cards_removed: usize,
    /// Blob paths whose metadata rows were removed in the same transaction.
    pub attachment_paths: Vec<String>,
}

/// Per-board counters for statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardStats {
    pub uuid: EntityId,
    pub title: String,
    pub lists_count: u64,
    pub cards_count: u64,
}

/// A position value shared by more than one member of a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicatePosition {
    pub key: SiblingSetKey,
    pub position: i64,
    pub count: u64,
}

/// Storage contract consumed by the engine and API layers.
///
/// Implementations must be shareable across request threads.
pub trait HierarchyStore: Send + Sync {
    /// Loads the positional projection of one entity.
    fn get_entry(&self, kind: EntityKind, uuid: EntityId) -> StoreResult<Option<SiblingEntry>>;
    fn get_board(&self, uuid: EntityId) -> StoreResult<Option<Board>>;
    fn get_list(&self, uuid: EntityId) -> StoreResult<Option<BoardList>>;
    fn get_card(&self, uuid: EntityId) -> StoreResult<Option<Card>>;

    /// Reads one sibling set in display order.
    fn siblings(&self, key: SiblingSetKey) -> StoreResult<SiblingSet>;
    fn list_boards(&self, owner_uuid: OwnerId) -> StoreResult<Vec<Board>>;
    fn list_lists(&self, board_uuid: EntityId) -> StoreResult<Vec<BoardList>>;
    fn list_cards(&self, list_uuid: EntityId) -> StoreResult<Vec<Card>>;
    /// Distinct parents that currently have at least one member of `kind`.
    fn sibling_parents(&self, kind: EntityKind) -> StoreResult<Vec<Uuid>>;

    /// Inserts a board, and its first list when `first_list_title` is set,
    /// in one transaction.
    fn insert_board(&self, board: &NewBoard, placement: &Placement) -> StoreResult<Board>;
    fn insert_list(&self, list: &NewList, placement: &Placement) -> StoreResult<BoardList>;
    fn insert_card(&self, card: &NewCard, placement: &Placement) -> StoreResult<Card>;

    fn update_board_details(
        &self,
        uuid: EntityId,
        title: &str,
        description: Option<&str>,
    ) -> StoreResult<()>;
    fn update_list_title(&self, uuid: EntityId, title: &str) -> StoreResult<()>;
    fn update_card_details(
        &self,
        uuid: EntityId,
        title: &str,
        description: Option<&str>,
    ) -> StoreResult<()>;

    /// Moves one entity (position and, when it differs, parent) atomically.
    fn update_position(&self, kind: EntityKind, update: &PositionUpdate) -> StoreResult<()>;
    /// Rewrites every listed member position of one set atomically.
    fn reassign_positions(
        &self,
        key: SiblingSetKey,
        assignments: &[(EntityId, i64)],
    ) -> StoreResult<()>;
    /// Deletes one entity and all of its descendants, children first.
    fn delete_cascade(&self, kind: EntityKind, uuid: EntityId) -> StoreResult<DeleteOutcome>;

    fn insert_attachment(&self, attachment: &NewAttachment) -> StoreResult<Attachment>;
    fn get_attachment(&self, uuid: AttachmentId) -> StoreResult<Option<Attachment>>;
    fn list_attachments(&self, card_uuid: EntityId) -> StoreResult<Vec<Attachment>>;
    fn delete_attachment(&self, uuid: AttachmentId) -> StoreResult<()>;

    fn board_statistics(&self) -> StoreResult<Vec<BoardStats>>;
    fn duplicate_positions(&self) -> StoreResult<Vec<DuplicatePosition>>;
}

/// SQLite-backed hierarchy store.
///
/// Owns its connection behind a mutex so one store can serve many request
/// threads; statement-level serialization is the mutex, operation-level
/// serialization is the engine's sibling-set locks.
pub struct SqliteHierarchyStore {
    conn: Mutex<Connection>,
}

impl SqliteHierarchyStore {
    /// Creates store from a migrated connection.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        ensure_hierarchy_connection_ready(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl HierarchyStore for SqliteHierarchyStore {
    fn get_entry(&self, kind: EntityKind, uuid: EntityId) -> StoreResult<Option<SiblingEntry>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT uuid, {parent} AS parent_uuid, position
             FROM {table}
             WHERE uuid = ?1;",
            parent = kind.parent_column(),
            table = kind.table(),
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([uuid.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_entry_row(row, kind)?));
        }
        Ok(None)
    }

    fn get_board(&self, uuid: EntityId) -> StoreResult<Option<Board>> {
        let conn = self.conn()?;
        load_board(&conn, uuid)
    }

    fn get_list(&self, uuid: EntityId) -> StoreResult<Option<BoardList>> {
        let conn = self.conn()?;
        load_list(&conn, uuid)
    }

    fn get_card(&self, uuid: EntityId) -> StoreResult<Option<Card>> {
        let conn = self.conn()?;
        load_card(&conn, uuid)
    }

    fn siblings(&self, key: SiblingSetKey) -> StoreResult<SiblingSet> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT uuid, {parent} AS parent_uuid, position
             FROM {table}
             WHERE {parent} = ?1
             ORDER BY position ASC, uuid ASC;",
            parent = key.kind.parent_column(),
            table = key.kind.table(),
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([key.parent_uuid.to_string()])?;
        let mut members = Vec::new();
        while let Some(row) = rows.next()? {
            members.push(parse_entry_row(row, key.kind)?);
        }
        drop(rows);
        drop(stmt);

        let high_water = load_high_water(&conn, key)?;
        Ok(SiblingSet {
            key,
            members,
            high_water,
        })
    }

    fn list_boards(&self, owner_uuid: OwnerId) -> StoreResult<Vec<Board>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{BOARD_SELECT_SQL} WHERE owner_uuid = ?1 ORDER BY position ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([owner_uuid.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_board_row(row)?);
        }
        Ok(items)
    }

    fn list_lists(&self, board_uuid: EntityId) -> StoreResult<Vec<BoardList>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{LIST_SELECT_SQL} WHERE board_uuid = ?1 ORDER BY position ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([board_uuid.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_list_row(row)?);
        }
        Ok(items)
    }

    fn list_cards(&self, list_uuid: EntityId) -> StoreResult<Vec<Card>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{CARD_SELECT_SQL} WHERE list_uuid = ?1 ORDER BY position ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([list_uuid.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_card_row(row)?);
        }
        Ok(items)
    }

    fn sibling_parents(&self, kind: EntityKind) -> StoreResult<Vec<Uuid>> {
        let conn = self.conn()?;
        let column = kind.parent_column();
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT {column} FROM {table} ORDER BY {column} ASC;",
            table = kind.table(),
        ))?;
        let mut rows = stmt.query([])?;
        let mut parents = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            parents.push(parse_uuid(&value, column)?);
        }
        Ok(parents)
    }

    fn insert_board(&self, board: &NewBoard, placement: &Placement) -> StoreResult<Board> {
        let uuid = Uuid::new_v4();
        let key = SiblingSetKey::boards_of(board.owner_uuid);
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        apply_renumbering(&tx, key, placement)?;
        tx.execute(
            "INSERT INTO boards (uuid, owner_uuid, title, description, position)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                uuid.to_string(),
                board.owner_uuid.to_string(),
                board.title,
                board.description,
                placement.position,
            ],
        )?;
        raise_high_water(&tx, key, placement.position)?;
        if let Some(list_title) = &board.first_list_title {
            tx.execute(
                "INSERT INTO board_lists (uuid, board_uuid, title, position)
                 VALUES (?1, ?2, ?3, 1);",
                params![Uuid::new_v4().to_string(), uuid.to_string(), list_title],
            )?;
            raise_high_water(&tx, SiblingSetKey::lists_of(uuid), 1)?;
        }
        tx.commit()?;
        load_board(&conn, uuid)?.ok_or(StoreError::RowNotFound {
            kind: EntityKind::Board.as_str(),
            uuid,
        })
    }

    fn insert_list(&self, list: &NewList, placement: &Placement) -> StoreResult<BoardList> {
        let uuid = Uuid::new_v4();
        let key = SiblingSetKey::lists_of(list.board_uuid);
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        apply_renumbering(&tx, key, placement)?;
        tx.execute(
            "INSERT INTO board_lists (uuid, board_uuid, title, position)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                uuid.to_string(),
                list.board_uuid.to_string(),
                list.title,
                placement.position,
            ],
        )?;
        raise_high_water(&tx, key, placement.position)?;
        tx.commit()?;
        load_list(&conn, uuid)?.ok_or(StoreError::RowNotFound {
            kind: EntityKind::List.as_str(),
            uuid,
        })
    }

    fn insert_card(&self, card: &NewCard, placement: &Placement) -> StoreResult<Card> {
        let uuid = Uuid::new_v4();
        let key = SiblingSetKey::cards_of(card.list_uuid);
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        apply_renumbering(&tx, key, placement)?;
        tx.execute(
            "INSERT INTO cards (uuid, list_uuid, title, description, position)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                uuid.to_string(),
                card.list_uuid.to_string(),
                card.title,
                card.description,
                placement.position,
            ],
        )?;
        raise_high_water(&tx, key, placement.position)?;
        tx.commit()?;
        load_card(&conn, uuid)?.ok_or(StoreError::RowNotFound {
            kind: EntityKind::Card.as_str(),
            uuid,
        })
    }

    fn update_board_details(
        &self,
        uuid: EntityId,
        title: &str,
        description: Option<&str>,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE boards SET title = ?2, description = ?3 WHERE uuid = ?1;",
            params![uuid.to_string(), title, description],
        )?;
        ensure_changed(changed, EntityKind::Board.as_str(), uuid)
    }

    fn update_list_title(&self, uuid: EntityId, title: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE board_lists SET title = ?2 WHERE uuid = ?1;",
            params![uuid.to_string(), title],
        )?;
        ensure_changed(changed, EntityKind::List.as_str(), uuid)
    }

    fn update_card_details(
        &self,
        uuid: EntityId,
        title: &str,
        description: Option<&str>,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE cards SET title = ?2, description = ?3 WHERE uuid = ?1;",
            params![uuid.to_string(), title, description],
        )?;
        ensure_changed(changed, EntityKind::Card.as_str(), uuid)
    }

    fn update_position(&self, kind: EntityKind, update: &PositionUpdate) -> StoreResult<()> {
        let destination = update.destination;
        if destination.kind != kind {
            return Err(StoreError::InvalidData(format!(
                "position update for {kind} targets {destination}"
            )));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if update.renumbered.is_empty() {
            let changed = tx.execute(
                &format!(
                    "UPDATE {table} SET {parent} = ?2, position = ?3 WHERE uuid = ?1;",
                    table = kind.table(),
                    parent = kind.parent_column(),
                ),
                params![
                    update.uuid.to_string(),
                    destination.parent_uuid.to_string(),
                    update.position,
                ],
            )?;
            ensure_changed(changed, kind.as_str(), update.uuid)?;
            raise_high_water(&tx, destination, update.position)?;
        } else {
            write_assignments(&tx, destination, &update.renumbered)?;
            reset_high_water(&tx, destination, &update.renumbered)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn reassign_positions(
        &self,
        key: SiblingSetKey,
        assignments: &[(EntityId, i64)],
    ) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        write_assignments(&tx, key, assignments)?;
        reset_high_water(&tx, key, assignments)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_cascade(&self, kind: EntityKind, uuid: EntityId) -> StoreResult<DeleteOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = uuid.to_string();
        let mut outcome = DeleteOutcome::default();

        match kind {
            EntityKind::Card => {
                outcome.attachment_paths = collect_strings(
                    &tx,
                    "SELECT path FROM attachments WHERE card_uuid = ?1 ORDER BY uuid;",
                    &id,
                )?;
                tx.execute("DELETE FROM attachments WHERE card_uuid = ?1;", [&id])?;
                outcome.cards_removed = tx.execute("DELETE FROM cards WHERE uuid = ?1;", [&id])?;
                ensure_changed(outcome.cards_removed, kind.as_str(), uuid)?;
            }
            EntityKind::List => {
                outcome.attachment_paths = collect_strings(
                    &tx,
                    "SELECT a.path
                     FROM attachments a
                     INNER JOIN cards c ON c.uuid = a.card_uuid
                     WHERE c.list_uuid = ?1
                     ORDER BY a.uuid;",
                    &id,
                )?;
                tx.execute(
                    "DELETE FROM attachments
                     WHERE card_uuid IN (SELECT uuid FROM cards WHERE list_uuid = ?1);",
                    [&id],
                )?;
                outcome.cards_removed =
                    tx.execute("DELETE FROM cards WHERE list_uuid = ?1;", [&id])?;
                tx.execute(
                    "DELETE FROM sibling_sets WHERE member_kind = 'card' AND parent_uuid = ?1;",
                    [&id],
                )?;
                outcome.lists_removed =
                    tx.execute("DELETE FROM board_lists WHERE uuid = ?1;", [&id])?;
                ensure_changed(outcome.lists_removed, kind.as_str(), uuid)?;
            }
            EntityKind::Board => {
                outcome.attachment_paths = collect_strings(
                    &tx,
                    "SELECT a.path
                     FROM attachments a
                     INNER JOIN cards c ON c.uuid = a.card_uuid
                     INNER JOIN board_lists l ON l.uuid = c.list_uuid
                     WHERE l.board_uuid = ?1
                     ORDER BY a.uuid;",
                    &id,
                )?;
                tx.execute(
                    "DELETE FROM attachments
                     WHERE card_uuid IN (
                         SELECT c.uuid
                         FROM cards c
                         INNER JOIN board_lists l ON l.uuid = c.list_uuid
                         WHERE l.board_uuid = ?1
                     );",
                    [&id],
                )?;
                outcome.cards_removed = tx.execute(
                    "DELETE FROM cards
                     WHERE list_uuid IN (SELECT uuid FROM board_lists WHERE board_uuid = ?1);",
                    [&id],
                )?;
                tx.execute(
                    "DELETE FROM sibling_sets
                     WHERE member_kind = 'card'
                       AND parent_uuid IN (SELECT uuid FROM board_lists WHERE board_uuid = ?1);",
                    [&id],
                )?;
                outcome.lists_removed =
                    tx.execute("DELETE FROM board_lists WHERE board_uuid = ?1;", [&id])?;
                tx.execute(
                    "DELETE FROM sibling_sets WHERE member_kind = 'list' AND parent_uuid = ?1;",
                    [&id],
                )?;
                outcome.boards_removed = tx.execute("DELETE FROM boards WHERE uuid = ?1;", [&id])?;
                ensure_changed(outcome.boards_removed, kind.as_str(), uuid)?;
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn insert_attachment(&self, attachment: &NewAttachment) -> StoreResult<Attachment> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO attachments (
                uuid,
                card_uuid,
                filename,
                original_name,
                mime_type,
                path,
                size
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                attachment.uuid.to_string(),
                attachment.card_uuid.to_string(),
                attachment.filename,
                attachment.original_name,
                attachment.mime_type,
                attachment.path,
                attachment.size,
            ],
        )?;
        load_attachment(&conn, attachment.uuid)?.ok_or(StoreError::RowNotFound {
            kind: "attachment",
            uuid: attachment.uuid,
        })
    }

    fn get_attachment(&self, uuid: AttachmentId) -> StoreResult<Option<Attachment>> {
        let conn = self.conn()?;
        load_attachment(&conn, uuid)
    }

    fn list_attachments(&self, card_uuid: EntityId) -> StoreResult<Vec<Attachment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{ATTACHMENT_SELECT_SQL} WHERE card_uuid = ?1 ORDER BY created_at ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([card_uuid.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_attachment_row(row)?);
        }
        Ok(items)
    }

    fn delete_attachment(&self, uuid: AttachmentId) -> StoreResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM attachments WHERE uuid = ?1;",
            [uuid.to_string()],
        )?;
        ensure_changed(changed, "attachment", uuid)
    }

    fn board_statistics(&self) -> StoreResult<Vec<BoardStats>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT
                b.uuid,
                b.title,
                (SELECT COUNT(*) FROM board_lists l WHERE l.board_uuid = b.uuid),
                (SELECT COUNT(*)
                 FROM cards c
                 INNER JOIN board_lists l ON l.uuid = c.list_uuid
                 WHERE l.board_uuid = b.uuid)
             FROM boards b
             ORDER BY b.owner_uuid ASC, b.position ASC, b.uuid ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let uuid_text: String = row.get(0)?;
            items.push(BoardStats {
                uuid: parse_uuid(&uuid_text, "boards.uuid")?,
                title: row.get(1)?,
                lists_count: parse_count(row.get(2)?),
                cards_count: parse_count(row.get(3)?),
            });
        }
        Ok(items)
    }

    fn duplicate_positions(&self) -> StoreResult<Vec<DuplicatePosition>> {
        let conn = self.conn()?;
        let mut duplicates = Vec::new();
        for kind in [EntityKind::Board, EntityKind::List, EntityKind::Card] {
            let column = kind.parent_column();
            let mut stmt = conn.prepare(&format!(
                "SELECT {column}, position, COUNT(*)
                 FROM {table}
                 GROUP BY {column}, position
                 HAVING COUNT(*) > 1
                 ORDER BY {column} ASC, position ASC;",
                table = kind.table(),
            ))?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let parent_text: String = row.get(0)?;
                duplicates.push(DuplicatePosition {
                    key: SiblingSetKey::new(kind, parse_uuid(&parent_text, column)?),
                    position: row.get(1)?,
                    count: parse_count(row.get(2)?),
                });
            }
        }
        Ok(duplicates)
    }
}

const BOARD_SELECT_SQL: &str = "SELECT
    uuid,
    owner_uuid,
    title,
    description,
    position,
    created_at
FROM boards";

const LIST_SELECT_SQL: &str = "SELECT
    uuid,
    board_uuid,
    title,
    position,
    created_at
FROM board_lists";

const CARD_SELECT_SQL: &str = "SELECT
    uuid,
    list_uuid,
    title,
    description,
    position,
    created_at
FROM cards";

const ATTACHMENT_SELECT_SQL: &str = "SELECT
    uuid,
    card_uuid,
    filename,
    original_name,
    mime_type,
    path,
    size,
    created_at
FROM attachments";

fn load_board(conn: &Connection, uuid: EntityId) -> StoreResult<Option<Board>> {
    let mut stmt = conn.prepare(&format!("{BOARD_SELECT_SQL} WHERE uuid = ?1;"))?;
    let mut rows = stmt.query([uuid.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_board_row(row)?));
    }
    Ok(None)
}

fn load_list(conn: &Connection, uuid: EntityId) -> StoreResult<Option<BoardList>> {
    let mut stmt = conn.prepare(&format!("{LIST_SELECT_SQL} WHERE uuid = ?1;"))?;
    let mut rows = stmt.query([uuid.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_list_row(row)?));
    }
    Ok(None)
}

fn load_card(conn: &Connection, uuid: EntityId) -> StoreResult<Option<Card>> {
    let mut stmt = conn.prepare(&format!("{CARD_SELECT_SQL} WHERE uuid = ?1;"))?;
    let mut rows = stmt.query([uuid.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_card_row(row)?));
    }
    Ok(None)
}

fn load_attachment(conn: &Connection, uuid: AttachmentId) -> StoreResult<Option<Attachment>> {
    let mut stmt = conn.prepare(&format!("{ATTACHMENT_SELECT_SQL} WHERE uuid = ?1;"))?;
    let mut rows = stmt.query([uuid.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_attachment_row(row)?));
    }
    Ok(None)
}

fn load_high_water(conn: &Connection, key: SiblingSetKey) -> StoreResult<i64> {
    let value: Option<i64> = conn
        .query_row(
            "SELECT high_water
             FROM sibling_sets
             WHERE member_kind = ?1
               AND parent_uuid = ?2;",
            params![key.kind.as_str(), key.parent_uuid.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.unwrap_or(0))
}

fn raise_high_water(conn: &Connection, key: SiblingSetKey, position: i64) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO sibling_sets (member_kind, parent_uuid, high_water)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (member_kind, parent_uuid)
         DO UPDATE SET high_water = MAX(high_water, excluded.high_water);",
        params![key.kind.as_str(), key.parent_uuid.to_string(), position],
    )?;
    Ok(())
}

fn reset_high_water(
    conn: &Connection,
    key: SiblingSetKey,
    assignments: &[(EntityId, i64)],
) -> StoreResult<()> {
    let max = assignments
        .iter()
        .map(|(_, position)| *position)
        .max()
        .unwrap_or(0);
    conn.execute(
        "INSERT INTO sibling_sets (member_kind, parent_uuid, high_water)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (member_kind, parent_uuid)
         DO UPDATE SET high_water = excluded.high_water;",
        params![key.kind.as_str(), key.parent_uuid.to_string(), max],
    )?;
    Ok(())
}

fn apply_renumbering(
    conn: &Connection,
    key: SiblingSetKey,
    placement: &Placement,
) -> StoreResult<()> {
    if placement.renumbered.is_empty() {
        return Ok(());
    }
    write_assignments(conn, key, &placement.renumbered)?;
    reset_high_water(conn, key, &placement.renumbered)
}

/// Writes final positions in two passes so `UNIQUE (parent, position)` never
/// sees a transient collision: first every member parks on a distinct
/// negative slot, then each takes its final value.
fn write_assignments(
    conn: &Connection,
    key: SiblingSetKey,
    assignments: &[(EntityId, i64)],
) -> StoreResult<()> {
    let sql = format!(
        "UPDATE {table} SET {parent} = ?2, position = ?3 WHERE uuid = ?1;",
        table = key.kind.table(),
        parent = key.kind.parent_column(),
    );
    let parent = key.parent_uuid.to_string();

    for (index, (uuid, _)) in assignments.iter().enumerate() {
        let parked = -(index as i64) - 1;
        let changed = conn.execute(&sql, params![uuid.to_string(), parent, parked])?;
        ensure_changed(changed, key.kind.as_str(), *uuid)?;
    }
    for (uuid, position) in assignments {
        conn.execute(&sql, params![uuid.to_string(), parent, position])?;
    }
    Ok(())
}

fn collect_strings(conn: &Connection, sql: &str, param: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([param])?;
    let mut values = Vec::new();
    while let Some(row) = rows.next()? {
        values.push(row.get(0)?);
    }
    Ok(values)
}

fn ensure_changed(changed: usize, kind: &'static str, uuid: Uuid) -> StoreResult<()> {
    if changed == 0 {
        return Err(StoreError::RowNotFound { kind, uuid });
    }
    Ok(())
}

fn parse_entry_row(row: &Row<'_>, kind: EntityKind) -> StoreResult<SiblingEntry> {
    let uuid_text: String = row.get("uuid")?;
    let parent_text: String = row.get("parent_uuid")?;
    Ok(SiblingEntry {
        uuid: parse_uuid(&uuid_text, kind.table())?,
        parent_uuid: parse_uuid(&parent_text, kind.parent_column())?,
        position: row.get("position")?,
    })
}

fn parse_board_row(row: &Row<'_>) -> StoreResult<Board> {
    let uuid_text: String = row.get("uuid")?;
    let owner_text: String = row.get("owner_uuid")?;
    Ok(Board {
        uuid: parse_uuid(&uuid_text, "boards.uuid")?,
        owner_uuid: parse_uuid(&owner_text, "boards.owner_uuid")?,
        title: row.get("title")?,
        description: row.get("description")?,
        position: row.get("position")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_list_row(row: &Row<'_>) -> StoreResult<BoardList> {
    let uuid_text: String = row.get("uuid")?;
    let board_text: String = row.get("board_uuid")?;
    Ok(BoardList {
        uuid: parse_uuid(&uuid_text, "board_lists.uuid")?,
        board_uuid: parse_uuid(&board_text, "board_lists.board_uuid")?,
        title: row.get("title")?,
        position: row.get("position")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_card_row(row: &Row<'_>) -> StoreResult<Card> {
    let uuid_text: String = row.get("uuid")?;
    let list_text: String = row.get("list_uuid")?;
    Ok(Card {
        uuid: parse_uuid(&uuid_text, "cards.uuid")?,
        list_uuid: parse_uuid(&list_text, "cards.list_uuid")?,
        title: row.get("title")?,
        description: row.get("description")?,
        position: row.get("position")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_attachment_row(row: &Row<'_>) -> StoreResult<Attachment> {
    let uuid_text: String = row.get("uuid")?;
    let card_text: String = row.get("card_uuid")?;
    Ok(Attachment {
        uuid: parse_uuid(&uuid_text, "attachments.uuid")?,
        card_uuid: parse_uuid(&card_text, "attachments.card_uuid")?,
        filename: row.get("filename")?,
        original_name: row.get("original_name")?,
        mime_type: row.get("mime_type")?,
        path: row.get("path")?,
        size: row.get("size")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn parse_uuid(value: &str, column: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn ensure_hierarchy_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in [
        "boards",
        "board_lists",
        "cards",
        "sibling_sets",
        "attachments",
    ] {
        if !table_exists(conn, table)? {
            return Err(StoreError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
