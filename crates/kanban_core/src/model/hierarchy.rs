//! Board / List / Card domain records and sibling-set addressing.
//!
//! # Responsibility
//! - Define the three positioned entity kinds and their read models.
//! - Name sibling sets (`kind + parent`) so locks and queries share one key.
//!
//! # Invariants
//! - `position` is unique inside one sibling set and only orders members.
//! - Every list references one board, every card one list, every board one
//!   owner. Parents are referenced by id, never by embedded objects.
//! - `SiblingSetKey` ordering puts card sets before list sets before board
//!   sets, then ascending parent id. Multi-set locking follows this order.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a board, list or card.
pub type EntityId = Uuid;

/// Identifier of the external principal owning a board.
pub type OwnerId = Uuid;

/// Positioned entity kind.
///
/// Declaration order matters: it is the lock order for multi-set operations
/// (children before parents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Card,
    List,
    Board,
}

impl EntityKind {
    /// Stable lowercase name used in logs, errors and the `sibling_sets` table.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::List => "list",
            Self::Board => "board",
        }
    }

    /// Kind of the parent row, `None` for boards (owned by an external owner).
    pub fn parent_kind(self) -> Option<EntityKind> {
        match self {
            Self::Card => Some(Self::List),
            Self::List => Some(Self::Board),
            Self::Board => None,
        }
    }

    /// Kind of the rows this kind contains.
    pub fn child_kind(self) -> Option<EntityKind> {
        match self {
            Self::Card => None,
            Self::List => Some(Self::Card),
            Self::Board => Some(Self::List),
        }
    }

    pub(crate) fn table(self) -> &'static str {
        match self {
            Self::Card => "cards",
            Self::List => "board_lists",
            Self::Board => "boards",
        }
    }

    pub(crate) fn parent_column(self) -> &'static str {
        match self {
            Self::Card => "list_uuid",
            Self::List => "board_uuid",
            Self::Board => "owner_uuid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "card" => Some(Self::Card),
            "list" => Some(Self::List),
            "board" => Some(Self::Board),
            _ => None,
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of one sibling set: all members of `kind` under `parent_uuid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiblingSetKey {
    /// Kind of the members (not of the parent).
    pub kind: EntityKind,
    /// Board id for lists, list id for cards, owner id for boards.
    pub parent_uuid: Uuid,
}

impl SiblingSetKey {
    pub fn new(kind: EntityKind, parent_uuid: Uuid) -> Self {
        Self { kind, parent_uuid }
    }

    /// Cards of one list.
    pub fn cards_of(list_uuid: EntityId) -> Self {
        Self::new(EntityKind::Card, list_uuid)
    }

    /// Lists of one board.
    pub fn lists_of(board_uuid: EntityId) -> Self {
        Self::new(EntityKind::List, board_uuid)
    }

    /// Boards of one owner.
    pub fn boards_of(owner_uuid: OwnerId) -> Self {
        Self::new(EntityKind::Board, owner_uuid)
    }
}

impl Display for SiblingSetKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s@{}", self.kind, self.parent_uuid)
    }
}

/// Positional projection shared by all three kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiblingEntry {
    pub uuid: EntityId,
    pub parent_uuid: Uuid,
    pub position: i64,
}

/// One sibling set read back in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingSet {
    pub key: SiblingSetKey,
    /// Sorted by `position ASC, uuid ASC`.
    pub members: Vec<SiblingEntry>,
    /// Highest position ever handed out in this set since its last renumbering.
    pub high_water: i64,
}

impl SiblingSet {
    pub fn positions(&self) -> Vec<i64> {
        self.members.iter().map(|member| member.position).collect()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.members.iter().map(|member| member.uuid).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Top-level board, ordered among the boards of its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub uuid: EntityId,
    pub owner_uuid: OwnerId,
    pub title: String,
    pub description: Option<String>,
    pub position: i64,
    /// Epoch ms.
    pub created_at: i64,
}

/// Column of a board, ordered among the lists of its board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardList {
    pub uuid: EntityId,
    pub board_uuid: EntityId,
    pub title: String,
    pub position: i64,
    /// Epoch ms.
    pub created_at: i64,
}

/// Card, ordered among the cards of its list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub uuid: EntityId,
    pub list_uuid: EntityId,
    pub title: String,
    pub description: Option<String>,
    pub position: i64,
    /// Epoch ms.
    pub created_at: i64,
}

/// Insert payload for a board. Position is chosen under the sibling lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBoard {
    pub owner_uuid: OwnerId,
    pub title: String,
    pub description: Option<String>,
    /// Title of a list inserted at position 1 together with the board.
    pub first_list_title: Option<String>,
}

/// Insert payload for a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewList {
    pub board_uuid: EntityId,
    pub title: String,
}

/// Insert payload for a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCard {
    pub list_uuid: EntityId,
    pub title: String,
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{EntityKind, SiblingSetKey};
    use uuid::Uuid;

    #[test]
    fn sibling_keys_sort_children_before_parents() {
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);
        let mut keys = vec![
            SiblingSetKey::boards_of(low),
            SiblingSetKey::lists_of(low),
            SiblingSetKey::cards_of(high),
            SiblingSetKey::cards_of(low),
        ];
        keys.sort();

        assert_eq!(
            keys,
            vec![
                SiblingSetKey::cards_of(low),
                SiblingSetKey::cards_of(high),
                SiblingSetKey::lists_of(low),
                SiblingSetKey::boards_of(low),
            ]
        );
    }

    #[test]
    fn kind_names_roundtrip() {
        for kind in [EntityKind::Card, EntityKind::List, EntityKind::Board] {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("folder"), None);
    }
}
