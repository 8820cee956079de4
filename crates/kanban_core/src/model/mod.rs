//! Domain model for positioned boards, lists and cards.
//!
//! # Responsibility
//! - Define the records shared by the store, engine and API layers.
//! - Keep parent links id-based so lock scope is one sibling set at a time.
//!
//! # Invariants
//! - Every entity is identified by a stable v4 `Uuid`.
//! - Deletion is a hard delete; no tombstoned rows are ever reachable.

pub mod attachment;
pub mod hierarchy;
