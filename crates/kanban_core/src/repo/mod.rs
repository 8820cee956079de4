//! Repository layer: persistence contracts and SQLite implementation.
//!
//! # Responsibility
//! - Define the storage contract the positioning engine depends on.
//! - Isolate SQLite query details from engine and API orchestration.
//!
//! # Invariants
//! - Store APIs return semantic errors (`RowNotFound`) in addition to DB
//!   transport errors.

pub mod hierarchy_repo;
