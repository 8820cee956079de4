//! Hierarchy use-case services.
//!
//! # Responsibility
//! - Expose the board/list/card API consumed by outer layers.
//! - Keep collaborator contracts (blob storage, metrics) at this boundary.

pub mod attachments;
pub mod collaborators;
pub mod hierarchy_api;
pub mod stats;
