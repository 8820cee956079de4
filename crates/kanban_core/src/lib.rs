//! Core of the kanban hierarchy: boards, lists and cards with explicit
//! positions, kept unique and totally ordered under concurrent edits.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, HierarchyConfig};
pub use engine::lock::{LockError, SiblingLocks};
pub use engine::position::{PositionAssigner, Slot};
pub use error::{HierarchyError, HierarchyResult};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use model::attachment::{Attachment, AttachmentId};
pub use model::hierarchy::{
    Board, BoardList, Card, EntityId, EntityKind, OwnerId, SiblingEntry, SiblingSet,
    SiblingSetKey,
};
pub use repo::hierarchy_repo::{
    BoardStats, DeleteOutcome, DuplicatePosition, HierarchyStore, Placement, PositionUpdate,
    SqliteHierarchyStore, StoreError, StoreResult,
};
pub use service::attachments::{AttachmentUrl, DEFAULT_URL_EXPIRY};
pub use service::collaborators::{BlobError, BlobStore, MetricsSink, NoopMetricsSink, SinkError};
pub use service::hierarchy_api::HierarchyApi;
pub use service::stats::HierarchyStats;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
