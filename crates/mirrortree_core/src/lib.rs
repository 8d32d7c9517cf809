//! Core engine keeping an asset container tree structurally mirrored to a
//! content tree inside one shared node repository.
//!
//! The engine is an embedded, always-running listener: hosts register
//! [`MirrorSyncListener`] on an event channel and the engine restructures the
//! mirror tree whenever the primary tree changes shape.

pub mod config;
pub mod db;
pub mod logging;
pub mod pathmap;
pub mod store;
pub mod sync;

pub use config::{MarkerProperty, MirrorConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use store::node_store::{
    DisplayName, LinkReference, NodeId, NodeStore, StoreError, StoreResult, StoredNode,
};
pub use store::sqlite_store::SqliteNodeStore;
pub use sync::bus::{EventChannel, EventHandler, LocalEventChannel};
pub use sync::dispatcher::MirrorSyncListener;
pub use sync::events::{ChangeEvent, ChangeKind, StructuralChange};
pub use sync::synchronizer::{MirrorSynchronizer, SyncReport};
pub use sync::{SyncError, SyncResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
