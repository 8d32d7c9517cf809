//! Node store contract and read models.
//!
//! # Responsibility
//! - Define the back-end surface the synchronization engine depends on:
//!   lookup, existence checks, atomic move, node creation, tags, scalar
//!   properties, display names, subtree-scoped link queries, and session
//!   scope control.
//!
//! # Invariants
//! - `node_uuid` is stable for a node's whole lifetime; moves never change it.
//! - Display-name language is unique per node.
//! - `move_node` is atomic: it either relocates the whole subtree or fails
//!   without visible effect.

use crate::db::DbError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable node identifier.
pub type NodeId = Uuid;

/// Result type used by node store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from node store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// No node exists at the given path.
    NodeNotFound(String),
    /// The parent of a create/move target does not exist.
    ParentNotFound(String),
    /// A move/create target path is already occupied.
    TargetExists(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NodeNotFound(path) => write!(f, "node not found: {path}"),
            Self::ParentNotFound(path) => write!(f, "parent node not found: {path}"),
            Self::TargetExists(path) => write!(f, "target path already occupied: {path}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "node store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "node store requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid node data: {message}"),
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

/// Node read model with its derived absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNode {
    /// Stable node id.
    pub node_uuid: NodeId,
    /// Parent node id. `None` means top-level node.
    pub parent_uuid: Option<NodeId>,
    /// Leaf name within the parent.
    pub name: String,
    /// Node type tag.
    pub node_type: String,
    /// Absolute path derived from parent links.
    pub path: String,
}

/// One (language, display text) pair attached to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayName {
    /// Language code. May be blank on legacy data; blank falls back to the
    /// configured default language during synchronization.
    pub language: String,
    /// Display text for that language.
    pub message: String,
}

/// One discovered link inside a content subtree.
///
/// The target is kept as the raw stored reference value; resolution and
/// validation happen in the reverse reference finder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReference {
    /// Node carrying the reference property.
    pub source_uuid: NodeId,
    /// Raw reference value (a node id in well-formed data).
    pub target: String,
}

/// Back-end contract consumed by the synchronization engine.
///
/// Session scope: `begin` opens one implicit write scope, `save` persists it,
/// `refresh` discards uncommitted changes. `save` and `refresh` are safe
/// no-ops without an active scope, which lets the dispatcher run its
/// unconditional discard pass after every event.
pub trait NodeStore {
    /// Opens a write scope. Idempotent while a scope is active.
    fn begin(&self) -> StoreResult<()>;
    /// Persists the active write scope.
    fn save(&self) -> StoreResult<()>;
    /// Discards uncommitted changes in the active write scope.
    fn refresh(&self) -> StoreResult<()>;

    /// Loads one node by id.
    fn node_by_id(&self, node_uuid: NodeId) -> StoreResult<Option<StoredNode>>;
    /// Loads one node by absolute path.
    fn node_by_path(&self, path: &str) -> StoreResult<Option<StoredNode>>;
    /// Returns whether a node exists at the given path.
    fn node_exists(&self, path: &str) -> StoreResult<bool>;
    /// Returns whether the node has a direct child with the given name.
    fn has_child(&self, node_uuid: NodeId, name: &str) -> StoreResult<bool>;

    /// Creates one node under an optional parent.
    fn create_node(
        &self,
        parent_uuid: Option<NodeId>,
        name: &str,
        node_type: &str,
    ) -> StoreResult<StoredNode>;
    /// Atomically moves the node at `old_path` (with its subtree) to
    /// `new_path`. Fails when the target is occupied or its parent missing.
    fn move_node(&self, old_path: &str, new_path: &str) -> StoreResult<()>;

    /// Attaches a marker tag. Returns `true` when newly attached.
    fn add_tag(&self, node_uuid: NodeId, tag: &str) -> StoreResult<bool>;
    /// Returns whether the node carries the tag.
    fn has_tag(&self, node_uuid: NodeId, tag: &str) -> StoreResult<bool>;

    /// Sets a scalar property. Returns `true` when the value changed.
    fn set_property(&self, node_uuid: NodeId, name: &str, value: &str) -> StoreResult<bool>;
    /// Reads a scalar property.
    fn property(&self, node_uuid: NodeId, name: &str) -> StoreResult<Option<String>>;

    /// Lists display names ordered by language.
    fn display_names(&self, node_uuid: NodeId) -> StoreResult<Vec<DisplayName>>;
    /// Upserts one display name by language. Returns `true` when the entry
    /// was created or its message changed.
    fn set_display_name(
        &self,
        node_uuid: NodeId,
        language: &str,
        message: &str,
    ) -> StoreResult<bool>;

    /// Runs one structural query scoped to the subtree at `root_path`,
    /// returning link nodes whose `ref_property` is set, non-blank and not
    /// equal to `sentinel`. A missing root yields an empty result.
    fn find_links_in_subtree(
        &self,
        root_path: &str,
        ref_property: &str,
        sentinel: &str,
    ) -> StoreResult<Vec<LinkReference>>;
}
