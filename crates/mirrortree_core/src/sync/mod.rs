//! Mirror synchronization engine.
//!
//! # Responsibility
//! - Keep the asset container tree structurally aligned with the content
//!   tree: detect structural changes, discover linked containers, compute
//!   and apply moves/creations atomically.
//!
//! # Invariants
//! - One event maps to one scoped back-end transaction; it commits as a
//!   whole or leaves no visible change.
//! - No failure ever propagates out to the event-delivery mechanism.
//! - Primary-tree deletions are never propagated (intentional gap; stale
//!   containers require a later structural event or manual repair).

use crate::store::node_store::{NodeId, StoreError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod bus;
pub mod dispatcher;
pub mod events;
pub mod names;
pub mod provision;
pub mod reverse_refs;
pub mod synchronizer;

/// Result type used by synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors from synchronization operations.
///
/// Every variant is terminal for the current event: the dispatcher logs it,
/// discards uncommitted changes, and treats the event as handled.
#[derive(Debug)]
pub enum SyncError {
    /// Back-end failure mid-event.
    Store(StoreError),
    /// Event arrived without its expected arguments.
    MalformedEvent(String),
    /// Subject id no longer resolves to a node.
    SubjectNotFound(NodeId),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::MalformedEvent(message) => write!(f, "malformed event: {message}"),
            Self::SubjectNotFound(id) => write!(f, "event subject not found: {id}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::MalformedEvent(_) => None,
            Self::SubjectNotFound(_) => None,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
