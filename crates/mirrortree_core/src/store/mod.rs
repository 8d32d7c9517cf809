//! Repository back-end abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the node store contract consumed by the synchronization engine.
//! - Isolate SQLite query details from engine orchestration.
//!
//! # Invariants
//! - Store APIs return semantic errors (`NodeNotFound`, `TargetExists`) in
//!   addition to DB transport errors.
//! - Mutating calls report whether they changed anything, so callers can
//!   honor zero-write idempotence contracts.

pub mod node_store;
pub mod sqlite_store;
