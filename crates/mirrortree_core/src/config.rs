//! Engine configuration constants.
//!
//! # Responsibility
//! - Own every constant the synchronization engine consumes: tree roots,
//!   node types, container markers, the link reference property and its
//!   null sentinel, and the default display-name language.
//!
//! # Invariants
//! - `primary_root` and `mirror_root` are absolute paths and never equal.
//! - Marker tags and properties are asserted on every container the engine
//!   creates or moves.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One required (name, value) marker property for container nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerProperty {
    pub name: String,
    pub value: String,
}

/// Configuration consumed by the mirror synchronization engine.
///
/// Hosts construct this once and hand it to the listener; the engine never
/// reads ambient configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Root of the authoritative content tree.
    pub primary_root: String,
    /// Root of the mirrored asset container tree.
    pub mirror_root: String,
    /// Node type used when provisioning mirror container folders.
    pub container_type: String,
    /// Node type identifying primary-tree folders during classification.
    pub folder_type: String,
    /// Marker tags every container node must carry.
    pub marker_tags: [String; 2],
    /// Marker properties every container node must carry.
    pub marker_properties: [MarkerProperty; 2],
    /// Property on link nodes holding the target node id.
    pub ref_property: String,
    /// Reserved reference value meaning "no target".
    pub null_ref_sentinel: String,
    /// Fallback language for display names stored with a blank language key.
    pub default_language: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            primary_root: "/content/documents".to_string(),
            mirror_root: "/content/assets".to_string(),
            container_type: "asset-folder".to_string(),
            folder_type: "folder".to_string(),
            marker_tags: ["referenceable".to_string(), "localized".to_string()],
            marker_properties: [
                MarkerProperty {
                    name: "folder-kind".to_string(),
                    value: "asset-container".to_string(),
                },
                MarkerProperty {
                    name: "collection-kind".to_string(),
                    value: "asset-set".to_string(),
                },
            ],
            ref_property: "link-target".to_string(),
            null_ref_sentinel: Uuid::nil().to_string(),
            default_language: "en".to_string(),
        }
    }
}
