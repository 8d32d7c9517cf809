//! Idempotent mirror ancestor-chain provisioning.
//!
//! # Responsibility
//! - Walk a mirror-relative path segment by segment, creating missing
//!   container folders with their marker tags, marker properties and
//!   display names copied from the matching primary ancestors.
//!
//! # Invariants
//! - A repeated call with identical input performs zero further writes.
//! - Any step failure propagates, aborting the enclosing transaction; no
//!   partially created chain ever becomes visible.

use crate::config::MirrorConfig;
use crate::pathmap;
use crate::store::node_store::{NodeStore, StoreError};
use crate::sync::names::merge_display_names;
use crate::sync::SyncResult;
use log::debug;

/// Ensures every folder along `rel_path` exists under the mirror root.
/// Returns whether anything was created.
pub fn ensure_mirror_ancestors<S: NodeStore>(
    store: &S,
    config: &MirrorConfig,
    rel_path: &str,
) -> SyncResult<bool> {
    if rel_path.is_empty() {
        return Ok(false);
    }

    let mut cursor = store
        .node_by_path(&config.mirror_root)?
        .ok_or_else(|| StoreError::NodeNotFound(config.mirror_root.clone()))?;
    let mut partial_rel = String::new();
    let mut created_any = false;

    for segment in pathmap::segments(rel_path) {
        if !partial_rel.is_empty() {
            partial_rel.push('/');
        }
        partial_rel.push_str(segment);

        let child_path = format!("{}/{segment}", cursor.path);
        if let Some(existing) = store.node_by_path(&child_path)? {
            cursor = existing;
            continue;
        }

        let created = store.create_node(
            Some(cursor.node_uuid),
            segment,
            &config.container_type,
        )?;
        for tag in &config.marker_tags {
            store.add_tag(created.node_uuid, tag)?;
        }
        for marker in &config.marker_properties {
            store.set_property(created.node_uuid, &marker.name, &marker.value)?;
        }

        // Display names come from the structurally matching primary ancestor.
        let primary_ancestor_path = pathmap::absolutize(&partial_rel, &config.primary_root);
        if let Some(primary_ancestor) = store.node_by_path(&primary_ancestor_path)? {
            merge_display_names(store, config, primary_ancestor.node_uuid, created.node_uuid)?;
        }

        debug!(
            "event=provision module=sync status=ok path={} type={}",
            created.path, config.container_type
        );
        created_any = true;
        cursor = created;
    }

    Ok(created_any)
}
