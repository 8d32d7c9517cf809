//! Reverse reference discovery for content subtrees.
//!
//! # Responsibility
//! - Find every mirror container referenced by a link node inside one
//!   content subtree, via a single subtree-scoped structural query.
//!
//! # Invariants
//! - Unresolvable or misplaced references are skipped with a warning, never
//!   fatal; only back-end failures abort.
//! - The result is deduplicated by container path and deterministically
//!   ordered.

use crate::config::MirrorConfig;
use crate::pathmap;
use crate::store::node_store::{NodeStore, StoredNode};
use crate::sync::SyncResult;
use log::warn;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Returns the parent container folders of every mirror node referenced from
/// inside the subtree at `subtree_root`.
pub fn linked_container_parents<S: NodeStore>(
    store: &S,
    config: &MirrorConfig,
    subtree_root: &str,
) -> SyncResult<Vec<StoredNode>> {
    let links = store.find_links_in_subtree(
        subtree_root,
        &config.ref_property,
        &config.null_ref_sentinel,
    )?;

    let mut parents: BTreeMap<String, StoredNode> = BTreeMap::new();
    for link in links {
        let target_uuid = match Uuid::parse_str(&link.target) {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    "event=reverse_refs module=sync status=skip reason=malformed_ref source={} value={}",
                    link.source_uuid, link.target
                );
                continue;
            }
        };

        let target = match store.node_by_id(target_uuid)? {
            Some(node) => node,
            None => {
                warn!(
                    "event=reverse_refs module=sync status=skip reason=dangling_ref source={} target={target_uuid}",
                    link.source_uuid
                );
                continue;
            }
        };

        if pathmap::relativize(&target.path, &config.mirror_root).is_none() {
            continue;
        }

        let Some(parent_uuid) = target.parent_uuid else {
            continue;
        };
        let parent = match store.node_by_id(parent_uuid)? {
            Some(node) => node,
            None => {
                warn!(
                    "event=reverse_refs module=sync status=skip reason=orphan_target target={target_uuid}"
                );
                continue;
            }
        };

        parents.entry(parent.path.clone()).or_insert(parent);
    }

    Ok(parents.into_values().collect())
}
