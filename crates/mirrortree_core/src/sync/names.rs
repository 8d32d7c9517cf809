//! Display-name replace-by-language merge.
//!
//! # Responsibility
//! - Copy per-language display names from a primary node onto a mirror
//!   container with the additive policy: existing languages are updated in
//!   place, new languages appended, target-only languages preserved.
//!
//! # Invariants
//! - A blank source language key is stored under the configured default
//!   language; when that is also blank, no entry is created.
//! - Re-running the merge with unchanged source data performs zero writes.

use crate::config::MirrorConfig;
use crate::store::node_store::{NodeId, NodeStore};
use crate::sync::SyncResult;

/// Merges display names from `source` onto `target`. Returns whether any
/// entry was created or changed.
pub fn merge_display_names<S: NodeStore>(
    store: &S,
    config: &MirrorConfig,
    source: NodeId,
    target: NodeId,
) -> SyncResult<bool> {
    let mut updated = false;

    for entry in store.display_names(source)? {
        let language = if entry.language.trim().is_empty() {
            if config.default_language.trim().is_empty() {
                continue;
            }
            config.default_language.as_str()
        } else {
            entry.language.as_str()
        };

        if store.set_display_name(target, language, &entry.message)? {
            updated = true;
        }
    }

    Ok(updated)
}
