//! Mirror synchronizer state machine.
//!
//! # Responsibility
//! - Per structural change: Resolve the subject, Locate linked containers,
//!   Compute required moves, Apply them with marker healing and display-name
//!   merge, then Commit once or leave rollback to the caller.
//!
//! # Invariants
//! - A qualifying container ends the event at the path mirroring its
//!   primary counterpart, carrying both marker tags and properties.
//! - An event that computes no change issues zero writes.
//! - Containers are never deleted here; primary deletions are not mirrored.

use crate::config::MirrorConfig;
use crate::pathmap;
use crate::store::node_store::{NodeStore, StoreError, StoredNode};
use crate::sync::events::{ChangeKind, StructuralChange};
use crate::sync::provision::ensure_mirror_ancestors;
use crate::sync::names::merge_display_names;
use crate::sync::reverse_refs::linked_container_parents;
use crate::sync::{SyncError, SyncResult};
use log::{debug, info, warn};
use std::collections::HashSet;

/// Outcome summary for one synchronized event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Containers discovered by reverse-reference lookup.
    pub candidates: usize,
    /// Containers actually moved.
    pub moved: usize,
    /// Whether any write happened (moves, provisioning, marker healing or
    /// display-name updates).
    pub updated: bool,
}

impl SyncReport {
    fn empty() -> Self {
        Self::default()
    }
}

/// Synchronizes mirror containers after primary-tree structural changes.
pub struct MirrorSynchronizer<'a, S: NodeStore> {
    store: &'a S,
    config: &'a MirrorConfig,
}

/// Per-event apply state: moves already performed and the running change
/// flags.
struct ApplyState {
    applied_targets: HashSet<String>,
    moved: usize,
    changed: bool,
}

impl<'a, S: NodeStore> MirrorSynchronizer<'a, S> {
    pub fn new(store: &'a S, config: &'a MirrorConfig) -> Self {
        Self { store, config }
    }

    /// Runs the Resolve→Locate→Compute→Apply→Commit pipeline for one change.
    ///
    /// On error the caller owns rollback; on success any accumulated writes
    /// have been committed exactly once.
    pub fn synchronize(&self, change: &StructuralChange) -> SyncResult<SyncReport> {
        // Resolve: the repository already holds post-change state.
        let subject = self
            .store
            .node_by_id(change.subject_uuid)?
            .ok_or(SyncError::SubjectNotFound(change.subject_uuid))?;
        if pathmap::relativize_or_empty(&subject.path, &self.config.primary_root).is_none() {
            debug!(
                "event=mirror_sync module=sync status=skip reason=outside_primary_root path={}",
                subject.path
            );
            return Ok(SyncReport::empty());
        }

        let report = match change.kind {
            ChangeKind::FolderRename => self.sync_folder_rename(&subject, change)?,
            ChangeKind::LeafRename => self.sync_leaf_rename(&subject)?,
            ChangeKind::SubtreeMove => self.sync_subtree_move(&subject, change)?,
        };

        // Commit: one save when anything changed, zero writes otherwise.
        if report.updated {
            self.store.save()?;
        }
        Ok(report)
    }

    /// FolderRename: the subject is the parent folder; arguments carry the
    /// renamed child's old and new leaf names.
    fn sync_folder_rename(
        &self,
        subject: &StoredNode,
        change: &StructuralChange,
    ) -> SyncResult<SyncReport> {
        let (old_name, new_name) = match (&change.old_name, &change.new_name) {
            (Some(old_name), Some(new_name)) => (old_name, new_name),
            _ => {
                return Err(SyncError::MalformedEvent(
                    "folder rename without old/new name arguments".to_string(),
                ))
            }
        };

        let new_child_path = format!("{}/{new_name}", subject.path);
        let new_child = match self.store.node_by_path(&new_child_path)? {
            Some(node) => node,
            None => {
                debug!(
                    "event=mirror_sync module=sync status=skip reason=renamed_child_missing path={new_child_path}"
                );
                return Ok(SyncReport::empty());
            }
        };

        let old_folder_path = format!("{}/{old_name}", subject.path);
        let Some(old_rel) = pathmap::relativize(&old_folder_path, &self.config.primary_root)
        else {
            return Ok(SyncReport::empty());
        };
        let Some(new_rel) = pathmap::relativize(&new_child.path, &self.config.primary_root) else {
            return Ok(SyncReport::empty());
        };

        // Locate over the renamed child's subtree.
        let candidates = linked_container_parents(self.store, self.config, &new_child.path)?;
        let mut state = ApplyState::new();

        for candidate in &candidates {
            let Some(cand_rel) = pathmap::relativize(&candidate.path, &self.config.mirror_root)
            else {
                continue;
            };
            if !pathmap::starts_with_segments(cand_rel, old_rel) {
                continue;
            }

            // Every qualifying candidate maps to the same interim folder
            // move; repeats collapse into already-applied skips.
            let source = pathmap::absolutize(old_rel, &self.config.mirror_root);
            let target = pathmap::absolutize(new_rel, &self.config.mirror_root);
            self.apply(&source, &target, &new_child, &mut state)?;
        }

        Ok(state.into_report(candidates.len()))
    }

    /// LeafRename: the subject is the handle carrying its new leaf name.
    fn sync_leaf_rename(&self, subject: &StoredNode) -> SyncResult<SyncReport> {
        let Some(subject_parent_rel) = self.parent_rel(&subject.path, &self.config.primary_root)
        else {
            return Ok(SyncReport::empty());
        };

        let candidates = linked_container_parents(self.store, self.config, &subject.path)?;
        let mut state = ApplyState::new();

        for candidate in &candidates {
            let Some(cand_parent_rel) = self.parent_rel(&candidate.path, &self.config.mirror_root)
            else {
                continue;
            };
            if cand_parent_rel != subject_parent_rel {
                continue;
            }

            let target = match pathmap::parent_path(&candidate.path) {
                Some(parent) => format!("{parent}/{}", subject.name),
                None => continue,
            };
            self.apply(&candidate.path, &target, subject, &mut state)?;
        }

        Ok(state.into_report(candidates.len()))
    }

    /// SubtreeMove: the event path is the old location; the subject already
    /// sits at the new one.
    fn sync_subtree_move(
        &self,
        subject: &StoredNode,
        change: &StructuralChange,
    ) -> SyncResult<SyncReport> {
        let Some(old_rel) =
            pathmap::relativize(&change.subject_path, &self.config.primary_root)
        else {
            debug!(
                "event=mirror_sync module=sync status=skip reason=old_path_outside_root path={}",
                change.subject_path
            );
            return Ok(SyncReport::empty());
        };
        let Some(new_rel) = pathmap::relativize(&subject.path, &self.config.primary_root) else {
            return Ok(SyncReport::empty());
        };
        if old_rel == new_rel {
            info!(
                "event=mirror_sync module=sync status=noop reason=same_path path={}",
                subject.path
            );
            return Ok(SyncReport::empty());
        }

        let Some(subject_parent_rel) = self.parent_rel(&subject.path, &self.config.primary_root)
        else {
            return Ok(SyncReport::empty());
        };

        let candidates = linked_container_parents(self.store, self.config, &subject.path)?;
        let mut state = ApplyState::new();

        for candidate in &candidates {
            let Some(cand_rel) = pathmap::relativize(&candidate.path, &self.config.mirror_root)
            else {
                continue;
            };
            let substituted = pathmap::replace_prefix(cand_rel, old_rel, new_rel)
                .unwrap_or_else(|| cand_rel.to_string());

            let substituted_parent = rel_parent(&substituted);
            if substituted_parent != subject_parent_rel {
                continue;
            }

            let target_rel = if substituted_parent.is_empty() {
                subject.name.clone()
            } else {
                format!("{substituted_parent}/{}", subject.name)
            };
            let target = pathmap::absolutize(&target_rel, &self.config.mirror_root);
            self.apply(&candidate.path, &target, subject, &mut state)?;
        }

        Ok(state.into_report(candidates.len()))
    }

    /// Apply: move one container to its computed target, re-assert markers
    /// and merge display names from the corresponding primary node.
    fn apply(
        &self,
        source: &str,
        target: &str,
        name_source: &StoredNode,
        state: &mut ApplyState,
    ) -> SyncResult<()> {
        if source == target {
            debug!(
                "event=mirror_move module=sync status=noop reason=already_in_sync path={source}"
            );
            return Ok(());
        }

        if state.applied_targets.contains(target) {
            // Two candidates computing the same target should not occur when
            // invariants hold; the first move stands.
            warn!(
                "event=mirror_move module=sync status=skip reason=duplicate_target source={source} target={target}"
            );
            return Ok(());
        }

        if !self.store.node_exists(source)? {
            if self.store.node_exists(target)? {
                debug!(
                    "event=mirror_move module=sync status=noop reason=already_moved target={target}"
                );
            } else {
                warn!(
                    "event=mirror_move module=sync status=skip reason=source_missing source={source}"
                );
            }
            return Ok(());
        }

        let Some(target_rel) = pathmap::relativize(target, &self.config.mirror_root) else {
            return Err(SyncError::Store(StoreError::InvalidData(format!(
                "move target `{target}` outside mirror root"
            ))));
        };
        if ensure_mirror_ancestors(self.store, self.config, rel_parent(target_rel))? {
            state.changed = true;
        }

        self.store.move_node(source, target)?;
        state.applied_targets.insert(target.to_string());
        state.moved += 1;
        state.changed = true;
        info!("event=mirror_move module=sync status=ok source={source} target={target}");

        let moved = self
            .store
            .node_by_path(target)?
            .ok_or_else(|| StoreError::NodeNotFound(target.to_string()))?;

        // Markers can be stripped by back-end moves; re-assert both.
        for tag in &self.config.marker_tags {
            if self.store.add_tag(moved.node_uuid, tag)? {
                state.changed = true;
            }
        }
        for marker in &self.config.marker_properties {
            if self
                .store
                .set_property(moved.node_uuid, &marker.name, &marker.value)?
            {
                state.changed = true;
            }
        }

        if merge_display_names(self.store, self.config, name_source.node_uuid, moved.node_uuid)? {
            state.changed = true;
        }

        Ok(())
    }

    /// Root-relative path of a node's parent; `Some("")` when the parent is
    /// the root itself.
    fn parent_rel<'p>(&self, path: &'p str, root: &str) -> Option<&'p str> {
        let parent = pathmap::parent_path(path)?;
        pathmap::relativize_or_empty(parent, root)
    }
}

impl ApplyState {
    fn new() -> Self {
        Self {
            applied_targets: HashSet::new(),
            moved: 0,
            changed: false,
        }
    }

    fn into_report(self, candidates: usize) -> SyncReport {
        SyncReport {
            candidates,
            moved: self.moved,
            updated: self.changed,
        }
    }
}

/// Parent portion of a relative path; empty for single-segment input.
fn rel_parent(rel: &str) -> &str {
    match rel.rfind('/') {
        Some(idx) => &rel[..idx],
        None => "",
    }
}
