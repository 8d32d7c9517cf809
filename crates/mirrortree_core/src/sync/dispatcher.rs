//! Workflow event dispatch and classification.
//!
//! # Responsibility
//! - Filter the host event stream down to recognized workflow shapes,
//!   classify them into structural changes, and drive the synchronizer
//!   inside one scoped back-end transaction per event.
//!
//! # Invariants
//! - Events outside the primary root cause zero back-end writes.
//! - Every event ends with a discard-uncommitted pass, success or not.
//! - No error or panic ever crosses the channel boundary.

use crate::config::MirrorConfig;
use crate::pathmap;
use crate::store::node_store::NodeStore;
use crate::sync::bus::EventHandler;
use crate::sync::events::{
    ChangeEvent, ChangeKind, StructuralChange, ACTION_MOVE, ACTION_RENAME,
    ACTION_REPLACE_LOCALIZED_NAMES,
};
use crate::sync::synchronizer::{MirrorSynchronizer, SyncReport};
use crate::sync::{SyncError, SyncResult};
use log::{debug, error, info, warn};
use uuid::Uuid;

/// Always-running listener keeping the mirror tree aligned with the primary
/// tree. Hosts register it on their event channel.
pub struct MirrorSyncListener<'a, S: NodeStore> {
    store: &'a S,
    config: MirrorConfig,
}

impl<'a, S: NodeStore> MirrorSyncListener<'a, S> {
    pub fn new(store: &'a S, config: MirrorConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    fn handle(&self, event: &ChangeEvent) -> SyncResult<Option<SyncReport>> {
        self.store.begin()?;

        let change = match self.classify(event)? {
            Some(change) => change,
            None => return Ok(None),
        };

        let synchronizer = MirrorSynchronizer::new(self.store, &self.config);
        synchronizer.synchronize(&change).map(Some)
    }

    fn classify(&self, event: &ChangeEvent) -> SyncResult<Option<StructuralChange>> {
        let subject_uuid = Uuid::parse_str(&event.subject_id).map_err(|_| {
            SyncError::MalformedEvent(format!(
                "subject id `{}` is not a node id",
                event.subject_id
            ))
        })?;

        let subject = match self.store.node_by_id(subject_uuid)? {
            Some(node) => node,
            None => {
                debug!(
                    "event=dispatch module=sync status=skip reason=unknown_subject id={subject_uuid}"
                );
                return Ok(None);
            }
        };

        let kind = match event.action.as_str() {
            ACTION_RENAME if subject.node_type == self.config.folder_type => {
                let old_name = event.arguments.first().filter(|name| !name.is_empty());
                let new_name = event.arguments.get(1).filter(|name| !name.is_empty());
                let (Some(old_name), Some(new_name)) = (old_name, new_name) else {
                    return Err(SyncError::MalformedEvent(
                        "rename event without old/new leaf name arguments".to_string(),
                    ));
                };
                return Ok(Some(StructuralChange {
                    kind: ChangeKind::FolderRename,
                    subject_uuid,
                    subject_path: event.subject_path.clone(),
                    old_name: Some(old_name.clone()),
                    new_name: Some(new_name.clone()),
                }));
            }
            // A handle has a child sharing its own name; renames and moves
            // act on the handle, not the content variant below it.
            ACTION_REPLACE_LOCALIZED_NAMES if self.store.has_child(subject_uuid, &subject.name)? => {
                ChangeKind::LeafRename
            }
            ACTION_MOVE if self.store.has_child(subject_uuid, &subject.name)? => {
                ChangeKind::SubtreeMove
            }
            _ => {
                debug!(
                    "event=dispatch module=sync status=skip reason=unrecognized_shape action={} subject={}",
                    event.action, subject.path
                );
                return Ok(None);
            }
        };

        Ok(Some(StructuralChange {
            kind,
            subject_uuid,
            subject_path: event.subject_path.clone(),
            old_name: None,
            new_name: None,
        }))
    }
}

impl<S: NodeStore> EventHandler for MirrorSyncListener<'_, S> {
    fn on_event(&self, event: &ChangeEvent) {
        if !event.is_workflow() {
            return;
        }
        if pathmap::relativize_or_empty(&event.subject_path, &self.config.primary_root).is_none() {
            info!(
                "event=dispatch module=sync status=skip reason=outside_primary_root path={}",
                event.subject_path
            );
            return;
        }
        if !matches!(
            event.action.as_str(),
            ACTION_RENAME | ACTION_REPLACE_LOCALIZED_NAMES | ACTION_MOVE
        ) {
            return;
        }

        match self.handle(event) {
            Ok(Some(report)) => {
                info!(
                    "event=dispatch module=sync status=ok action={} path={} candidates={} moved={} updated={}",
                    event.action,
                    event.subject_path,
                    report.candidates,
                    report.moved,
                    report.updated
                );
            }
            Ok(None) => {}
            Err(SyncError::MalformedEvent(message)) => {
                warn!(
                    "event=dispatch module=sync status=skip reason=malformed_event action={} path={} detail={message}",
                    event.action, event.subject_path
                );
            }
            Err(err) => {
                error!(
                    "event=dispatch module=sync status=error action={} path={} error={err}",
                    event.action, event.subject_path
                );
            }
        }

        // Unconditional discard pass: rolls back anything left uncommitted.
        if let Err(err) = self.store.refresh() {
            error!("event=dispatch module=sync status=error phase=refresh error={err}");
        }
    }
}
