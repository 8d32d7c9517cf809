use mirrortree_core::db::open_db_in_memory;
use mirrortree_core::{
    ChangeEvent, ChangeKind, EventChannel, LocalEventChannel, MirrorConfig, MirrorSyncListener,
    MirrorSynchronizer, NodeId, NodeStore, SqliteNodeStore, StoredNode, StructuralChange,
};
use rusqlite::Connection;
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn ensure_tree(store: &SqliteNodeStore<'_>, path: &str, node_type: &str) -> StoredNode {
    let mut parent: Option<NodeId> = None;
    let mut current: Option<StoredNode> = None;
    let mut walked = String::new();
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        walked.push('/');
        walked.push_str(segment);
        let node = match store.node_by_path(&walked).unwrap() {
            Some(node) => node,
            None => store.create_node(parent, segment, node_type).unwrap(),
        };
        parent = Some(node.node_uuid);
        current = Some(node);
    }
    current.unwrap()
}

/// Creates a mirror container carrying both marker tags and properties, plus
/// one asset handle inside it serving as a link target.
fn create_container(
    store: &SqliteNodeStore<'_>,
    config: &MirrorConfig,
    rel: &str,
) -> (StoredNode, StoredNode) {
    let container = ensure_tree(
        store,
        &format!("{}/{rel}", config.mirror_root),
        &config.container_type,
    );
    for tag in &config.marker_tags {
        store.add_tag(container.node_uuid, tag).unwrap();
    }
    for marker in &config.marker_properties {
        store
            .set_property(container.node_uuid, &marker.name, &marker.value)
            .unwrap();
    }
    let asset = store
        .create_node(Some(container.node_uuid), "photo", "handle")
        .unwrap();
    (container, asset)
}

/// Creates a handle with its same-named content variant below it.
fn create_handle(
    store: &SqliteNodeStore<'_>,
    parent: &StoredNode,
    name: &str,
) -> (StoredNode, StoredNode) {
    let handle = store
        .create_node(Some(parent.node_uuid), name, "handle")
        .unwrap();
    let document = store
        .create_node(Some(handle.node_uuid), name, "document")
        .unwrap();
    (handle, document)
}

fn add_link(
    store: &SqliteNodeStore<'_>,
    config: &MirrorConfig,
    document: &StoredNode,
    target: &StoredNode,
) {
    let link = store
        .create_node(
            Some(document.node_uuid),
            &format!("image-link-{}", target.node_uuid),
            "link",
        )
        .unwrap();
    store
        .set_property(
            link.node_uuid,
            &config.ref_property,
            &target.node_uuid.to_string(),
        )
        .unwrap();
}

fn workflow_event(action: &str, subject_id: &str, subject_path: &str, args: &[&str]) -> ChangeEvent {
    ChangeEvent {
        category: "workflow".to_string(),
        action: action.to_string(),
        subject_id: subject_id.to_string(),
        subject_path: subject_path.to_string(),
        arguments: args.iter().map(|arg| arg.to_string()).collect(),
    }
}

fn deliver(store: &SqliteNodeStore<'_>, config: &MirrorConfig, event: &ChangeEvent) {
    let listener = MirrorSyncListener::new(store, config.clone());
    let mut channel = LocalEventChannel::new();
    channel.subscribe(&listener);
    channel.publish(event);
}

fn node_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM nodes;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn leaf_rename_moves_linked_container() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    let config = MirrorConfig::default();

    let folder = ensure_tree(&store, "/content/documents/a/b", "folder");
    let (handle, document) = create_handle(&store, &folder, "hello-world-2");
    let (_container, asset) = create_container(&store, &config, "a/b/hello-world");
    add_link(&store, &config, &document, &asset);

    let event = workflow_event(
        "replaceAllLocalizedNames",
        &handle.node_uuid.to_string(),
        "/content/documents/a/b/hello-world-2",
        &[],
    );
    deliver(&store, &config, &event);

    assert!(!store.node_exists("/content/assets/a/b/hello-world").unwrap());
    let moved = store
        .node_by_path("/content/assets/a/b/hello-world-2")
        .unwrap()
        .unwrap();
    assert_eq!(moved.node_type, config.container_type);
    // The container's own children travel with it.
    let carried_asset = store
        .node_by_path("/content/assets/a/b/hello-world-2/photo")
        .unwrap()
        .unwrap();
    assert_eq!(carried_asset.node_uuid, asset.node_uuid);
}

#[test]
fn folder_rename_moves_interim_folder_and_merges_its_names() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    let config = MirrorConfig::default();

    // Primary already holds the post-rename state: b became b2.
    let parent = ensure_tree(&store, "/content/documents/a", "folder");
    let renamed = ensure_tree(&store, "/content/documents/a/b2", "folder");
    store
        .set_display_name(renamed.node_uuid, "en", "Beta two")
        .unwrap();
    let (_handle, document) = create_handle(&store, &renamed, "hello-world");
    let (_container, asset) = create_container(&store, &config, "a/b/hello-world");
    add_link(&store, &config, &document, &asset);

    let event = workflow_event(
        "rename",
        &parent.node_uuid.to_string(),
        "/content/documents/a",
        &["b", "b2"],
    );
    deliver(&store, &config, &event);

    assert!(!store.node_exists("/content/assets/a/b").unwrap());
    let interim = store
        .node_by_path("/content/assets/a/b2")
        .unwrap()
        .unwrap();
    let names = store.display_names(interim.node_uuid).unwrap();
    assert_eq!(names.len(), 1);
    assert_eq!(names[0].language, "en");
    assert_eq!(names[0].message, "Beta two");
    // The leaf container itself keeps its name under the moved interim path.
    assert!(store
        .node_exists("/content/assets/a/b2/hello-world")
        .unwrap());
}

#[test]
fn subtree_move_provisions_missing_ancestors_with_markers_and_names() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    let config = MirrorConfig::default();

    ensure_tree(&store, "/content/documents/a/b", "folder");
    let section = ensure_tree(&store, "/content/documents/c", "folder");
    // A blank language falls back to the configured default.
    store
        .set_display_name(section.node_uuid, "", "Hoofdstuk")
        .unwrap();
    store
        .set_display_name(section.node_uuid, "de", "Abschnitt C")
        .unwrap();
    let (handle, document) = create_handle(&store, &section, "doc");
    let (_container, asset) = create_container(&store, &config, "a/b/doc");
    add_link(&store, &config, &document, &asset);

    // The event carries the OLD path; the repository holds the new one.
    let event = workflow_event(
        "move",
        &handle.node_uuid.to_string(),
        "/content/documents/a/b/doc",
        &[],
    );
    deliver(&store, &config, &event);

    let provisioned = store.node_by_path("/content/assets/c").unwrap().unwrap();
    assert_eq!(provisioned.node_type, config.container_type);
    for tag in &config.marker_tags {
        assert!(store.has_tag(provisioned.node_uuid, tag).unwrap());
    }
    for marker in &config.marker_properties {
        assert_eq!(
            store.property(provisioned.node_uuid, &marker.name).unwrap(),
            Some(marker.value.clone())
        );
    }
    let names = store.display_names(provisioned.node_uuid).unwrap();
    assert_eq!(names.len(), 2);
    assert_eq!(names[0].language, "de");
    assert_eq!(names[0].message, "Abschnitt C");
    assert_eq!(names[1].language, "en");
    assert_eq!(names[1].message, "Hoofdstuk");

    assert!(!store.node_exists("/content/assets/a/b/doc").unwrap());
    assert!(store.node_exists("/content/assets/c/doc/photo").unwrap());
}

#[test]
fn duplicate_delivery_issues_zero_further_writes() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    let config = MirrorConfig::default();

    let folder = ensure_tree(&store, "/content/documents/a/b", "folder");
    let (handle, document) = create_handle(&store, &folder, "hello-world-2");
    let (_container, asset) = create_container(&store, &config, "a/b/hello-world");
    add_link(&store, &config, &document, &asset);

    let change = StructuralChange {
        kind: ChangeKind::LeafRename,
        subject_uuid: handle.node_uuid,
        subject_path: "/content/documents/a/b/hello-world-2".to_string(),
        old_name: None,
        new_name: None,
    };
    let synchronizer = MirrorSynchronizer::new(&store, &config);

    let first = synchronizer.synchronize(&change).unwrap();
    assert_eq!(first.moved, 1);
    assert!(first.updated);

    let second = synchronizer.synchronize(&change).unwrap();
    assert_eq!(second.candidates, 1);
    assert_eq!(second.moved, 0);
    assert!(!second.updated);
}

#[test]
fn events_outside_primary_root_cause_no_writes() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    let config = MirrorConfig::default();

    ensure_tree(&store, "/content/documents/a", "folder");
    create_container(&store, &config, "a/hello-world");
    let before = node_count(&conn);

    let event = workflow_event(
        "replaceAllLocalizedNames",
        &Uuid::new_v4().to_string(),
        "/content/other/x",
        &[],
    );
    deliver(&store, &config, &event);

    assert_eq!(node_count(&conn), before);
}

#[test]
fn collision_with_existing_sibling_rolls_back_whole_event() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    let config = MirrorConfig::default();

    let parent = ensure_tree(&store, "/content/documents/a", "folder");
    let renamed = ensure_tree(&store, "/content/documents/a/b2", "folder");
    let (_handle, document) = create_handle(&store, &renamed, "hello-world");
    let (container, asset) = create_container(&store, &config, "a/b/hello-world");
    add_link(&store, &config, &document, &asset);
    store
        .set_display_name(container.node_uuid, "en", "Untouched")
        .unwrap();
    // The computed interim target already exists in the mirror.
    ensure_tree(&store, "/content/assets/a/b2", &config.container_type);

    let event = workflow_event(
        "rename",
        &parent.node_uuid.to_string(),
        "/content/documents/a",
        &["b", "b2"],
    );
    deliver(&store, &config, &event);

    assert!(store.node_exists("/content/assets/a/b").unwrap());
    assert!(store.node_exists("/content/assets/a/b2").unwrap());
    let untouched = store
        .node_by_path("/content/assets/a/b/hello-world")
        .unwrap()
        .unwrap();
    assert_eq!(untouched.node_uuid, container.node_uuid);
    let names = store.display_names(untouched.node_uuid).unwrap();
    assert_eq!(names.len(), 1);
    assert_eq!(names[0].message, "Untouched");
}

#[test]
fn mid_event_failure_rolls_back_provisioned_ancestors() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    let config = MirrorConfig::default();

    ensure_tree(&store, "/content/documents/a/b", "folder");
    ensure_tree(&store, "/content/documents/c", "folder");
    let (handle, document) = create_handle(
        &store,
        &store.node_by_path("/content/documents/c").unwrap().unwrap(),
        "doc",
    );
    let (container, asset) = create_container(&store, &config, "a/b/doc");
    add_link(&store, &config, &document, &asset);

    // Fail the container move itself, after ancestors were provisioned.
    conn.execute_batch(&format!(
        "CREATE TRIGGER fail_container_move
         BEFORE UPDATE OF parent_uuid ON nodes
         WHEN NEW.node_uuid = '{}'
         BEGIN
             SELECT RAISE(ABORT, 'forced move failure');
         END;",
        container.node_uuid
    ))
    .unwrap();

    let event = workflow_event(
        "move",
        &handle.node_uuid.to_string(),
        "/content/documents/a/b/doc",
        &[],
    );
    deliver(&store, &config, &event);

    assert!(!store.node_exists("/content/assets/c").unwrap());
    assert!(store.node_exists("/content/assets/a/b/doc").unwrap());
    // The store stays usable after the discard pass.
    assert!(store.node_exists("/content/assets/a/b/doc/photo").unwrap());
}

#[test]
fn display_name_merge_is_additive_per_language() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    let config = MirrorConfig::default();

    let folder = ensure_tree(&store, "/content/documents/a", "folder");
    let (handle, document) = create_handle(&store, &folder, "hello-world-2");
    store
        .set_display_name(handle.node_uuid, "en", "Hello")
        .unwrap();
    store
        .set_display_name(handle.node_uuid, "de", "Hallo")
        .unwrap();
    let (container, asset) = create_container(&store, &config, "a/hello-world");
    store
        .set_display_name(container.node_uuid, "fr", "Bonjour")
        .unwrap();
    add_link(&store, &config, &document, &asset);

    let event = workflow_event(
        "replaceAllLocalizedNames",
        &handle.node_uuid.to_string(),
        "/content/documents/a/hello-world-2",
        &[],
    );
    deliver(&store, &config, &event);

    let moved = store
        .node_by_path("/content/assets/a/hello-world-2")
        .unwrap()
        .unwrap();
    let names = store.display_names(moved.node_uuid).unwrap();
    assert_eq!(names.len(), 3);
    assert_eq!(names[0].language, "de");
    assert_eq!(names[0].message, "Hallo");
    assert_eq!(names[1].language, "en");
    assert_eq!(names[1].message, "Hello");
    // Target-only languages survive the merge.
    assert_eq!(names[2].language, "fr");
    assert_eq!(names[2].message, "Bonjour");
}

#[test]
fn markers_are_healed_after_move() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    let config = MirrorConfig::default();

    let folder = ensure_tree(&store, "/content/documents/a", "folder");
    let (handle, document) = create_handle(&store, &folder, "hello-world-2");
    let (container, asset) = create_container(&store, &config, "a/hello-world");
    add_link(&store, &config, &document, &asset);

    // Simulate a back-end move stripping markers beforehand.
    conn.execute(
        "DELETE FROM node_tags WHERE node_uuid = ?1 AND tag = ?2;",
        rusqlite::params![container.node_uuid.to_string(), &config.marker_tags[0]],
    )
    .unwrap();
    conn.execute(
        "DELETE FROM node_properties WHERE node_uuid = ?1 AND name = ?2;",
        rusqlite::params![
            container.node_uuid.to_string(),
            &config.marker_properties[0].name
        ],
    )
    .unwrap();

    let event = workflow_event(
        "replaceAllLocalizedNames",
        &handle.node_uuid.to_string(),
        "/content/documents/a/hello-world-2",
        &[],
    );
    deliver(&store, &config, &event);

    let moved = store
        .node_by_path("/content/assets/a/hello-world-2")
        .unwrap()
        .unwrap();
    for tag in &config.marker_tags {
        assert!(store.has_tag(moved.node_uuid, tag).unwrap());
    }
    for marker in &config.marker_properties {
        assert_eq!(
            store.property(moved.node_uuid, &marker.name).unwrap(),
            Some(marker.value.clone())
        );
    }
}

#[test]
fn duplicate_target_within_event_keeps_first_move() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    let config = MirrorConfig::default();

    let folder = ensure_tree(&store, "/content/documents/a", "folder");
    let (handle, document) = create_handle(&store, &folder, "hello-world-2");
    let (_first, asset_first) = create_container(&store, &config, "a/hello-world");
    let (_second, asset_second) = create_container(&store, &config, "a/hello-world-old");
    add_link(&store, &config, &document, &asset_first);
    add_link(&store, &config, &document, &asset_second);

    let change = StructuralChange {
        kind: ChangeKind::LeafRename,
        subject_uuid: handle.node_uuid,
        subject_path: "/content/documents/a/hello-world-2".to_string(),
        old_name: None,
        new_name: None,
    };
    let synchronizer = MirrorSynchronizer::new(&store, &config);
    let report = synchronizer.synchronize(&change).unwrap();

    assert_eq!(report.candidates, 2);
    assert_eq!(report.moved, 1);
    assert!(store
        .node_exists("/content/assets/a/hello-world-2")
        .unwrap());
    // The second candidate stays where it was.
    assert!(store
        .node_exists("/content/assets/a/hello-world-old")
        .unwrap());
}

#[test]
fn wire_events_deserialize_and_dispatch() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    let config = MirrorConfig::default();

    let folder = ensure_tree(&store, "/content/documents/a", "folder");
    let (handle, document) = create_handle(&store, &folder, "hello-world-2");
    let (_container, asset) = create_container(&store, &config, "a/hello-world");
    add_link(&store, &config, &document, &asset);

    // The arguments field is optional on the wire.
    let payload = format!(
        r#"{{
            "category": "workflow",
            "action": "replaceAllLocalizedNames",
            "subject_id": "{}",
            "subject_path": "/content/documents/a/hello-world-2"
        }}"#,
        handle.node_uuid
    );
    let event: ChangeEvent = serde_json::from_str(&payload).unwrap();
    assert!(event.arguments.is_empty());
    deliver(&store, &config, &event);
    assert!(store
        .node_exists("/content/assets/a/hello-world-2")
        .unwrap());

    // Non-workflow categories are ignored entirely.
    let before = node_count(&conn);
    let ignored = ChangeEvent {
        category: "security".to_string(),
        ..event
    };
    deliver(&store, &config, &ignored);
    assert_eq!(node_count(&conn), before);
}

#[test]
fn malformed_rename_event_leaves_tree_unchanged() {
    let conn = setup();
    let store = SqliteNodeStore::try_new(&conn).unwrap();
    let config = MirrorConfig::default();

    let parent = ensure_tree(&store, "/content/documents/a", "folder");
    create_container(&store, &config, "a/hello-world");
    let before = node_count(&conn);

    let event = workflow_event(
        "rename",
        &parent.node_uuid.to_string(),
        "/content/documents/a",
        &[],
    );
    deliver(&store, &config, &event);

    assert_eq!(node_count(&conn), before);
    assert!(store.node_exists("/content/assets/a/hello-world").unwrap());
}
