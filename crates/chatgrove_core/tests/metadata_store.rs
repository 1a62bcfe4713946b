use chatgrove_core::{
    JsonMetadataStore, OrganizationState, StateStore, StoreError, TreeLimits, TreeManager,
    SCHEMA_VERSION,
};
use std::fs;
use std::path::Path;

fn sample_state() -> OrganizationState {
    let mut manager = TreeManager::new(OrganizationState::new(), TreeLimits::default());
    let work = manager.create_folder("Work", None).unwrap();
    let python = manager.create_folder("Python", Some(&work)).unwrap();
    manager
        .attach_conversation("conv-1", "Python Programming Help", Some(&python))
        .unwrap();
    manager.set_favorite("conv-1", true).unwrap();
    manager
        .set_tags("conv-1", &["rust".to_string(), "help".to_string()])
        .unwrap();
    manager.into_state()
}

fn store_in(dir: &Path) -> JsonMetadataStore {
    JsonMetadataStore::new(dir.join("conversations_organization.json"))
}

#[test]
fn load_missing_file_returns_empty_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());

    let state = store.load().unwrap();
    assert_eq!(state.version, SCHEMA_VERSION);
    assert_eq!(state.node_count(), 0);
    assert!(state.root_nodes.is_empty());
}

#[test]
fn save_then_load_round_trips_all_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let state = sample_state();

    store.save(&state).unwrap();
    let loaded = store.load().unwrap();

    assert_eq!(loaded, state);
}

#[test]
fn save_leaves_no_temp_file_behind() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());

    store.save(&sample_state()).unwrap();

    assert!(store.file_path().exists());
    let temp = dir.path().join("conversations_organization.json.tmp");
    assert!(!temp.exists());
}

#[test]
fn save_snapshots_previous_content_into_backup() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());

    let first = sample_state();
    store.save(&first).unwrap();

    let mut second = first.clone();
    let mut manager = TreeManager::new(second, TreeLimits::default());
    manager.create_folder("Archive", None).unwrap();
    second = manager.into_state();
    store.save(&second).unwrap();

    let backup_raw = fs::read_to_string(store.backup_path()).unwrap();
    let backup: OrganizationState = serde_json::from_str(&backup_raw).unwrap();
    assert_eq!(backup, first);

    let committed = store.load().unwrap();
    assert_eq!(committed, second);
}

#[test]
fn corrupted_primary_falls_back_to_backup() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());

    let first = sample_state();
    store.save(&first).unwrap();
    // Second save makes the backup hold `first`.
    store.save(&first).unwrap();

    fs::write(store.file_path(), b"{ this is not json").unwrap();

    let recovered = store.load().unwrap();
    assert_eq!(recovered, first);
}

#[test]
fn corrupted_primary_and_backup_reset_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());

    store.save(&sample_state()).unwrap();
    store.save(&sample_state()).unwrap();
    fs::write(store.file_path(), b"garbage").unwrap();
    fs::write(store.backup_path(), b"also garbage").unwrap();

    let state = store.load().unwrap();
    assert_eq!(state.node_count(), 0);
    assert_eq!(state.version, SCHEMA_VERSION);
}

#[test]
fn future_schema_version_fails_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());

    fs::write(
        store.file_path(),
        br#"{"version": "9.9", "tree_nodes": {}, "item_metadata": {}, "root_nodes": []}"#,
    )
    .unwrap();

    let err = store.load().unwrap_err();
    assert!(matches!(
        err,
        StoreError::UnsupportedSchemaVersion { file_version } if file_version == "9.9"
    ));
}

#[test]
fn version_1_0_document_loads_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());

    // A 1.0 document predates order/expanded persistence, the archived and
    // priority metadata fields, and all timestamps.
    fs::write(
        store.file_path(),
        br#"{
            "version": "1.0",
            "tree_nodes": {
                "f1": {
                    "id": "f1",
                    "name": "Work",
                    "type": "folder",
                    "parent_id": null,
                    "children": ["conv-1"],
                    "path": "/Work/"
                },
                "conv-1": {
                    "id": "conv-1",
                    "name": "Hello",
                    "type": "conversation",
                    "parent_id": "f1",
                    "children": [],
                    "path": "/Work/"
                }
            },
            "item_metadata": {
                "conv-1": {
                    "custom_title": null,
                    "tags": ["old"],
                    "notes": "kept",
                    "favorite": true
                }
            },
            "root_nodes": ["f1"]
        }"#,
    )
    .unwrap();

    let state = store.load().unwrap();
    assert_eq!(state.version, SCHEMA_VERSION);

    let folder = &state.tree_nodes["f1"];
    assert!(folder.expanded);
    assert_eq!(folder.order, 0);
    assert_eq!(folder.created_at, 0);

    let metadata = &state.item_metadata["conv-1"];
    assert!(!metadata.archived);
    assert_eq!(metadata.priority, 0);
    assert!(metadata.favorite);
    assert_eq!(metadata.notes, "kept");
}

#[test]
fn mismatched_node_key_is_treated_as_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());

    fs::write(
        store.file_path(),
        br#"{
            "version": "1.1",
            "tree_nodes": {
                "wrong-key": {
                    "id": "f1",
                    "name": "Work",
                    "type": "folder",
                    "children": [],
                    "path": "/Work/"
                }
            },
            "item_metadata": {},
            "root_nodes": ["f1"]
        }"#,
    )
    .unwrap();

    // No backup exists, so the shape failure resets to an empty state.
    let state = store.load().unwrap();
    assert_eq!(state.node_count(), 0);
}

#[test]
fn failed_save_leaves_committed_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());

    let first = sample_state();
    store.save(&first).unwrap();

    // A directory squatting on the temp path makes the staging write fail
    // before the rename.
    let temp = dir.path().join("conversations_organization.json.tmp");
    fs::create_dir_all(&temp).unwrap();

    let err = store.save(&sample_state()).unwrap_err();
    assert!(matches!(err, StoreError::Io { .. }));

    fs::remove_dir_all(&temp).unwrap();
    let committed = store.load().unwrap();
    assert_eq!(committed, first);
}

#[cfg(unix)]
#[test]
fn saved_document_is_owner_read_write_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    store.save(&sample_state()).unwrap();

    let mode = fs::metadata(store.file_path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn for_content_file_derives_sibling_document_path() {
    let store = JsonMetadataStore::for_content_file(Path::new("/data/exports/conversations.json"));
    assert_eq!(
        store.file_path(),
        Path::new("/data/exports/conversations_organization.json")
    );
    assert_eq!(
        store.backup_path(),
        Path::new("/data/exports/conversations_organization.json.backup")
    );
}
