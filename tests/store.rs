use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use crawl_collector::error::CollectorError;
use crawl_collector::snapshot::Snapshot;
use crawl_collector::store::Store;

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("data")).unwrap();
    (temp, root)
}

#[test]
fn layout_is_created_on_demand() {
    let (_temp, root) = temp_root();
    let store = Store::new(root.clone());
    assert_eq!(store.missing_dirs().len(), 3);
    assert_matches!(store.check_layout(), Err(CollectorError::StorageUnavailable(path)) if path == root);
    assert_matches!(Snapshot::scan(&store), Err(CollectorError::StorageUnavailable(_)));

    store.ensure_layout().unwrap();
    assert!(store.missing_dirs().is_empty());
    store.check_layout().unwrap();
    assert!(store.lists_root().is_dir());
    assert!(store.datasets_root().is_dir());
}

#[test]
fn snapshot_skips_partials_and_nested_dirs() {
    let (_temp, root) = temp_root();
    let store = Store::new(root);
    store.ensure_layout().unwrap();
    fs::write(store.lists_root().join("b.paths"), b"x").unwrap();
    fs::write(store.lists_root().join("a.paths"), b"x").unwrap();
    fs::write(store.lists_root().join(".partial-1"), b"x").unwrap();
    let dataset = store.datasets_root().join("cccccccccccccccccccccccccccccccc");
    fs::create_dir_all(dataset.join("nested")).unwrap();
    fs::write(dataset.join("e1.gz"), b"x").unwrap();
    fs::write(dataset.join(".partial-2"), b"x").unwrap();
    fs::write(store.datasets_root().join("stray-file"), b"x").unwrap();

    let snapshot = Snapshot::scan(&store).unwrap();
    let catalogs: Vec<String> = snapshot
        .catalog_ids()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(catalogs, vec!["a", "b"]);

    let ids = snapshot.dataset_ids();
    assert_eq!(ids.len(), 1);
    let entries = snapshot.dataset_entry_ids(&ids[0]).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].as_str(), "e1");
    assert!(snapshot.entry_path(&ids[0], &entries[0]).is_some());
}

#[test]
fn atomic_write_replaces_content() {
    let (_temp, root) = temp_root();
    let path = root.join("config.json");
    Store::write_bytes_atomic(&path, b"one").unwrap();
    Store::write_bytes_atomic(&path, b"two").unwrap();
    assert_eq!(fs::read(&path).unwrap(), b"two");
    assert!(!root.join("config.tmp").exists());
}

#[test]
fn partial_names() {
    assert!(Store::is_partial(".partial-abc"));
    assert!(!Store::is_partial("abc.partial-"));
}
