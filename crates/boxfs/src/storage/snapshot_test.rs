// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

use rstest::rstest;

use super::{Snapshot, SnapshotStore};
use crate::cache::{base_key, derive_key};
use crate::encoding::Hasher;
use crate::fixtures::*;
use crate::Error;

fn sample_snapshot() -> Snapshot {
    let base = base_key("alpine:3.20", "x86_64");
    let mut snapshot = Snapshot::new(
        derive_key(&base, "snapshot:abc"),
        "alpine:3.20",
        "x86_64",
    );
    let mut hasher = Hasher::default();
    hasher.update(b"layer one");
    snapshot.push_layer(hasher.digest());
    snapshot
}

#[rstest]
#[tokio::test]
async fn test_snapshot_save_load_round_trip(tmpdir: tempfile::TempDir) {
    init_logging();
    let store = SnapshotStore::new(tmpdir.path());
    let expected = sample_snapshot();
    store.save(&expected).await.unwrap();
    let actual = store.load(&expected.cache_key).await.unwrap();
    assert_eq!(actual, expected);
}

#[rstest]
#[tokio::test]
async fn test_snapshot_load_unknown(tmpdir: tempfile::TempDir) {
    init_logging();
    let store = SnapshotStore::new(tmpdir.path());
    let missing = base_key("never", "saved");
    assert!(matches!(
        store.load(&missing).await,
        Err(Error::UnknownSnapshot(_))
    ));
}

#[rstest]
#[tokio::test]
async fn test_snapshot_load_rejects_unknown_version(tmpdir: tempfile::TempDir) {
    init_logging();
    let store = SnapshotStore::new(tmpdir.path());
    let snapshot = sample_snapshot();
    store.save(&snapshot).await.unwrap();

    let path = store.manifest_path(&snapshot.cache_key);
    let doctored = std::fs::read_to_string(&path)
        .unwrap()
        .replace("\"version\": 1", "\"version\": 99");
    std::fs::write(&path, doctored).unwrap();

    assert!(matches!(
        store.load(&snapshot.cache_key).await,
        Err(Error::UnsupportedSnapshotVersion(99))
    ));
}

#[rstest]
#[tokio::test]
async fn test_snapshot_exists_and_delete(tmpdir: tempfile::TempDir) {
    init_logging();
    let store = SnapshotStore::new(tmpdir.path());
    let snapshot = sample_snapshot();
    assert!(!store.exists(&snapshot.cache_key).await);
    store.save(&snapshot).await.unwrap();
    assert!(store.exists(&snapshot.cache_key).await);

    store.delete(&snapshot.cache_key).await.unwrap();
    assert!(!store.exists(&snapshot.cache_key).await);
    assert!(matches!(
        store.delete(&snapshot.cache_key).await,
        Err(Error::UnknownSnapshot(_))
    ));
}

#[rstest]
#[tokio::test]
async fn test_snapshot_list(tmpdir: tempfile::TempDir) {
    init_logging();
    let store = SnapshotStore::new(tmpdir.path());
    assert!(store.list().await.unwrap().is_empty());

    let mut first = sample_snapshot();
    first.cache_key = base_key("one", "x86_64");
    let mut second = sample_snapshot();
    second.cache_key = base_key("two", "aarch64");
    store.save(&first).await.unwrap();
    store.save(&second).await.unwrap();

    // layer files sharing the directory must not show up
    std::fs::write(tmpdir.path().join("0011.idx"), b"").unwrap();

    let mut keys = store.list().await.unwrap();
    keys.sort();
    let mut expected = vec![first.cache_key, second.cache_key];
    expected.sort();
    assert_eq!(keys, expected);
}

#[rstest]
#[tokio::test]
async fn test_snapshot_list_missing_dir_is_empty() {
    init_logging();
    let store = SnapshotStore::new("/no/such/manifest/root");
    assert!(store.list().await.unwrap().is_empty());
}
