use std::io::{Cursor, Read};

use bytes::Bytes;
use folder_store::object_store::{LocalStore, ObjectStore, ObjectStoreError};

fn test_store() -> (tempfile::TempDir, LocalStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();
    (dir, store)
}

fn zip_entries(data: Vec<u8>) -> Vec<(String, String)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).unwrap();
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        entries.push((entry.name().to_string(), content));
    }
    entries.sort();
    entries
}

#[tokio::test]
async fn test_local_store_save_read() {
    let (_dir, store) = test_store();

    let data = Bytes::from("hello world");
    store.save(1, "docs/readme.txt", data.clone()).await.unwrap();

    let retrieved = store.read(1, "docs/readme.txt").await.unwrap();
    assert_eq!(retrieved, data);
}

#[tokio::test]
async fn test_local_store_save_is_owner_scoped() {
    let (dir, store) = test_store();

    store.save(7, "a.txt", Bytes::from("seven")).await.unwrap();

    assert!(dir.path().join("7").join("a.txt").is_file());
    assert!(!store.exists(8, "a.txt").await.unwrap());
    assert!(matches!(
        store.read(8, "a.txt").await,
        Err(ObjectStoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_local_store_exists() {
    let (_dir, store) = test_store();

    assert!(!store.exists(1, "missing").await.unwrap());

    store.save(1, "present", Bytes::from("data")).await.unwrap();
    assert!(store.exists(1, "present").await.unwrap());
}

#[tokio::test]
async fn test_local_store_delete() {
    let (_dir, store) = test_store();

    store.save(1, "to-delete", Bytes::from("data")).await.unwrap();
    store.delete(1, "to-delete").await.unwrap();
    assert!(!store.exists(1, "to-delete").await.unwrap());

    // Deleting a missing object should not error
    store.delete(1, "to-delete").await.unwrap();
}

#[tokio::test]
async fn test_local_store_read_not_found() {
    let (_dir, store) = test_store();

    let result = store.read(1, "missing").await;
    assert!(matches!(result, Err(ObjectStoreError::NotFound(_))));
}

#[tokio::test]
async fn test_local_store_overwrite() {
    let (_dir, store) = test_store();

    store.save(1, "key", Bytes::from("first")).await.unwrap();
    store.save(1, "key", Bytes::from("second")).await.unwrap();

    let data = store.read(1, "key").await.unwrap();
    assert_eq!(data, Bytes::from("second"));
}

#[tokio::test]
async fn test_local_store_leaves_no_staged_files() {
    let (dir, store) = test_store();

    store.save(1, "a/b/c.txt", Bytes::from("data")).await.unwrap();

    let staged = std::fs::read_dir(dir.path().join(".staging")).unwrap().count();
    assert_eq!(staged, 0);
}

#[tokio::test]
async fn test_local_store_rejects_traversal() {
    let (_dir, store) = test_store();

    for path in ["../escape.txt", "/etc/passwd", "docs/../../x"] {
        assert!(
            matches!(
                store.save(1, path, Bytes::from("x")).await,
                Err(ObjectStoreError::InvalidPath(_))
            ),
            "{path} should be rejected"
        );
    }
    assert!(matches!(
        store.delete_dir(1, "").await,
        Err(ObjectStoreError::InvalidPath(_))
    ));
}

#[tokio::test]
async fn test_local_store_move_file() {
    let (_dir, store) = test_store();

    store.save(1, "a.txt", Bytes::from("content")).await.unwrap();
    store.move_file(1, "a.txt", "nested/dir/b.txt").await.unwrap();

    assert!(!store.exists(1, "a.txt").await.unwrap());
    assert_eq!(
        store.read(1, "nested/dir/b.txt").await.unwrap(),
        Bytes::from("content")
    );
}

#[tokio::test]
async fn test_local_store_move_missing_file() {
    let (_dir, store) = test_store();

    let result = store.move_file(1, "missing.txt", "b.txt").await;
    assert!(matches!(result, Err(ObjectStoreError::NotFound(_))));
}

#[tokio::test]
async fn test_local_store_move_dir() {
    let (_dir, store) = test_store();

    store.save(1, "docs/a.txt", Bytes::from("a")).await.unwrap();
    store.save(1, "docs/specs/b.txt", Bytes::from("b")).await.unwrap();

    store.move_dir(1, "docs", "archive/documents").await.unwrap();

    assert!(!store.exists(1, "docs").await.unwrap());
    assert_eq!(
        store.read(1, "archive/documents/a.txt").await.unwrap(),
        Bytes::from("a")
    );
    assert_eq!(
        store.read(1, "archive/documents/specs/b.txt").await.unwrap(),
        Bytes::from("b")
    );
}

#[tokio::test]
async fn test_local_store_move_dir_into_itself() {
    let (_dir, store) = test_store();

    store.create_dir(1, "docs").await.unwrap();
    let result = store.move_dir(1, "docs", "docs/inner").await;
    assert!(matches!(result, Err(ObjectStoreError::InvalidPath(_))));
    assert!(store.exists(1, "docs").await.unwrap());
}

#[tokio::test]
async fn test_local_store_move_dir_onto_existing_target() {
    let (_dir, store) = test_store();

    store.save(1, "docs/a.txt", Bytes::from("a")).await.unwrap();
    // Leftover from an earlier delete that never reached storage.
    store.save(1, "stale/old.txt", Bytes::from("old")).await.unwrap();

    let result = store.move_dir(1, "docs", "stale").await;
    assert!(matches!(result, Err(ObjectStoreError::AlreadyExists(_))));

    // Nothing merged, nothing lost.
    assert_eq!(store.read(1, "docs/a.txt").await.unwrap(), Bytes::from("a"));
    assert!(!store.exists(1, "stale/a.txt").await.unwrap());
    assert_eq!(
        store.read(1, "stale/old.txt").await.unwrap(),
        Bytes::from("old")
    );
}

#[tokio::test]
async fn test_local_store_move_file_onto_existing_target() {
    let (_dir, store) = test_store();

    store.save(1, "a.txt", Bytes::from("new")).await.unwrap();
    store.save(1, "b.txt", Bytes::from("kept")).await.unwrap();

    let result = store.move_file(1, "a.txt", "b.txt").await;
    assert!(matches!(result, Err(ObjectStoreError::AlreadyExists(_))));
    assert_eq!(store.read(1, "a.txt").await.unwrap(), Bytes::from("new"));
    assert_eq!(store.read(1, "b.txt").await.unwrap(), Bytes::from("kept"));
}

#[tokio::test]
async fn test_local_store_delete_dir() {
    let (_dir, store) = test_store();

    store.save(1, "docs/a.txt", Bytes::from("a")).await.unwrap();
    store.save(1, "docs/specs/b.txt", Bytes::from("b")).await.unwrap();

    store.delete_dir(1, "docs").await.unwrap();
    assert!(!store.exists(1, "docs").await.unwrap());

    // Already gone
    store.delete_dir(1, "docs").await.unwrap();
}

#[tokio::test]
async fn test_local_store_zip_dir() {
    let (_dir, store) = test_store();

    store.save(1, "docs/a.txt", Bytes::from("alpha")).await.unwrap();
    store
        .save(1, "docs/specs/b.txt", Bytes::from("beta"))
        .await
        .unwrap();
    store.save(1, "other.txt", Bytes::from("skip")).await.unwrap();

    let mut out = Vec::new();
    store.zip_dir(1, "docs", &mut out).await.unwrap();

    assert_eq!(
        zip_entries(out),
        vec![
            ("docs/a.txt".to_string(), "alpha".to_string()),
            ("docs/specs/b.txt".to_string(), "beta".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_local_store_zip_nested_dir_uses_own_name() {
    let (_dir, store) = test_store();

    store
        .save(1, "docs/specs/b.txt", Bytes::from("beta"))
        .await
        .unwrap();

    let mut out = Vec::new();
    store.zip_dir(1, "docs/specs", &mut out).await.unwrap();

    assert_eq!(
        zip_entries(out),
        vec![("specs/b.txt".to_string(), "beta".to_string())]
    );
}

#[tokio::test]
async fn test_local_store_zip_large_files() {
    let (_dir, store) = test_store();

    let big: String = (0..200_000).map(|i| format!("{:08}\n", i * 7919)).collect();
    store
        .save(1, "bulk/data.csv", Bytes::from(big.clone()))
        .await
        .unwrap();
    store.save(1, "bulk/tail.txt", Bytes::from("end")).await.unwrap();

    let mut out = Vec::new();
    store.zip_dir(1, "bulk", &mut out).await.unwrap();

    let entries = zip_entries(out);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, "bulk/data.csv");
    assert_eq!(entries[0].1.len(), big.len());
    assert!(entries[0].1 == big);
    assert_eq!(entries[1], ("bulk/tail.txt".to_string(), "end".to_string()));
}

#[tokio::test]
async fn test_local_store_zip_missing_dir() {
    let (_dir, store) = test_store();

    let mut out = Vec::new();
    let result = store.zip_dir(1, "nowhere", &mut out).await;
    assert!(matches!(result, Err(ObjectStoreError::NotFound(_))));
}
