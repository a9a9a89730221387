use fleet_store::model::Installation;
use fleet_store::{Error, InstallationFilter, Store};

#[tokio::test]
async fn test_open_creates_and_reopens_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleet.db");

    let store = Store::open(&path).await.unwrap();
    let mut installation = Installation::new("owner-1", "1.0.0");
    store.create_installation(&mut installation).await.unwrap();
    drop(store);

    // Second open re-walks the step sequence; every step must be a no-op
    // on an up-to-date database and the data must still be there.
    let store = Store::open(&path).await.unwrap();
    let stored = store
        .get_installation(&installation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.owner_id, "owner-1");

    let listed = store
        .get_installations(&InstallationFilter::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_open_refuses_a_newer_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleet.db");

    let store = Store::open(&path).await.unwrap();
    drop(store);

    // Simulate a database already written by a future release.
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute("UPDATE system SET schema_version = 999 WHERE id = 1", [])
        .unwrap();
    drop(conn);

    let err = Store::open(&path).await.unwrap_err();
    match err {
        Error::SchemaVersionTooNew { found, supported } => {
            assert_eq!(found, 999);
            assert!(supported < 999);
        }
        other => panic!("expected SchemaVersionTooNew, got {other:?}"),
    }
}

#[tokio::test]
async fn test_partially_migrated_database_catches_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleet.db");

    let store = Store::open(&path).await.unwrap();
    drop(store);

    // Wind the recorded version back past the later steps. Reopening must
    // reapply them; the rerun-safe DDL makes that harmless.
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute("UPDATE system SET schema_version = 1 WHERE id = 1", [])
        .unwrap();
    drop(conn);

    let store = Store::open(&path).await.unwrap();
    let backups = store
        .get_unlocked_installation_backups_pending_work()
        .await
        .unwrap();
    assert!(backups.is_empty());
    let schemas = store
        .get_unlocked_database_schemas_pending_work()
        .await
        .unwrap();
    assert!(schemas.is_empty());
}
