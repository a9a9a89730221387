use fleet_store::model::Installation;
use fleet_store::Store;

async fn test_store() -> Store {
    Store::open_in_memory().await.expect("Failed to open store")
}

async fn create_installation(store: &Store) -> String {
    let mut installation = Installation::new("owner-1", "1.0.0");
    store.create_installation(&mut installation).await.unwrap();
    installation.id
}

#[tokio::test]
async fn test_mutual_exclusion() {
    let store = test_store().await;
    let id = create_installation(&store).await;

    assert!(store.lock_installation(&id, "worker-a").await.unwrap());
    assert!(!store.lock_installation(&id, "worker-b").await.unwrap());

    let installation = store.get_installation(&id).await.unwrap().unwrap();
    assert_eq!(installation.lock_acquired_by.as_deref(), Some("worker-a"));
    assert!(installation.lock_acquired_at > 0);
}

#[tokio::test]
async fn test_lock_is_not_reentrant_for_its_holder() {
    let store = test_store().await;
    let id = create_installation(&store).await;

    assert!(store.lock_installation(&id, "worker-a").await.unwrap());
    // Indistinguishable from contention by another owner.
    assert!(!store.lock_installation(&id, "worker-a").await.unwrap());
}

#[tokio::test]
async fn test_release_requires_matching_owner() {
    let store = test_store().await;
    let id = create_installation(&store).await;

    assert!(store.lock_installation(&id, "worker-a").await.unwrap());
    assert!(!store
        .unlock_installation(&id, "worker-b", false)
        .await
        .unwrap());
    assert!(store
        .unlock_installation(&id, "worker-a", false)
        .await
        .unwrap());

    let installation = store.get_installation(&id).await.unwrap().unwrap();
    assert_eq!(installation.lock_acquired_by, None);
    assert_eq!(installation.lock_acquired_at, 0);
}

#[tokio::test]
async fn test_force_release_overrides_any_owner() {
    let store = test_store().await;
    let id = create_installation(&store).await;

    assert!(store.lock_installation(&id, "worker-a").await.unwrap());
    assert!(store
        .unlock_installation(&id, "worker-b", true)
        .await
        .unwrap());

    // The row is free again for anyone.
    assert!(store.lock_installation(&id, "worker-b").await.unwrap());
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let store = test_store().await;
    let id = create_installation(&store).await;

    assert!(store.lock_installation(&id, "worker-a").await.unwrap());
    assert!(store
        .unlock_installation(&id, "worker-a", false)
        .await
        .unwrap());
    assert!(!store
        .unlock_installation(&id, "worker-a", false)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_force_release_on_unlocked_row_is_a_noop() {
    let store = test_store().await;
    let id = create_installation(&store).await;

    assert!(!store
        .unlock_installation(&id, "worker-a", true)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_batch_lock_is_best_effort() {
    let store = test_store().await;
    let first = create_installation(&store).await;
    let second = create_installation(&store).await;

    assert!(store.lock_installation(&first, "worker-a").await.unwrap());

    // worker-b requests both; only the second is free, yet the call
    // reports success.
    let ids = vec![first.clone(), second.clone()];
    assert!(store.lock_installations(&ids, "worker-b").await.unwrap());

    let first_row = store.get_installation(&first).await.unwrap().unwrap();
    let second_row = store.get_installation(&second).await.unwrap().unwrap();
    assert_eq!(first_row.lock_acquired_by.as_deref(), Some("worker-a"));
    assert_eq!(second_row.lock_acquired_by.as_deref(), Some("worker-b"));
}

#[tokio::test]
async fn test_batch_release_clears_only_owned_rows() {
    let store = test_store().await;
    let first = create_installation(&store).await;
    let second = create_installation(&store).await;

    assert!(store.lock_installation(&first, "worker-a").await.unwrap());
    assert!(store.lock_installation(&second, "worker-b").await.unwrap());

    let ids = vec![first.clone(), second.clone()];
    assert!(store
        .unlock_installations(&ids, "worker-a", false)
        .await
        .unwrap());

    let first_row = store.get_installation(&first).await.unwrap().unwrap();
    let second_row = store.get_installation(&second).await.unwrap().unwrap();
    assert_eq!(first_row.lock_acquired_by, None);
    assert_eq!(second_row.lock_acquired_by.as_deref(), Some("worker-b"));
}

#[tokio::test]
async fn test_empty_batch_acquires_nothing() {
    let store = test_store().await;
    assert!(!store.lock_installations(&[], "worker-a").await.unwrap());
    assert!(!store
        .unlock_installations(&[], "worker-a", true)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_soft_deleted_rows_stay_lockable() {
    let store = test_store().await;
    let id = create_installation(&store).await;

    // An in-flight holder must be able to release a just-deleted row.
    assert!(store.lock_installation(&id, "worker-a").await.unwrap());
    store.delete_installation(&id).await.unwrap();
    assert!(store
        .unlock_installation(&id, "worker-a", false)
        .await
        .unwrap());

    // And deletion does not make the row unlockable afterwards.
    assert!(store.lock_installation(&id, "worker-b").await.unwrap());
}

#[tokio::test]
async fn test_deletion_does_not_release_a_held_lock() {
    let store = test_store().await;
    let id = create_installation(&store).await;

    assert!(store.lock_installation(&id, "worker-a").await.unwrap());
    store.delete_installation(&id).await.unwrap();

    let installation = store.get_installation(&id).await.unwrap().unwrap();
    assert!(installation.is_deleted());
    assert_eq!(installation.lock_acquired_by.as_deref(), Some("worker-a"));
}
