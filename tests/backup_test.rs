use fleet_store::model::{
    BackupSchedulingData, BackupState, DataResidence, Installation, InstallationState,
};
use fleet_store::{BackupFilter, Error, Store};

async fn test_store() -> Store {
    Store::open_in_memory().await.expect("Failed to open store")
}

async fn trigger_backup(store: &Store) -> (String, String) {
    let mut installation = Installation::new("owner-1", "1.0.0");
    store.create_installation(&mut installation).await.unwrap();
    installation.state = InstallationState::Stable;
    store.update_installation_state(&installation).await.unwrap();
    let installation = store
        .get_installation(&installation.id)
        .await
        .unwrap()
        .unwrap();
    let backup = store
        .trigger_installation_backup(&installation)
        .await
        .unwrap();
    (backup.id, installation.id)
}

#[tokio::test]
async fn test_triggered_backup_starts_requested_and_pending() {
    let store = test_store().await;
    let (backup_id, installation_id) = trigger_backup(&store).await;

    let backup = store
        .get_installation_backup(&backup_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(backup.state, BackupState::BackupRequested);
    assert_eq!(backup.installation_id, installation_id);
    assert_eq!(backup.start_at, 0);
    assert!(backup.data_residence.is_none());

    let pending = store
        .get_unlocked_installation_backups_pending_work()
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn test_scheduling_data_is_a_field_scoped_write() {
    let store = test_store().await;
    let (backup_id, _) = trigger_backup(&store).await;

    // A different path updates state while the scheduler touches start_at.
    let mut backup = store
        .get_installation_backup(&backup_id)
        .await
        .unwrap()
        .unwrap();
    backup.state = BackupState::BackupInProgress;
    store.update_installation_backup_state(&backup).await.unwrap();

    store
        .update_installation_backup_scheduling_data(
            &backup_id,
            &BackupSchedulingData { start_at: 12345 },
        )
        .await
        .unwrap();

    let stored = store
        .get_installation_backup(&backup_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.start_at, 12345);
    // The scheduling write did not clobber the concurrent state change.
    assert_eq!(stored.state, BackupState::BackupInProgress);
}

#[tokio::test]
async fn test_data_residence_round_trip() {
    let store = test_store().await;
    let (backup_id, _) = trigger_backup(&store).await;

    let residence = DataResidence {
        region: "us-east-1".to_string(),
        bucket: "fleet-backups".to_string(),
        object_key: format!("backups/{backup_id}.tar.gz"),
    };
    store
        .update_installation_backup_data_residence(&backup_id, &residence)
        .await
        .unwrap();

    let stored = store
        .get_installation_backup(&backup_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.data_residence, Some(residence));
}

#[tokio::test]
async fn test_listing_by_installation_and_state() {
    let store = test_store().await;
    let (backup_id, installation_id) = trigger_backup(&store).await;

    let listed = store
        .get_installation_backups(&BackupFilter {
            installation_id: Some(installation_id.clone()),
            states: vec![BackupState::BackupRequested],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, backup_id);

    let none = store
        .get_installation_backups(&BackupFilter {
            installation_id: Some(installation_id),
            states: vec![BackupState::BackupSucceeded],
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_terminal_backup_leaves_pending_work() {
    let store = test_store().await;
    let (backup_id, _) = trigger_backup(&store).await;

    let mut backup = store
        .get_installation_backup(&backup_id)
        .await
        .unwrap()
        .unwrap();
    backup.state = BackupState::BackupSucceeded;
    store.update_installation_backup_state(&backup).await.unwrap();

    let pending = store
        .get_unlocked_installation_backups_pending_work()
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_updates_on_missing_backup_are_not_found() {
    let store = test_store().await;

    let err = store
        .update_installation_backup_scheduling_data(
            "missing",
            &BackupSchedulingData { start_at: 1 },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn test_backup_soft_delete_is_idempotent() {
    let store = test_store().await;
    let (backup_id, _) = trigger_backup(&store).await;

    store.delete_installation_backup(&backup_id).await.unwrap();
    let first = store
        .get_installation_backup(&backup_id)
        .await
        .unwrap()
        .unwrap();
    assert!(first.delete_at > 0);

    store.delete_installation_backup(&backup_id).await.unwrap();
    let second = store
        .get_installation_backup(&backup_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.delete_at, first.delete_at);
}
