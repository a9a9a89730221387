use fleet_store::model::{
    DatabaseCluster, DatabaseClusterState, DatabaseSchema, DatabaseSchemaState,
};
use fleet_store::{DatabaseSchemaFilter, Error, Paging, Store};

async fn test_store() -> Store {
    Store::open_in_memory().await.expect("Failed to open store")
}

#[tokio::test]
async fn test_database_cluster_round_trip_and_capacity() {
    let store = test_store().await;
    let mut cluster = DatabaseCluster::new(2);
    store.create_database_cluster(&mut cluster).await.unwrap();
    assert!(!cluster.id.is_empty());

    let stored = store
        .get_database_cluster(&cluster.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state, DatabaseClusterState::ProvisioningRequested);
    assert_eq!(stored.max_installations, 2);
    assert!(stored.installation_ids.is_empty());
    assert!(stored.has_capacity());

    store
        .update_database_cluster_installations(
            &cluster.id,
            &["inst-1".to_string(), "inst-2".to_string()],
        )
        .await
        .unwrap();

    let full = store
        .get_database_cluster(&cluster.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(full.installation_ids, vec!["inst-1", "inst-2"]);
    assert!(!full.has_capacity());
}

#[tokio::test]
async fn test_installation_list_update_leaves_state_alone() {
    let store = test_store().await;
    let mut cluster = DatabaseCluster::new(10);
    store.create_database_cluster(&mut cluster).await.unwrap();

    let mut stable = store
        .get_database_cluster(&cluster.id)
        .await
        .unwrap()
        .unwrap();
    stable.state = DatabaseClusterState::Stable;
    store.update_database_cluster_state(&stable).await.unwrap();

    store
        .update_database_cluster_installations(&cluster.id, &["inst-1".to_string()])
        .await
        .unwrap();

    let stored = store
        .get_database_cluster(&cluster.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state, DatabaseClusterState::Stable);
    assert_eq!(stored.installation_ids, vec!["inst-1"]);
}

#[tokio::test]
async fn test_database_cluster_pending_work_and_locking() {
    let store = test_store().await;
    let mut cluster = DatabaseCluster::new(10);
    store.create_database_cluster(&mut cluster).await.unwrap();

    let pending = store
        .get_unlocked_database_clusters_pending_work()
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);

    assert!(store
        .lock_database_cluster(&cluster.id, "worker-a")
        .await
        .unwrap());
    let pending = store
        .get_unlocked_database_clusters_pending_work()
        .await
        .unwrap();
    assert!(pending.is_empty());

    assert!(store
        .unlock_database_cluster(&cluster.id, "worker-a", false)
        .await
        .unwrap());

    let mut stable = store
        .get_database_cluster(&cluster.id)
        .await
        .unwrap()
        .unwrap();
    stable.state = DatabaseClusterState::Stable;
    store.update_database_cluster_state(&stable).await.unwrap();
    let pending = store
        .get_unlocked_database_clusters_pending_work()
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_updates_on_missing_rows_are_not_found() {
    let store = test_store().await;

    let err = store
        .update_database_cluster_installations("missing", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    let mut ghost = DatabaseSchema::new("dbc-1", "inst-1", "schema_inst_1");
    ghost.id = "missing".to_string();
    let err = store.update_database_schema_state(&ghost).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn test_database_schema_lifecycle() {
    let store = test_store().await;
    let mut cluster = DatabaseCluster::new(10);
    store.create_database_cluster(&mut cluster).await.unwrap();

    let mut schema = DatabaseSchema::new(&cluster.id, "inst-1", "schema_inst_1");
    store.create_database_schema(&mut schema).await.unwrap();

    let stored = store
        .get_database_schema(&schema.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state, DatabaseSchemaState::CreationRequested);
    assert_eq!(stored.database_cluster_id, cluster.id);
    assert_eq!(stored.name, "schema_inst_1");

    let pending = store
        .get_unlocked_database_schemas_pending_work()
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);

    assert!(store
        .lock_database_schema(&schema.id, "worker-a")
        .await
        .unwrap());
    let mut claimed = store
        .get_database_schema(&schema.id)
        .await
        .unwrap()
        .unwrap();
    claimed.state = DatabaseSchemaState::Stable;
    store.update_database_schema_state(&claimed).await.unwrap();
    assert!(store
        .unlock_database_schema(&schema.id, "worker-a", false)
        .await
        .unwrap());

    let pending = store
        .get_unlocked_database_schemas_pending_work()
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_schema_listing_filters() {
    let store = test_store().await;

    let mut first = DatabaseSchema::new("dbc-1", "inst-1", "schema_inst_1");
    store.create_database_schema(&mut first).await.unwrap();
    let mut second = DatabaseSchema::new("dbc-1", "inst-2", "schema_inst_2");
    store.create_database_schema(&mut second).await.unwrap();
    let mut third = DatabaseSchema::new("dbc-2", "inst-3", "schema_inst_3");
    store.create_database_schema(&mut third).await.unwrap();

    let by_cluster = store
        .get_database_schemas(&DatabaseSchemaFilter {
            database_cluster_id: Some("dbc-1".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_cluster.len(), 2);

    let by_installation = store
        .get_database_schemas(&DatabaseSchemaFilter {
            installation_id: Some("inst-3".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_installation.len(), 1);
    assert_eq!(by_installation[0].id, third.id);
}

#[tokio::test]
async fn test_soft_deletes() {
    let store = test_store().await;
    let mut cluster = DatabaseCluster::new(10);
    store.create_database_cluster(&mut cluster).await.unwrap();
    let mut schema = DatabaseSchema::new(&cluster.id, "inst-1", "schema_inst_1");
    store.create_database_schema(&mut schema).await.unwrap();

    store.delete_database_cluster(&cluster.id).await.unwrap();
    store.delete_database_schema(&schema.id).await.unwrap();

    let clusters = store.get_database_clusters(&Paging::all()).await.unwrap();
    assert!(clusters.is_empty());
    let schemas = store
        .get_database_schemas(&DatabaseSchemaFilter::default())
        .await
        .unwrap();
    assert!(schemas.is_empty());

    let with_deleted = store
        .get_database_clusters(&Paging::all().include_deleted())
        .await
        .unwrap();
    assert_eq!(with_deleted.len(), 1);
    assert!(with_deleted[0].delete_at > 0);
}
