use fleet_store::model::{Cluster, ClusterState, ProvisionerConfig};
use fleet_store::{ClusterFilter, Error, Paging, Store};

async fn test_store() -> Store {
    Store::open_in_memory().await.expect("Failed to open store")
}

fn small_cluster() -> Cluster {
    Cluster::new(
        "aws",
        "us-east-1",
        "1.29.0",
        ProvisionerConfig {
            node_count: 3,
            node_type: "m5.large".to_string(),
            network_cidr: Some("10.0.0.0/16".to_string()),
        },
    )
}

#[tokio::test]
async fn test_create_and_get_round_trip() {
    let store = test_store().await;
    let mut cluster = small_cluster();
    store.create_cluster(&mut cluster).await.unwrap();
    assert!(!cluster.id.is_empty());
    assert!(cluster.create_at > 0);

    let stored = store.get_cluster(&cluster.id).await.unwrap().unwrap();
    assert_eq!(stored.state, ClusterState::CreationRequested);
    assert_eq!(stored.provider, "aws");
    assert_eq!(stored.region, "us-east-1");
    assert!(!stored.allow_installations);
    assert_eq!(stored.provisioner_config, cluster.provisioner_config);
    assert!(!stored.is_deleted());
    assert!(!stored.is_locked());
}

#[tokio::test]
async fn test_get_missing_cluster_is_none() {
    let store = test_store().await;
    assert!(store.get_cluster("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_persists_mutable_columns() {
    let store = test_store().await;
    let mut cluster = small_cluster();
    store.create_cluster(&mut cluster).await.unwrap();

    let mut stored = store.get_cluster(&cluster.id).await.unwrap().unwrap();
    stored.state = ClusterState::Stable;
    stored.version = "1.30.0".to_string();
    stored.allow_installations = true;
    stored.provisioner_config.node_count = 5;
    store.update_cluster(&stored).await.unwrap();

    let reread = store.get_cluster(&cluster.id).await.unwrap().unwrap();
    assert_eq!(reread.state, ClusterState::Stable);
    assert_eq!(reread.version, "1.30.0");
    assert!(reread.allow_installations);
    assert_eq!(reread.provisioner_config.node_count, 5);
}

#[tokio::test]
async fn test_update_of_missing_cluster_is_not_found() {
    let store = test_store().await;
    let mut ghost = small_cluster();
    ghost.id = "missing".to_string();

    let err = store.update_cluster(&ghost).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    let err = store.update_cluster_state(&ghost).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn test_locking_guards_supervisor_ownership() {
    let store = test_store().await;
    let mut cluster = small_cluster();
    store.create_cluster(&mut cluster).await.unwrap();

    assert!(store.lock_cluster(&cluster.id, "worker-a").await.unwrap());
    assert!(!store.lock_cluster(&cluster.id, "worker-b").await.unwrap());

    let pending = store.get_unlocked_clusters_pending_work().await.unwrap();
    assert!(pending.is_empty());

    assert!(store
        .unlock_cluster(&cluster.id, "worker-a", false)
        .await
        .unwrap());
    let pending = store.get_unlocked_clusters_pending_work().await.unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn test_soft_delete_hides_from_live_listings() {
    let store = test_store().await;
    let mut cluster = small_cluster();
    store.create_cluster(&mut cluster).await.unwrap();

    store.delete_cluster(&cluster.id).await.unwrap();

    let live = store
        .get_clusters(&ClusterFilter::default())
        .await
        .unwrap();
    assert!(live.is_empty());

    let with_deleted = store
        .get_clusters(&ClusterFilter {
            paging: Paging::all().include_deleted(),
        })
        .await
        .unwrap();
    assert_eq!(with_deleted.len(), 1);
    assert!(with_deleted[0].is_deleted());

    // The tombstone keeps the row out of pending work for good.
    let pending = store.get_unlocked_clusters_pending_work().await.unwrap();
    assert!(pending.is_empty());
}
