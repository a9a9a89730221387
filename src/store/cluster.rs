//! Cluster repository.

use crate::error::{Error, Result};
use crate::model::{self, Cluster, ClusterState};
use crate::model::{decode_provisioner_config, encode_provisioner_config};
use crate::store::query::{self, Paging};
use crate::store::Store;
use rusqlite::OptionalExtension;
use tracing::debug;

const TABLE: &str = "clusters";

const COLUMNS: &str = "id, state, provider, region, version, allow_installations, \
                       provisioner_config, create_at, delete_at, lock_acquired_by, \
                       lock_acquired_at";

fn row_to_cluster(row: &rusqlite::Row<'_>) -> rusqlite::Result<Cluster> {
    let state: String = row.get(1)?;
    let config: String = row.get(6)?;
    Ok(Cluster {
        id: row.get(0)?,
        state: query::from_column(1, state.parse())?,
        provider: row.get(2)?,
        region: row.get(3)?,
        version: row.get(4)?,
        allow_installations: row.get(5)?,
        provisioner_config: query::from_column(6, decode_provisioner_config(&config))?,
        create_at: row.get(7)?,
        delete_at: row.get(8)?,
        lock_acquired_by: row.get(9)?,
        lock_acquired_at: row.get(10)?,
    })
}

/// Listing filter for clusters.
#[derive(Debug, Clone, Default)]
pub struct ClusterFilter {
    pub paging: Paging,
}

impl Store {
    /// Insert a new cluster, assigning its id and creation timestamp.
    pub async fn create_cluster(&self, cluster: &mut Cluster) -> Result<()> {
        cluster.id = model::new_id();
        cluster.create_at = model::now_millis();

        let record = cluster.clone();
        let config = encode_provisioner_config(&record.provisioner_config)?;
        self.exec("create cluster", move |conn| {
            conn.execute(
                "INSERT INTO clusters \
                 (id, state, provider, region, version, allow_installations, \
                  provisioner_config, create_at, delete_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
                rusqlite::params![
                    record.id,
                    record.state.to_string(),
                    record.provider,
                    record.region,
                    record.version,
                    record.allow_installations,
                    config,
                    record.create_at,
                ],
            )?;
            Ok(())
        })
        .await?;

        debug!("created cluster {}", cluster.id);
        Ok(())
    }

    /// Fetch one cluster; absence is not an error.
    pub async fn get_cluster(&self, id: &str) -> Result<Option<Cluster>> {
        let id = id.to_string();
        self.exec("get cluster", move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM clusters WHERE id = ?1"),
                rusqlite::params![id],
                row_to_cluster,
            )
            .optional()
        })
        .await
    }

    pub async fn get_clusters(&self, filter: &ClusterFilter) -> Result<Vec<Cluster>> {
        let filter = filter.clone();
        self.exec("get clusters", move |conn| {
            let mut sql = format!("SELECT {COLUMNS} FROM clusters WHERE 1 = 1");
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            query::apply_paging(&mut sql, &mut params, &filter.paging, "create_at");

            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let rows = stmt.query_map(refs.as_slice(), row_to_cluster)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })
        .await
    }

    /// Unlocked clusters awaiting their next supervisor step, oldest first.
    pub async fn get_unlocked_clusters_pending_work(&self) -> Result<Vec<Cluster>> {
        let states: Vec<String> = ClusterState::pending_work_states()
            .iter()
            .map(|s| s.to_string())
            .collect();
        self.exec("get unlocked clusters pending work", move |conn| {
            let sql = query::pending_work_sql(TABLE, COLUMNS, "create_at", states.len());
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(states.iter()), row_to_cluster)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })
        .await
    }

    pub async fn lock_cluster(&self, id: &str, owner: &str) -> Result<bool> {
        self.lock_rows(TABLE, &[id.to_string()], owner).await
    }

    /// Best-effort batch lock; see [`Store::lock_rows`] for partial-claim
    /// semantics.
    pub async fn lock_clusters(&self, ids: &[String], owner: &str) -> Result<bool> {
        self.lock_rows(TABLE, ids, owner).await
    }

    pub async fn unlock_cluster(&self, id: &str, owner: &str, force: bool) -> Result<bool> {
        self.unlock_rows(TABLE, &[id.to_string()], owner, force).await
    }

    pub async fn unlock_clusters(&self, ids: &[String], owner: &str, force: bool) -> Result<bool> {
        self.unlock_rows(TABLE, ids, owner, force).await
    }

    /// Update the mutable cluster columns. The caller is expected to hold
    /// the cluster lock.
    #[must_use = "an unchecked update may silently target a missing cluster"]
    pub async fn update_cluster(&self, cluster: &Cluster) -> Result<()> {
        let record = cluster.clone();
        let config = encode_provisioner_config(&record.provisioner_config)?;
        let rows = self
            .exec("update cluster", move |conn| {
                conn.execute(
                    "UPDATE clusters SET state = ?1, provider = ?2, region = ?3, \
                     version = ?4, allow_installations = ?5, provisioner_config = ?6 \
                     WHERE id = ?7",
                    rusqlite::params![
                        record.state.to_string(),
                        record.provider,
                        record.region,
                        record.version,
                        record.allow_installations,
                        config,
                        record.id,
                    ],
                )
            })
            .await?;

        if rows == 0 {
            return Err(Error::NotFound {
                kind: "cluster",
                id: cluster.id.clone(),
            });
        }
        Ok(())
    }

    /// State-only update: the lightweight transition when no dependent row
    /// changes with it.
    #[must_use = "an unchecked update may silently target a missing cluster"]
    pub async fn update_cluster_state(&self, cluster: &Cluster) -> Result<()> {
        let id = cluster.id.clone();
        let state = cluster.state.to_string();
        let id_for_err = cluster.id.clone();
        let rows = self
            .exec("update cluster state", move |conn| {
                conn.execute(
                    "UPDATE clusters SET state = ?1 WHERE id = ?2",
                    rusqlite::params![state, id],
                )
            })
            .await?;

        if rows == 0 {
            return Err(Error::NotFound {
                kind: "cluster",
                id: id_for_err,
            });
        }
        Ok(())
    }

    /// Soft-delete: stamps `delete_at` once; repeated calls leave the
    /// original tombstone untouched. The row stays queryable and lockable.
    pub async fn delete_cluster(&self, id: &str) -> Result<()> {
        let id_owned = id.to_string();
        let now = model::now_millis();
        self.exec("delete cluster", move |conn| {
            conn.execute(
                "UPDATE clusters SET delete_at = ?1 WHERE id = ?2 AND delete_at = 0",
                rusqlite::params![now, id_owned],
            )
        })
        .await?;
        debug!("soft-deleted cluster {}", id);
        Ok(())
    }
}
