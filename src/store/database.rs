//! Multitenant database cluster and schema repositories.

use crate::error::{Error, Result};
use crate::model::{
    self, decode_installation_ids, encode_installation_ids, DatabaseCluster,
    DatabaseClusterState, DatabaseSchema, DatabaseSchemaState,
};
use crate::store::query::{self, Paging};
use crate::store::Store;
use rusqlite::OptionalExtension;
use tracing::debug;

const CLUSTER_TABLE: &str = "database_clusters";
const SCHEMA_TABLE: &str = "database_schemas";

const CLUSTER_COLUMNS: &str = "id, state, max_installations, installation_ids, create_at, \
                               delete_at, lock_acquired_by, lock_acquired_at";

const SCHEMA_COLUMNS: &str = "id, state, database_cluster_id, installation_id, name, \
                              create_at, delete_at, lock_acquired_by, lock_acquired_at";

fn row_to_database_cluster(row: &rusqlite::Row<'_>) -> rusqlite::Result<DatabaseCluster> {
    let state: String = row.get(1)?;
    let ids: String = row.get(3)?;
    Ok(DatabaseCluster {
        id: row.get(0)?,
        state: query::from_column(1, state.parse())?,
        max_installations: row.get(2)?,
        installation_ids: query::from_column(3, decode_installation_ids(&ids))?,
        create_at: row.get(4)?,
        delete_at: row.get(5)?,
        lock_acquired_by: row.get(6)?,
        lock_acquired_at: row.get(7)?,
    })
}

fn row_to_database_schema(row: &rusqlite::Row<'_>) -> rusqlite::Result<DatabaseSchema> {
    let state: String = row.get(1)?;
    Ok(DatabaseSchema {
        id: row.get(0)?,
        state: query::from_column(1, state.parse())?,
        database_cluster_id: row.get(2)?,
        installation_id: row.get(3)?,
        name: row.get(4)?,
        create_at: row.get(5)?,
        delete_at: row.get(6)?,
        lock_acquired_by: row.get(7)?,
        lock_acquired_at: row.get(8)?,
    })
}

/// Listing filter for database schemas.
#[derive(Debug, Clone, Default)]
pub struct DatabaseSchemaFilter {
    pub database_cluster_id: Option<String>,
    pub installation_id: Option<String>,
    pub paging: Paging,
}

impl Store {
    /// Insert a new database cluster, assigning its id and creation
    /// timestamp.
    pub async fn create_database_cluster(&self, cluster: &mut DatabaseCluster) -> Result<()> {
        cluster.id = model::new_id();
        cluster.create_at = model::now_millis();

        let record = cluster.clone();
        let ids = encode_installation_ids(&record.installation_ids)?;
        self.exec("create database cluster", move |conn| {
            conn.execute(
                "INSERT INTO database_clusters \
                 (id, state, max_installations, installation_ids, create_at, delete_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                rusqlite::params![
                    record.id,
                    record.state.to_string(),
                    record.max_installations,
                    ids,
                    record.create_at,
                ],
            )?;
            Ok(())
        })
        .await?;

        debug!("created database cluster {}", cluster.id);
        Ok(())
    }

    /// Fetch one database cluster; absence is not an error.
    pub async fn get_database_cluster(&self, id: &str) -> Result<Option<DatabaseCluster>> {
        let id = id.to_string();
        self.exec("get database cluster", move |conn| {
            conn.query_row(
                &format!("SELECT {CLUSTER_COLUMNS} FROM database_clusters WHERE id = ?1"),
                rusqlite::params![id],
                row_to_database_cluster,
            )
            .optional()
        })
        .await
    }

    pub async fn get_database_clusters(&self, paging: &Paging) -> Result<Vec<DatabaseCluster>> {
        let paging = paging.clone();
        self.exec("get database clusters", move |conn| {
            let mut sql = format!("SELECT {CLUSTER_COLUMNS} FROM database_clusters WHERE 1 = 1");
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            query::apply_paging(&mut sql, &mut params, &paging, "create_at");

            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let rows = stmt.query_map(refs.as_slice(), row_to_database_cluster)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })
        .await
    }

    /// Unlocked database clusters awaiting their next supervisor step,
    /// oldest first.
    pub async fn get_unlocked_database_clusters_pending_work(
        &self,
    ) -> Result<Vec<DatabaseCluster>> {
        let states: Vec<String> = DatabaseClusterState::pending_work_states()
            .iter()
            .map(|s| s.to_string())
            .collect();
        self.exec("get unlocked database clusters pending work", move |conn| {
            let sql =
                query::pending_work_sql(CLUSTER_TABLE, CLUSTER_COLUMNS, "create_at", states.len());
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(states.iter()),
                row_to_database_cluster,
            )?
            .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })
        .await
    }

    pub async fn lock_database_cluster(&self, id: &str, owner: &str) -> Result<bool> {
        self.lock_rows(CLUSTER_TABLE, &[id.to_string()], owner).await
    }

    /// Best-effort batch lock; see [`Store::lock_rows`] for partial-claim
    /// semantics.
    pub async fn lock_database_clusters(&self, ids: &[String], owner: &str) -> Result<bool> {
        self.lock_rows(CLUSTER_TABLE, ids, owner).await
    }

    pub async fn unlock_database_cluster(
        &self,
        id: &str,
        owner: &str,
        force: bool,
    ) -> Result<bool> {
        self.unlock_rows(CLUSTER_TABLE, &[id.to_string()], owner, force)
            .await
    }

    pub async fn unlock_database_clusters(
        &self,
        ids: &[String],
        owner: &str,
        force: bool,
    ) -> Result<bool> {
        self.unlock_rows(CLUSTER_TABLE, ids, owner, force).await
    }

    /// State-only update.
    #[must_use = "an unchecked update may silently target a missing database cluster"]
    pub async fn update_database_cluster_state(&self, cluster: &DatabaseCluster) -> Result<()> {
        let id = cluster.id.clone();
        let state = cluster.state.to_string();
        let id_for_err = cluster.id.clone();
        let rows = self
            .exec("update database cluster state", move |conn| {
                conn.execute(
                    "UPDATE database_clusters SET state = ?1 WHERE id = ?2",
                    rusqlite::params![state, id],
                )
            })
            .await?;

        if rows == 0 {
            return Err(Error::NotFound {
                kind: "database cluster",
                id: id_for_err,
            });
        }
        Ok(())
    }

    /// Field-scoped update of the assigned-installation list only. The
    /// caller is expected to hold the database cluster lock while editing
    /// the membership list.
    #[must_use = "an unchecked update may silently target a missing database cluster"]
    pub async fn update_database_cluster_installations(
        &self,
        id: &str,
        installation_ids: &[String],
    ) -> Result<()> {
        let id_owned = id.to_string();
        let encoded = encode_installation_ids(installation_ids)?;
        let rows = self
            .exec("update database cluster installations", move |conn| {
                conn.execute(
                    "UPDATE database_clusters SET installation_ids = ?1 WHERE id = ?2",
                    rusqlite::params![encoded, id_owned],
                )
            })
            .await?;

        if rows == 0 {
            return Err(Error::NotFound {
                kind: "database cluster",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Soft-delete: stamps `delete_at` once; repeated calls are no-ops.
    pub async fn delete_database_cluster(&self, id: &str) -> Result<()> {
        let id_owned = id.to_string();
        let now = model::now_millis();
        self.exec("delete database cluster", move |conn| {
            conn.execute(
                "UPDATE database_clusters SET delete_at = ?1 WHERE id = ?2 AND delete_at = 0",
                rusqlite::params![now, id_owned],
            )
        })
        .await?;
        debug!("soft-deleted database cluster {}", id);
        Ok(())
    }

    /// Insert a new database schema, assigning its id and creation
    /// timestamp.
    pub async fn create_database_schema(&self, schema: &mut DatabaseSchema) -> Result<()> {
        schema.id = model::new_id();
        schema.create_at = model::now_millis();

        let record = schema.clone();
        self.exec("create database schema", move |conn| {
            conn.execute(
                "INSERT INTO database_schemas \
                 (id, state, database_cluster_id, installation_id, name, create_at, delete_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                rusqlite::params![
                    record.id,
                    record.state.to_string(),
                    record.database_cluster_id,
                    record.installation_id,
                    record.name,
                    record.create_at,
                ],
            )?;
            Ok(())
        })
        .await?;

        debug!("created database schema {}", schema.id);
        Ok(())
    }

    /// Fetch one database schema; absence is not an error.
    pub async fn get_database_schema(&self, id: &str) -> Result<Option<DatabaseSchema>> {
        let id = id.to_string();
        self.exec("get database schema", move |conn| {
            conn.query_row(
                &format!("SELECT {SCHEMA_COLUMNS} FROM database_schemas WHERE id = ?1"),
                rusqlite::params![id],
                row_to_database_schema,
            )
            .optional()
        })
        .await
    }

    pub async fn get_database_schemas(
        &self,
        filter: &DatabaseSchemaFilter,
    ) -> Result<Vec<DatabaseSchema>> {
        let filter = filter.clone();
        self.exec("get database schemas", move |conn| {
            let mut sql = format!("SELECT {SCHEMA_COLUMNS} FROM database_schemas WHERE 1 = 1");
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(cluster_id) = &filter.database_cluster_id {
                sql.push_str(" AND database_cluster_id = ?");
                params.push(Box::new(cluster_id.clone()));
            }
            if let Some(installation_id) = &filter.installation_id {
                sql.push_str(" AND installation_id = ?");
                params.push(Box::new(installation_id.clone()));
            }
            query::apply_paging(&mut sql, &mut params, &filter.paging, "create_at");

            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let rows = stmt.query_map(refs.as_slice(), row_to_database_schema)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })
        .await
    }

    /// Unlocked database schemas awaiting their next supervisor step,
    /// oldest first.
    pub async fn get_unlocked_database_schemas_pending_work(
        &self,
    ) -> Result<Vec<DatabaseSchema>> {
        let states: Vec<String> = DatabaseSchemaState::pending_work_states()
            .iter()
            .map(|s| s.to_string())
            .collect();
        self.exec("get unlocked database schemas pending work", move |conn| {
            let sql =
                query::pending_work_sql(SCHEMA_TABLE, SCHEMA_COLUMNS, "create_at", states.len());
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(states.iter()),
                row_to_database_schema,
            )?
            .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })
        .await
    }

    pub async fn lock_database_schema(&self, id: &str, owner: &str) -> Result<bool> {
        self.lock_rows(SCHEMA_TABLE, &[id.to_string()], owner).await
    }

    /// Best-effort batch lock; see [`Store::lock_rows`] for partial-claim
    /// semantics.
    pub async fn lock_database_schemas(&self, ids: &[String], owner: &str) -> Result<bool> {
        self.lock_rows(SCHEMA_TABLE, ids, owner).await
    }

    pub async fn unlock_database_schema(
        &self,
        id: &str,
        owner: &str,
        force: bool,
    ) -> Result<bool> {
        self.unlock_rows(SCHEMA_TABLE, &[id.to_string()], owner, force)
            .await
    }

    pub async fn unlock_database_schemas(
        &self,
        ids: &[String],
        owner: &str,
        force: bool,
    ) -> Result<bool> {
        self.unlock_rows(SCHEMA_TABLE, ids, owner, force).await
    }

    /// State-only update.
    #[must_use = "an unchecked update may silently target a missing database schema"]
    pub async fn update_database_schema_state(&self, schema: &DatabaseSchema) -> Result<()> {
        let id = schema.id.clone();
        let state = schema.state.to_string();
        let id_for_err = schema.id.clone();
        let rows = self
            .exec("update database schema state", move |conn| {
                conn.execute(
                    "UPDATE database_schemas SET state = ?1 WHERE id = ?2",
                    rusqlite::params![state, id],
                )
            })
            .await?;

        if rows == 0 {
            return Err(Error::NotFound {
                kind: "database schema",
                id: id_for_err,
            });
        }
        Ok(())
    }

    /// Soft-delete: stamps `delete_at` once; repeated calls are no-ops.
    pub async fn delete_database_schema(&self, id: &str) -> Result<()> {
        let id_owned = id.to_string();
        let now = model::now_millis();
        self.exec("delete database schema", move |conn| {
            conn.execute(
                "UPDATE database_schemas SET delete_at = ?1 WHERE id = ?2 AND delete_at = 0",
                rusqlite::params![now, id_owned],
            )
        })
        .await?;
        debug!("soft-deleted database schema {}", id);
        Ok(())
    }
}
