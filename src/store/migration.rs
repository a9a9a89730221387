//! Database migration operation repository and the migration trigger.

use crate::error::{Error, Result};
use crate::model::{
    self, next_installation_state, DbMigrationRequest, DbMigrationState, Installation,
    InstallationDbMigration, OperationKind,
};
use crate::store::query::{self, Paging};
use crate::store::{no_rows_as_not_found, Store};
use rusqlite::OptionalExtension;
use tracing::debug;

const TABLE: &str = "installation_db_migrations";

const COLUMNS: &str = "id, installation_id, backup_id, source_database, destination_database, \
                       state, request_at, complete_at, delete_at, lock_acquired_by, \
                       lock_acquired_at";

fn row_to_migration(row: &rusqlite::Row<'_>) -> rusqlite::Result<InstallationDbMigration> {
    let state: String = row.get(5)?;
    Ok(InstallationDbMigration {
        id: row.get(0)?,
        installation_id: row.get(1)?,
        backup_id: row.get(2)?,
        source_database: row.get(3)?,
        destination_database: row.get(4)?,
        state: query::from_column(5, state.parse())?,
        request_at: row.get(6)?,
        complete_at: row.get(7)?,
        delete_at: row.get(8)?,
        lock_acquired_by: row.get(9)?,
        lock_acquired_at: row.get(10)?,
    })
}

/// Listing filter for migration operations.
#[derive(Debug, Clone, Default)]
pub struct DbMigrationFilter {
    pub installation_id: Option<String>,
    pub paging: Paging,
}

impl Store {
    /// Composite transition: create a migration operation from `request`
    /// and flip the parent installation into `DbMigrationInProgress` in one
    /// commit. Validation happens before any write; inside the transaction
    /// the parent update is conditional on the state the caller observed,
    /// and a zero-row match rolls the whole scope back.
    pub async fn trigger_installation_db_migration(
        &self,
        request: DbMigrationRequest,
        installation: &Installation,
    ) -> Result<InstallationDbMigration> {
        let next = next_installation_state(installation.state, OperationKind::DbMigration).ok_or(
            Error::InvalidStateTransition {
                kind: "db migration",
                from: installation.state.to_string(),
            },
        )?;

        let operation = InstallationDbMigration {
            id: model::new_id(),
            installation_id: request.installation_id,
            backup_id: None,
            source_database: request.source_database,
            destination_database: request.destination_database,
            state: DbMigrationState::Requested,
            request_at: model::now_millis(),
            complete_at: 0,
            delete_at: 0,
            lock_acquired_by: None,
            lock_acquired_at: 0,
        };

        let record = operation.clone();
        let installation_id = installation.id.clone();
        let observed_state = installation.state;
        let result = self
            .with_transaction("trigger installation db migration", move |tx| {
                tx.execute(
                    "INSERT INTO installation_db_migrations \
                     (id, installation_id, backup_id, source_database, destination_database, \
                      state, request_at, complete_at, delete_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0)",
                    rusqlite::params![
                        record.id,
                        record.installation_id,
                        record.backup_id,
                        record.source_database,
                        record.destination_database,
                        record.state.to_string(),
                        record.request_at,
                    ],
                )?;
                let rows = tx.execute(
                    "UPDATE installations SET state = ?1 WHERE id = ?2 AND state = ?3",
                    rusqlite::params![
                        next.to_string(),
                        installation_id,
                        observed_state.to_string()
                    ],
                )?;
                if rows == 0 {
                    return Err(rusqlite::Error::QueryReturnedNoRows);
                }
                Ok(())
            })
            .await;

        match result {
            Ok(()) => {
                debug!(
                    "triggered db migration {} for installation {}",
                    operation.id, operation.installation_id
                );
                Ok(operation)
            }
            Err(err) => Err(no_rows_as_not_found(err, "installation", &installation.id)),
        }
    }

    /// Fetch one migration operation; absence is not an error.
    pub async fn get_installation_db_migration(
        &self,
        id: &str,
    ) -> Result<Option<InstallationDbMigration>> {
        let id = id.to_string();
        self.exec("get installation db migration", move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM installation_db_migrations WHERE id = ?1"),
                rusqlite::params![id],
                row_to_migration,
            )
            .optional()
        })
        .await
    }

    pub async fn get_installation_db_migrations(
        &self,
        filter: &DbMigrationFilter,
    ) -> Result<Vec<InstallationDbMigration>> {
        let filter = filter.clone();
        self.exec("get installation db migrations", move |conn| {
            let mut sql = format!("SELECT {COLUMNS} FROM installation_db_migrations WHERE 1 = 1");
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(installation_id) = &filter.installation_id {
                sql.push_str(" AND installation_id = ?");
                params.push(Box::new(installation_id.clone()));
            }
            query::apply_paging(&mut sql, &mut params, &filter.paging, "request_at");

            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let rows = stmt.query_map(refs.as_slice(), row_to_migration)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })
        .await
    }

    /// Unlocked migration operations awaiting their next supervisor step,
    /// oldest first.
    pub async fn get_unlocked_installation_db_migrations_pending_work(
        &self,
    ) -> Result<Vec<InstallationDbMigration>> {
        let states: Vec<String> = DbMigrationState::pending_work_states()
            .iter()
            .map(|s| s.to_string())
            .collect();
        self.exec("get unlocked db migrations pending work", move |conn| {
            let sql = query::pending_work_sql(TABLE, COLUMNS, "request_at", states.len());
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(states.iter()), row_to_migration)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })
        .await
    }

    pub async fn lock_installation_db_migration(&self, id: &str, owner: &str) -> Result<bool> {
        self.lock_rows(TABLE, &[id.to_string()], owner).await
    }

    /// Best-effort batch lock; see [`Store::lock_rows`] for partial-claim
    /// semantics.
    pub async fn lock_installation_db_migrations(
        &self,
        ids: &[String],
        owner: &str,
    ) -> Result<bool> {
        self.lock_rows(TABLE, ids, owner).await
    }

    pub async fn unlock_installation_db_migration(
        &self,
        id: &str,
        owner: &str,
        force: bool,
    ) -> Result<bool> {
        self.unlock_rows(TABLE, &[id.to_string()], owner, force).await
    }

    pub async fn unlock_installation_db_migrations(
        &self,
        ids: &[String],
        owner: &str,
        force: bool,
    ) -> Result<bool> {
        self.unlock_rows(TABLE, ids, owner, force).await
    }

    /// State-only update.
    #[must_use = "an unchecked update may silently target a missing migration"]
    pub async fn update_installation_db_migration_state(
        &self,
        operation: &InstallationDbMigration,
    ) -> Result<()> {
        let id = operation.id.clone();
        let state = operation.state.to_string();
        let id_for_err = operation.id.clone();
        let rows = self
            .exec("update db migration state", move |conn| {
                conn.execute(
                    "UPDATE installation_db_migrations SET state = ?1 WHERE id = ?2",
                    rusqlite::params![state, id],
                )
            })
            .await?;

        if rows == 0 {
            return Err(Error::NotFound {
                kind: "db migration",
                id: id_for_err,
            });
        }
        Ok(())
    }

    /// Field-scoped update linking the safety backup once it exists.
    #[must_use = "an unchecked update may silently target a missing migration"]
    pub async fn update_installation_db_migration_backup(
        &self,
        id: &str,
        backup_id: &str,
    ) -> Result<()> {
        let id_owned = id.to_string();
        let backup_id = backup_id.to_string();
        let rows = self
            .exec("update db migration backup", move |conn| {
                conn.execute(
                    "UPDATE installation_db_migrations SET backup_id = ?1 WHERE id = ?2",
                    rusqlite::params![backup_id, id_owned],
                )
            })
            .await?;

        if rows == 0 {
            return Err(Error::NotFound {
                kind: "db migration",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Field-scoped completion update: terminal state plus completion
    /// timestamp, nothing else.
    #[must_use = "an unchecked update may silently target a missing migration"]
    pub async fn update_installation_db_migration_completion(
        &self,
        id: &str,
        state: DbMigrationState,
    ) -> Result<()> {
        let id_owned = id.to_string();
        let now = model::now_millis();
        let rows = self
            .exec("update db migration completion", move |conn| {
                conn.execute(
                    "UPDATE installation_db_migrations SET state = ?1, complete_at = ?2 \
                     WHERE id = ?3",
                    rusqlite::params![state.to_string(), now, id_owned],
                )
            })
            .await?;

        if rows == 0 {
            return Err(Error::NotFound {
                kind: "db migration",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Soft-delete: stamps `delete_at` once; repeated calls are no-ops.
    pub async fn delete_installation_db_migration(&self, id: &str) -> Result<()> {
        let id_owned = id.to_string();
        let now = model::now_millis();
        self.exec("delete installation db migration", move |conn| {
            conn.execute(
                "UPDATE installation_db_migrations SET delete_at = ?1 \
                 WHERE id = ?2 AND delete_at = 0",
                rusqlite::params![now, id_owned],
            )
        })
        .await?;
        debug!("soft-deleted installation db migration {}", id);
        Ok(())
    }
}
