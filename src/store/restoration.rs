//! Database restoration operation repository and the restoration trigger.

use crate::error::{Error, Result};
use crate::model::{
    self, next_installation_state, DbRestorationRequest, DbRestorationState, Installation,
    InstallationDbRestoration, OperationKind,
};
use crate::store::query::{self, Paging};
use crate::store::{no_rows_as_not_found, Store};
use rusqlite::OptionalExtension;
use tracing::debug;

const TABLE: &str = "installation_db_restorations";

const COLUMNS: &str = "id, installation_id, backup_id, state, request_at, complete_at, \
                       delete_at, lock_acquired_by, lock_acquired_at";

fn row_to_restoration(row: &rusqlite::Row<'_>) -> rusqlite::Result<InstallationDbRestoration> {
    let state: String = row.get(3)?;
    Ok(InstallationDbRestoration {
        id: row.get(0)?,
        installation_id: row.get(1)?,
        backup_id: row.get(2)?,
        state: query::from_column(3, state.parse())?,
        request_at: row.get(4)?,
        complete_at: row.get(5)?,
        delete_at: row.get(6)?,
        lock_acquired_by: row.get(7)?,
        lock_acquired_at: row.get(8)?,
    })
}

/// Listing filter for restoration operations.
#[derive(Debug, Clone, Default)]
pub struct DbRestorationFilter {
    pub installation_id: Option<String>,
    pub backup_id: Option<String>,
    pub paging: Paging,
}

impl Store {
    /// Composite transition: create a restoration operation from `request`
    /// and flip the parent installation into `DbRestorationInProgress` in
    /// one commit. Same validation and rollback shape as the migration
    /// trigger.
    pub async fn trigger_installation_db_restoration(
        &self,
        request: DbRestorationRequest,
        installation: &Installation,
    ) -> Result<InstallationDbRestoration> {
        let next = next_installation_state(installation.state, OperationKind::DbRestoration)
            .ok_or(Error::InvalidStateTransition {
                kind: "db restoration",
                from: installation.state.to_string(),
            })?;

        let operation = InstallationDbRestoration {
            id: model::new_id(),
            installation_id: request.installation_id,
            backup_id: request.backup_id,
            state: DbRestorationState::Requested,
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
            .with_transaction("trigger installation db restoration", move |tx| {
                tx.execute(
                    "INSERT INTO installation_db_restorations \
                     (id, installation_id, backup_id, state, request_at, complete_at, delete_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, 0, 0)",
                    rusqlite::params![
                        record.id,
                        record.installation_id,
                        record.backup_id,
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
                    "triggered db restoration {} for installation {}",
                    operation.id, operation.installation_id
                );
                Ok(operation)
            }
            Err(err) => Err(no_rows_as_not_found(err, "installation", &installation.id)),
        }
    }

    /// Fetch one restoration operation; absence is not an error.
    pub async fn get_installation_db_restoration(
        &self,
        id: &str,
    ) -> Result<Option<InstallationDbRestoration>> {
        let id = id.to_string();
        self.exec("get installation db restoration", move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM installation_db_restorations WHERE id = ?1"),
                rusqlite::params![id],
                row_to_restoration,
            )
            .optional()
        })
        .await
    }

    pub async fn get_installation_db_restorations(
        &self,
        filter: &DbRestorationFilter,
    ) -> Result<Vec<InstallationDbRestoration>> {
        let filter = filter.clone();
        self.exec("get installation db restorations", move |conn| {
            let mut sql = format!("SELECT {COLUMNS} FROM installation_db_restorations WHERE 1 = 1");
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(installation_id) = &filter.installation_id {
                sql.push_str(" AND installation_id = ?");
                params.push(Box::new(installation_id.clone()));
            }
            if let Some(backup_id) = &filter.backup_id {
                sql.push_str(" AND backup_id = ?");
                params.push(Box::new(backup_id.clone()));
            }
            query::apply_paging(&mut sql, &mut params, &filter.paging, "request_at");

            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let rows = stmt.query_map(refs.as_slice(), row_to_restoration)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })
        .await
    }

    /// Unlocked restoration operations awaiting their next supervisor step,
    /// oldest first.
    pub async fn get_unlocked_installation_db_restorations_pending_work(
        &self,
    ) -> Result<Vec<InstallationDbRestoration>> {
        let states: Vec<String> = DbRestorationState::pending_work_states()
            .iter()
            .map(|s| s.to_string())
            .collect();
        self.exec("get unlocked db restorations pending work", move |conn| {
            let sql = query::pending_work_sql(TABLE, COLUMNS, "request_at", states.len());
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(states.iter()), row_to_restoration)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })
        .await
    }

    pub async fn lock_installation_db_restoration(&self, id: &str, owner: &str) -> Result<bool> {
        self.lock_rows(TABLE, &[id.to_string()], owner).await
    }

    /// Best-effort batch lock; see [`Store::lock_rows`] for partial-claim
    /// semantics.
    pub async fn lock_installation_db_restorations(
        &self,
        ids: &[String],
        owner: &str,
    ) -> Result<bool> {
        self.lock_rows(TABLE, ids, owner).await
    }

    pub async fn unlock_installation_db_restoration(
        &self,
        id: &str,
        owner: &str,
        force: bool,
    ) -> Result<bool> {
        self.unlock_rows(TABLE, &[id.to_string()], owner, force).await
    }

    pub async fn unlock_installation_db_restorations(
        &self,
        ids: &[String],
        owner: &str,
        force: bool,
    ) -> Result<bool> {
        self.unlock_rows(TABLE, ids, owner, force).await
    }

    /// State-only update.
    #[must_use = "an unchecked update may silently target a missing restoration"]
    pub async fn update_installation_db_restoration_state(
        &self,
        operation: &InstallationDbRestoration,
    ) -> Result<()> {
        let id = operation.id.clone();
        let state = operation.state.to_string();
        let id_for_err = operation.id.clone();
        let rows = self
            .exec("update db restoration state", move |conn| {
                conn.execute(
                    "UPDATE installation_db_restorations SET state = ?1 WHERE id = ?2",
                    rusqlite::params![state, id],
                )
            })
            .await?;

        if rows == 0 {
            return Err(Error::NotFound {
                kind: "db restoration",
                id: id_for_err,
            });
        }
        Ok(())
    }

    /// Field-scoped completion update: terminal state plus completion
    /// timestamp, nothing else.
    #[must_use = "an unchecked update may silently target a missing restoration"]
    pub async fn update_installation_db_restoration_completion(
        &self,
        id: &str,
        state: DbRestorationState,
    ) -> Result<()> {
        let id_owned = id.to_string();
        let now = model::now_millis();
        let rows = self
            .exec("update db restoration completion", move |conn| {
                conn.execute(
                    "UPDATE installation_db_restorations SET state = ?1, complete_at = ?2 \
                     WHERE id = ?3",
                    rusqlite::params![state.to_string(), now, id_owned],
                )
            })
            .await?;

        if rows == 0 {
            return Err(Error::NotFound {
                kind: "db restoration",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Soft-delete: stamps `delete_at` once; repeated calls are no-ops.
    pub async fn delete_installation_db_restoration(&self, id: &str) -> Result<()> {
        let id_owned = id.to_string();
        let now = model::now_millis();
        self.exec("delete installation db restoration", move |conn| {
            conn.execute(
                "UPDATE installation_db_restorations SET delete_at = ?1 \
                 WHERE id = ?2 AND delete_at = 0",
                rusqlite::params![now, id_owned],
            )
        })
        .await?;
        debug!("soft-deleted installation db restoration {}", id);
        Ok(())
    }
}
