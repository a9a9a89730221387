//! Installation backup repository and the backup trigger.

use crate::error::{Error, Result};
use crate::model::{
    self, decode_data_residence, encode_data_residence, next_installation_state,
    BackupSchedulingData, BackupState, DataResidence, Installation, InstallationBackup,
    OperationKind,
};
use crate::store::query::{self, Paging};
use crate::store::{no_rows_as_not_found, Store};
use rusqlite::OptionalExtension;
use tracing::debug;

const TABLE: &str = "installation_backups";

const COLUMNS: &str = "id, installation_id, state, request_at, start_at, data_residence, \
                       delete_at, lock_acquired_by, lock_acquired_at";

fn row_to_backup(row: &rusqlite::Row<'_>) -> rusqlite::Result<InstallationBackup> {
    let state: String = row.get(2)?;
    let residence: Option<String> = row.get(5)?;
    Ok(InstallationBackup {
        id: row.get(0)?,
        installation_id: row.get(1)?,
        state: query::from_column(2, state.parse())?,
        request_at: row.get(3)?,
        start_at: row.get(4)?,
        data_residence: residence
            .map(|raw| query::from_column(5, decode_data_residence(&raw)))
            .transpose()?,
        delete_at: row.get(6)?,
        lock_acquired_by: row.get(7)?,
        lock_acquired_at: row.get(8)?,
    })
}

/// Listing filter for installation backups.
#[derive(Debug, Clone, Default)]
pub struct BackupFilter {
    pub installation_id: Option<String>,
    pub states: Vec<BackupState>,
    pub paging: Paging,
}

impl Store {
    /// Composite transition: create a backup operation for `installation`
    /// and flip the installation into `BackupInProgress` in one commit.
    ///
    /// The transition is validated synchronously — an installation that is
    /// neither stable nor hibernating is rejected without a write. Inside
    /// the transaction the parent update is conditional on the state the
    /// caller observed; if another writer moved the installation first, the
    /// whole scope rolls back and neither row is visible.
    pub async fn trigger_installation_backup(
        &self,
        installation: &Installation,
    ) -> Result<InstallationBackup> {
        let next = next_installation_state(installation.state, OperationKind::Backup).ok_or(
            Error::InvalidStateTransition {
                kind: "backup",
                from: installation.state.to_string(),
            },
        )?;

        let mut backup = InstallationBackup::new(installation.id.clone());
        backup.id = model::new_id();
        backup.request_at = model::now_millis();

        let record = backup.clone();
        let installation_id = installation.id.clone();
        let observed_state = installation.state;
        let result = self
            .with_transaction("trigger installation backup", move |tx| {
                tx.execute(
                    "INSERT INTO installation_backups \
                     (id, installation_id, state, request_at, start_at, delete_at) \
                     VALUES (?1, ?2, ?3, ?4, 0, 0)",
                    rusqlite::params![
                        record.id,
                        record.installation_id,
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
                    "triggered backup {} for installation {}",
                    backup.id, backup.installation_id
                );
                Ok(backup)
            }
            Err(err) => Err(no_rows_as_not_found(err, "installation", &installation.id)),
        }
    }

    /// Fetch one backup; absence is not an error.
    pub async fn get_installation_backup(&self, id: &str) -> Result<Option<InstallationBackup>> {
        let id = id.to_string();
        self.exec("get installation backup", move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM installation_backups WHERE id = ?1"),
                rusqlite::params![id],
                row_to_backup,
            )
            .optional()
        })
        .await
    }

    pub async fn get_installation_backups(
        &self,
        filter: &BackupFilter,
    ) -> Result<Vec<InstallationBackup>> {
        let filter = filter.clone();
        self.exec("get installation backups", move |conn| {
            let mut sql = format!("SELECT {COLUMNS} FROM installation_backups WHERE 1 = 1");
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(installation_id) = &filter.installation_id {
                sql.push_str(" AND installation_id = ?");
                params.push(Box::new(installation_id.clone()));
            }
            if !filter.states.is_empty() {
                sql.push_str(&format!(
                    " AND state IN ({})",
                    query::in_clause(filter.states.len())
                ));
                for state in &filter.states {
                    params.push(Box::new(state.to_string()));
                }
            }
            query::apply_paging(&mut sql, &mut params, &filter.paging, "request_at");

            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let rows = stmt.query_map(refs.as_slice(), row_to_backup)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })
        .await
    }

    /// Unlocked backups awaiting their next supervisor step, oldest first.
    pub async fn get_unlocked_installation_backups_pending_work(
        &self,
    ) -> Result<Vec<InstallationBackup>> {
        let states: Vec<String> = BackupState::pending_work_states()
            .iter()
            .map(|s| s.to_string())
            .collect();
        self.exec("get unlocked backups pending work", move |conn| {
            let sql = query::pending_work_sql(TABLE, COLUMNS, "request_at", states.len());
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(states.iter()), row_to_backup)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })
        .await
    }

    pub async fn lock_installation_backup(&self, id: &str, owner: &str) -> Result<bool> {
        self.lock_rows(TABLE, &[id.to_string()], owner).await
    }

    /// Best-effort batch lock; see [`Store::lock_rows`] for partial-claim
    /// semantics.
    pub async fn lock_installation_backups(&self, ids: &[String], owner: &str) -> Result<bool> {
        self.lock_rows(TABLE, ids, owner).await
    }

    pub async fn unlock_installation_backup(
        &self,
        id: &str,
        owner: &str,
        force: bool,
    ) -> Result<bool> {
        self.unlock_rows(TABLE, &[id.to_string()], owner, force).await
    }

    pub async fn unlock_installation_backups(
        &self,
        ids: &[String],
        owner: &str,
        force: bool,
    ) -> Result<bool> {
        self.unlock_rows(TABLE, ids, owner, force).await
    }

    /// State-only update.
    #[must_use = "an unchecked update may silently target a missing backup"]
    pub async fn update_installation_backup_state(
        &self,
        backup: &InstallationBackup,
    ) -> Result<()> {
        let id = backup.id.clone();
        let state = backup.state.to_string();
        let id_for_err = backup.id.clone();
        let rows = self
            .exec("update backup state", move |conn| {
                conn.execute(
                    "UPDATE installation_backups SET state = ?1 WHERE id = ?2",
                    rusqlite::params![state, id],
                )
            })
            .await?;

        if rows == 0 {
            return Err(Error::NotFound {
                kind: "backup",
                id: id_for_err,
            });
        }
        Ok(())
    }

    /// Field-scoped update of the scheduling metadata only. Leaves every
    /// other column untouched so it cannot clobber a concurrent writer
    /// working on a disjoint field set.
    #[must_use = "an unchecked update may silently target a missing backup"]
    pub async fn update_installation_backup_scheduling_data(
        &self,
        id: &str,
        scheduling: &BackupSchedulingData,
    ) -> Result<()> {
        let id_owned = id.to_string();
        let start_at = scheduling.start_at;
        let rows = self
            .exec("update backup scheduling data", move |conn| {
                conn.execute(
                    "UPDATE installation_backups SET start_at = ?1 WHERE id = ?2",
                    rusqlite::params![start_at, id_owned],
                )
            })
            .await?;

        if rows == 0 {
            return Err(Error::NotFound {
                kind: "backup",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Field-scoped update recording where the backup artifact landed.
    #[must_use = "an unchecked update may silently target a missing backup"]
    pub async fn update_installation_backup_data_residence(
        &self,
        id: &str,
        residence: &DataResidence,
    ) -> Result<()> {
        let id_owned = id.to_string();
        let encoded = encode_data_residence(residence)?;
        let rows = self
            .exec("update backup data residence", move |conn| {
                conn.execute(
                    "UPDATE installation_backups SET data_residence = ?1 WHERE id = ?2",
                    rusqlite::params![encoded, id_owned],
                )
            })
            .await?;

        if rows == 0 {
            return Err(Error::NotFound {
                kind: "backup",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Soft-delete: stamps `delete_at` once; repeated calls are no-ops.
    pub async fn delete_installation_backup(&self, id: &str) -> Result<()> {
        let id_owned = id.to_string();
        let now = model::now_millis();
        self.exec("delete installation backup", move |conn| {
            conn.execute(
                "UPDATE installation_backups SET delete_at = ?1 WHERE id = ?2 AND delete_at = 0",
                rusqlite::params![now, id_owned],
            )
        })
        .await?;
        debug!("soft-deleted installation backup {}", id);
        Ok(())
    }
}
