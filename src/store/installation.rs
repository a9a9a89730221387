//! Installation repository.

use crate::error::{Error, Result};
use crate::model::{self, decode_env, encode_env, Installation, InstallationState};
use crate::store::query::{self, Paging};
use crate::store::Store;
use rusqlite::OptionalExtension;
use tracing::debug;

const TABLE: &str = "installations";

const COLUMNS: &str = "id, state, owner_id, group_id, version, size, affinity, env, \
                       create_at, delete_at, lock_acquired_by, lock_acquired_at";

fn row_to_installation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Installation> {
    let state: String = row.get(1)?;
    let env: String = row.get(7)?;

    let mut installation = Installation::new(row.get::<_, String>(2)?, row.get::<_, String>(4)?);
    installation.id = row.get(0)?;
    installation.state = query::from_column(1, state.parse())?;
    installation.group_id = row.get(3)?;
    installation.size = row.get(5)?;
    installation.affinity = row.get(6)?;
    installation.env = query::from_column(7, decode_env(&env))?;
    installation.create_at = row.get(8)?;
    installation.delete_at = row.get(9)?;
    installation.lock_acquired_by = row.get(10)?;
    installation.lock_acquired_at = row.get(11)?;
    Ok(installation)
}

/// Listing filter for installations.
#[derive(Debug, Clone, Default)]
pub struct InstallationFilter {
    pub owner_id: Option<String>,
    pub group_id: Option<String>,
    pub state: Option<InstallationState>,
    pub paging: Paging,
}

impl Store {
    /// Insert a new installation, assigning its id and creation timestamp.
    /// A record carrying merged group overrides is rejected before any
    /// write is attempted.
    pub async fn create_installation(&self, installation: &mut Installation) -> Result<()> {
        if installation.group_overrides_applied() {
            return Err(Error::GroupConfigNotStorable(installation.id.clone()));
        }
        installation.id = model::new_id();
        installation.create_at = model::now_millis();

        let record = installation.clone();
        let env = encode_env(&record.env)?;
        self.exec("create installation", move |conn| {
            conn.execute(
                "INSERT INTO installations \
                 (id, state, owner_id, group_id, version, size, affinity, env, \
                  create_at, delete_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)",
                rusqlite::params![
                    record.id,
                    record.state.to_string(),
                    record.owner_id,
                    record.group_id,
                    record.version,
                    record.size,
                    record.affinity,
                    env,
                    record.create_at,
                ],
            )?;
            Ok(())
        })
        .await?;

        debug!("created installation {}", installation.id);
        Ok(())
    }

    /// Fetch one installation; absence is not an error.
    pub async fn get_installation(&self, id: &str) -> Result<Option<Installation>> {
        let id = id.to_string();
        self.exec("get installation", move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM installations WHERE id = ?1"),
                rusqlite::params![id],
                row_to_installation,
            )
            .optional()
        })
        .await
    }

    pub async fn get_installations(&self, filter: &InstallationFilter) -> Result<Vec<Installation>> {
        let filter = filter.clone();
        self.exec("get installations", move |conn| {
            let mut sql = format!("SELECT {COLUMNS} FROM installations WHERE 1 = 1");
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(owner) = &filter.owner_id {
                sql.push_str(" AND owner_id = ?");
                params.push(Box::new(owner.clone()));
            }
            if let Some(group) = &filter.group_id {
                sql.push_str(" AND group_id = ?");
                params.push(Box::new(group.clone()));
            }
            if let Some(state) = filter.state {
                sql.push_str(" AND state = ?");
                params.push(Box::new(state.to_string()));
            }
            query::apply_paging(&mut sql, &mut params, &filter.paging, "create_at");

            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let rows = stmt.query_map(refs.as_slice(), row_to_installation)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })
        .await
    }

    /// Unlocked installations awaiting their next supervisor step, oldest
    /// first. Selection makes no locking guarantee: a candidate returned
    /// here may be claimed by another supervisor before this caller's
    /// `lock_installation`, which then simply returns false.
    pub async fn get_unlocked_installations_pending_work(&self) -> Result<Vec<Installation>> {
        let states: Vec<String> = InstallationState::pending_work_states()
            .iter()
            .map(|s| s.to_string())
            .collect();
        self.exec("get unlocked installations pending work", move |conn| {
            let sql = query::pending_work_sql(TABLE, COLUMNS, "create_at", states.len());
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(states.iter()), row_to_installation)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })
        .await
    }

    pub async fn lock_installation(&self, id: &str, owner: &str) -> Result<bool> {
        self.lock_rows(TABLE, &[id.to_string()], owner).await
    }

    /// Best-effort batch lock; see [`Store::lock_rows`] for partial-claim
    /// semantics.
    pub async fn lock_installations(&self, ids: &[String], owner: &str) -> Result<bool> {
        self.lock_rows(TABLE, ids, owner).await
    }

    pub async fn unlock_installation(&self, id: &str, owner: &str, force: bool) -> Result<bool> {
        self.unlock_rows(TABLE, &[id.to_string()], owner, force).await
    }

    pub async fn unlock_installations(
        &self,
        ids: &[String],
        owner: &str,
        force: bool,
    ) -> Result<bool> {
        self.unlock_rows(TABLE, ids, owner, force).await
    }

    /// Update the mutable installation columns. Rejected synchronously when
    /// the record's env was merged with group overrides — that view is
    /// derived and must never be persisted.
    #[must_use = "an unchecked update may silently target a missing installation"]
    pub async fn update_installation(&self, installation: &Installation) -> Result<()> {
        if installation.group_overrides_applied() {
            return Err(Error::GroupConfigNotStorable(installation.id.clone()));
        }

        let record = installation.clone();
        let env = encode_env(&record.env)?;
        let rows = self
            .exec("update installation", move |conn| {
                conn.execute(
                    "UPDATE installations SET state = ?1, group_id = ?2, version = ?3, \
                     size = ?4, affinity = ?5, env = ?6 WHERE id = ?7",
                    rusqlite::params![
                        record.state.to_string(),
                        record.group_id,
                        record.version,
                        record.size,
                        record.affinity,
                        env,
                        record.id,
                    ],
                )
            })
            .await?;

        if rows == 0 {
            return Err(Error::NotFound {
                kind: "installation",
                id: installation.id.clone(),
            });
        }
        Ok(())
    }

    /// State-only update.
    #[must_use = "an unchecked update may silently target a missing installation"]
    pub async fn update_installation_state(&self, installation: &Installation) -> Result<()> {
        let id = installation.id.clone();
        let state = installation.state.to_string();
        let id_for_err = installation.id.clone();
        let rows = self
            .exec("update installation state", move |conn| {
                conn.execute(
                    "UPDATE installations SET state = ?1 WHERE id = ?2",
                    rusqlite::params![state, id],
                )
            })
            .await?;

        if rows == 0 {
            return Err(Error::NotFound {
                kind: "installation",
                id: id_for_err,
            });
        }
        Ok(())
    }

    /// Optimistic state transition: writes `next` only if the row is still
    /// in `expected`. Returns false (not an error) when another writer got
    /// there first.
    pub async fn update_installation_state_when(
        &self,
        id: &str,
        expected: InstallationState,
        next: InstallationState,
    ) -> Result<bool> {
        let id = id.to_string();
        let rows = self
            .exec("conditionally update installation state", move |conn| {
                conn.execute(
                    "UPDATE installations SET state = ?1 WHERE id = ?2 AND state = ?3",
                    rusqlite::params![next.to_string(), id, expected.to_string()],
                )
            })
            .await?;
        Ok(rows > 0)
    }

    /// Soft-delete: stamps `delete_at` once; repeated calls are no-ops.
    /// Deletion does not release any held lock.
    pub async fn delete_installation(&self, id: &str) -> Result<()> {
        let id_owned = id.to_string();
        let now = model::now_millis();
        self.exec("delete installation", move |conn| {
            conn.execute(
                "UPDATE installations SET delete_at = ?1 WHERE id = ?2 AND delete_at = 0",
                rusqlite::params![now, id_owned],
            )
        })
        .await?;
        debug!("soft-deleted installation {}", id);
        Ok(())
    }
}
