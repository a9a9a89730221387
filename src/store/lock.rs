//! Generic per-row mutual exclusion over any envelope table.
//!
//! A lock is two columns: `lock_acquired_by` (opaque owner token) and
//! `lock_acquired_at` (ms timestamp, 0 when free). Acquisition and release
//! are each a single conditional UPDATE; the backing store's atomicity for
//! that one statement is the entire concurrency guarantee. There is no
//! lease expiry — a lock abandoned by a crashed supervisor stays held until
//! an operator releases it with `force`.

use crate::error::Result;
use crate::model;
use crate::store::query::in_clause;
use crate::store::Store;
use tracing::{debug, warn};

impl Store {
    /// Try to lock the given rows for `owner`.
    ///
    /// Only rows currently unlocked are claimed, in one atomic statement.
    /// Returns true when at least one row was claimed. Batches are not
    /// all-or-nothing: a partial claim still reports success and is logged
    /// at warn, so multi-id callers must inspect the rows afterwards if
    /// they need the full set.
    ///
    /// Re-acquiring a row this owner already holds claims nothing and
    /// returns false, indistinguishable from contention.
    pub(crate) async fn lock_rows(
        &self,
        table: &'static str,
        ids: &[String],
        owner: &str,
    ) -> Result<bool> {
        if ids.is_empty() {
            return Ok(false);
        }
        let requested = ids.len();
        let ids = ids.to_vec();
        let owner = owner.to_string();
        let owner_for_log = owner.clone();
        let now = model::now_millis();

        let changed = self
            .exec("acquire row locks", move |conn| {
                let sql = format!(
                    "UPDATE {table} \
                     SET lock_acquired_by = ?, lock_acquired_at = ? \
                     WHERE lock_acquired_at = 0 AND id IN ({})",
                    in_clause(ids.len())
                );
                let mut params: Vec<&dyn rusqlite::ToSql> = vec![&owner, &now];
                for id in &ids {
                    params.push(id);
                }
                conn.execute(&sql, params.as_slice())
            })
            .await?;

        if changed == 0 {
            debug!(
                "no {} rows were free to lock for {}",
                table, owner_for_log
            );
            return Ok(false);
        }
        if changed < requested {
            warn!(
                "partial lock acquisition on {}: {} of {} rows claimed by {}",
                table, changed, requested, owner_for_log
            );
        }
        Ok(true)
    }

    /// Release locks on the given rows.
    ///
    /// With `force` false only rows held by `owner` are cleared; with
    /// `force` true any held lock is cleared regardless of owner — the
    /// recovery path for locks abandoned by a crashed supervisor. Returns
    /// true when at least one row was released. Soft-deleted rows release
    /// normally; deletion never implies unlock.
    pub(crate) async fn unlock_rows(
        &self,
        table: &'static str,
        ids: &[String],
        owner: &str,
        force: bool,
    ) -> Result<bool> {
        if ids.is_empty() {
            return Ok(false);
        }
        let requested = ids.len();
        let ids = ids.to_vec();
        let owner = owner.to_string();
        let owner_for_log = owner.clone();

        let changed = self
            .exec("release row locks", move |conn| {
                let mut params: Vec<&dyn rusqlite::ToSql> = Vec::new();
                let sql = if force {
                    format!(
                        "UPDATE {table} \
                         SET lock_acquired_by = NULL, lock_acquired_at = 0 \
                         WHERE lock_acquired_at <> 0 AND id IN ({})",
                        in_clause(ids.len())
                    )
                } else {
                    params.push(&owner);
                    format!(
                        "UPDATE {table} \
                         SET lock_acquired_by = NULL, lock_acquired_at = 0 \
                         WHERE lock_acquired_by = ? AND id IN ({})",
                        in_clause(ids.len())
                    )
                };
                for id in &ids {
                    params.push(id);
                }
                conn.execute(&sql, params.as_slice())
            })
            .await?;

        if changed == 0 {
            return Ok(false);
        }
        if force {
            warn!(
                "{} {} locks force-released by {}",
                changed, table, owner_for_log
            );
        }
        if changed < requested {
            warn!(
                "partial lock release on {}: {} of {} rows cleared by {}",
                table, changed, requested, owner_for_log
            );
        }
        Ok(true)
    }
}
