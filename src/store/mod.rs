//! SQLite-backed persistence and coordination layer.
//!
//! One [`Store`] wraps a single database shared by every supervisor process
//! in the fleet. There is no in-process coordination across supervisors:
//! mutual exclusion rests entirely on each conditional UPDATE executing as
//! one atomic statement, and multi-row transitions ride on SQLite
//! transactions. WAL mode is enabled so concurrent readers never block the
//! single writer.
//!
//! The store exposes, per resource kind: create / get / filtered listing,
//! the unlocked-pending-work query, row locking and unlocking, state and
//! field-scoped updates, soft deletion, and the composite operation
//! triggers that create a dependent operation while flipping the parent
//! installation's state in the same transaction.

mod backup;
mod cluster;
mod database;
mod installation;
mod lock;
mod migration;
mod query;
mod restoration;
mod schema;

pub use backup::BackupFilter;
pub use cluster::ClusterFilter;
pub use database::DatabaseSchemaFilter;
pub use installation::InstallationFilter;
pub use migration::DbMigrationFilter;
pub use query::Paging;
pub use restoration::DbRestorationFilter;

use crate::error::{Error, Result};
use std::path::Path;
use tokio_rusqlite::Connection;

/// Handle to the fleet database. Cheap to clone; all methods take `&self`
/// and are safe to call concurrently.
#[derive(Clone, Debug)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the fleet database at `path` and bring its schema
    /// up to the current version.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .await
            .map_err(Error::store("open database"))?;

        conn.call(|conn: &mut rusqlite::Connection| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            Ok(())
        })
        .await
        .map_err(Error::store("configure database"))?;

        schema::ensure_schema(&conn).await?;
        Ok(Self { conn })
    }

    /// Open an ephemeral in-memory store. Intended for tests; carries the
    /// full schema but no durability.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open(":memory:")
            .await
            .map_err(Error::store("open database"))?;

        conn.call(|conn: &mut rusqlite::Connection| {
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        })
        .await
        .map_err(Error::store("configure database"))?;

        schema::ensure_schema(&conn).await?;
        Ok(Self { conn })
    }

    /// Run `f` against the connection without an explicit transaction.
    /// Single statements are already atomic in SQLite.
    pub(crate) async fn exec<F, T>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn: &mut rusqlite::Connection| Ok(f(conn)?))
            .await
            .map_err(Error::store(op))
    }

    /// Run `f` inside one transaction scope.
    ///
    /// The scope commits only when `f` returns `Ok`; on any other exit path
    /// (error return, panic unwind inside the connection actor) the
    /// `rusqlite::Transaction` is dropped uncommitted and rolls back, so a
    /// partially applied composite transition is never visible to another
    /// caller. Nesting is not supported — one scope per operation.
    pub(crate) async fn with_transaction<F, T>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn: &mut rusqlite::Connection| {
                let tx = conn.transaction()?;
                let result = f(&tx)?;
                tx.commit()?;
                Ok(result)
            })
            .await
            .map_err(Error::store(op))
    }
}

/// Translate the `QueryReturnedNoRows` a transaction closure raises for a
/// zero-row targeted update into the crate's NotFound.
pub(crate) fn no_rows_as_not_found(err: Error, kind: &'static str, id: &str) -> Error {
    match err {
        Error::Store {
            source: tokio_rusqlite::Error::Rusqlite(rusqlite::Error::QueryReturnedNoRows),
            ..
        } => Error::NotFound {
            kind,
            id: id.to_string(),
        },
        other => other,
    }
}
