//! Versioned schema evolution.
//!
//! An ordered list of `(from, to, apply)` steps is applied strictly in
//! sequence starting at the version recorded in the singleton `system`
//! table. Each step runs inside its own transaction and advances the
//! recorded version before committing, so an interrupted step leaves the
//! version untouched and is reapplied wholesale on the next open. Steps
//! must therefore be safe to rerun: DDL uses `IF NOT EXISTS` and column
//! additions probe `pragma_table_info` first.

use crate::error::{Error, Result};
use rusqlite::Transaction;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

/// Highest schema version this binary knows how to produce.
pub(crate) const SCHEMA_VERSION: i64 = 4;

struct SchemaStep {
    from: i64,
    to: i64,
    apply: fn(&Transaction<'_>) -> rusqlite::Result<()>,
}

/// The full step sequence, built fresh per call.
fn schema_steps() -> Vec<SchemaStep> {
    vec![
        SchemaStep {
            from: 0,
            to: 1,
            apply: create_core_tables,
        },
        SchemaStep {
            from: 1,
            to: 2,
            apply: add_installation_backups,
        },
        SchemaStep {
            from: 2,
            to: 3,
            apply: add_db_operations,
        },
        SchemaStep {
            from: 3,
            to: 4,
            apply: add_database_resources,
        },
    ]
}

/// Bring the database up to [`SCHEMA_VERSION`], creating the `system`
/// singleton on first open. Refuses a database written by a newer binary.
pub(crate) async fn ensure_schema(conn: &Connection) -> Result<()> {
    let current: i64 = conn
        .call(|conn: &mut rusqlite::Connection| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS system (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    schema_version INTEGER NOT NULL
                )",
                [],
            )?;
            conn.execute(
                "INSERT OR IGNORE INTO system (id, schema_version) VALUES (1, 0)",
                [],
            )?;
            Ok(conn.query_row(
                "SELECT schema_version FROM system WHERE id = 1",
                [],
                |row| row.get(0),
            )?)
        })
        .await
        .map_err(Error::store("read schema version"))?;

    if current > SCHEMA_VERSION {
        return Err(Error::SchemaVersionTooNew {
            found: current,
            supported: SCHEMA_VERSION,
        });
    }
    if current == SCHEMA_VERSION {
        debug!("schema is up to date (version {})", current);
        return Ok(());
    }

    info!(
        "migrating schema from version {} to {}",
        current, SCHEMA_VERSION
    );

    for step in schema_steps() {
        if step.to <= current {
            continue;
        }
        let to = step.to;
        let from = step.from;
        conn.call(move |conn: &mut rusqlite::Connection| {
            let tx = conn.transaction()?;
            (step.apply)(&tx)?;
            tx.execute(
                "UPDATE system SET schema_version = ?1 WHERE id = 1",
                rusqlite::params![to],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(Error::store("apply schema step"))?;
        debug!("applied schema step {} -> {}", from, to);
    }

    info!("schema migrated to version {}", SCHEMA_VERSION);
    Ok(())
}

/// v0 -> v1: clusters and installations.
fn create_core_tables(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS clusters (
            id TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            provider TEXT NOT NULL,
            region TEXT NOT NULL,
            version TEXT NOT NULL,
            allow_installations INTEGER NOT NULL DEFAULT 0,
            provisioner_config TEXT NOT NULL,
            create_at INTEGER NOT NULL,
            delete_at INTEGER NOT NULL DEFAULT 0,
            lock_acquired_by TEXT,
            lock_acquired_at INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_clusters_state ON clusters(state);

        CREATE TABLE IF NOT EXISTS installations (
            id TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            group_id TEXT,
            version TEXT NOT NULL,
            size TEXT NOT NULL,
            affinity TEXT NOT NULL,
            env TEXT NOT NULL,
            create_at INTEGER NOT NULL,
            delete_at INTEGER NOT NULL DEFAULT 0,
            lock_acquired_by TEXT,
            lock_acquired_at INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_installations_state ON installations(state);
        CREATE INDEX IF NOT EXISTS idx_installations_owner ON installations(owner_id);
        "#,
    )
}

/// v1 -> v2: installation backups.
fn add_installation_backups(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS installation_backups (
            id TEXT PRIMARY KEY,
            installation_id TEXT NOT NULL,
            state TEXT NOT NULL,
            request_at INTEGER NOT NULL,
            start_at INTEGER NOT NULL DEFAULT 0,
            data_residence TEXT,
            delete_at INTEGER NOT NULL DEFAULT 0,
            lock_acquired_by TEXT,
            lock_acquired_at INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_backups_installation
            ON installation_backups(installation_id);
        CREATE INDEX IF NOT EXISTS idx_backups_state ON installation_backups(state);
        "#,
    )
}

/// v2 -> v3: database migration and restoration operations.
fn add_db_operations(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS installation_db_migrations (
            id TEXT PRIMARY KEY,
            installation_id TEXT NOT NULL,
            backup_id TEXT,
            source_database TEXT NOT NULL,
            destination_database TEXT NOT NULL,
            state TEXT NOT NULL,
            request_at INTEGER NOT NULL,
            complete_at INTEGER NOT NULL DEFAULT 0,
            delete_at INTEGER NOT NULL DEFAULT 0,
            lock_acquired_by TEXT,
            lock_acquired_at INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_db_migrations_installation
            ON installation_db_migrations(installation_id);
        CREATE INDEX IF NOT EXISTS idx_db_migrations_state
            ON installation_db_migrations(state);

        CREATE TABLE IF NOT EXISTS installation_db_restorations (
            id TEXT PRIMARY KEY,
            installation_id TEXT NOT NULL,
            backup_id TEXT NOT NULL,
            state TEXT NOT NULL,
            request_at INTEGER NOT NULL,
            complete_at INTEGER NOT NULL DEFAULT 0,
            delete_at INTEGER NOT NULL DEFAULT 0,
            lock_acquired_by TEXT,
            lock_acquired_at INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_db_restorations_installation
            ON installation_db_restorations(installation_id);
        CREATE INDEX IF NOT EXISTS idx_db_restorations_state
            ON installation_db_restorations(state);
        "#,
    )
}

/// v3 -> v4: multitenant database clusters and per-installation schemas.
fn add_database_resources(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS database_clusters (
            id TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            max_installations INTEGER NOT NULL,
            installation_ids TEXT NOT NULL,
            create_at INTEGER NOT NULL,
            delete_at INTEGER NOT NULL DEFAULT 0,
            lock_acquired_by TEXT,
            lock_acquired_at INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_database_clusters_state
            ON database_clusters(state);

        CREATE TABLE IF NOT EXISTS database_schemas (
            id TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            database_cluster_id TEXT NOT NULL,
            installation_id TEXT NOT NULL,
            name TEXT NOT NULL,
            create_at INTEGER NOT NULL,
            delete_at INTEGER NOT NULL DEFAULT 0,
            lock_acquired_by TEXT,
            lock_acquired_at INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_database_schemas_cluster
            ON database_schemas(database_cluster_id);
        CREATE INDEX IF NOT EXISTS idx_database_schemas_installation
            ON database_schemas(installation_id);
        "#,
    )
}
