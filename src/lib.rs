//! # fleet-store
//!
//! Persistence and coordination layer for the fleet orchestrator.
//!
//! Many independent supervisor processes drive stateful resources —
//! clusters, tenant installations, backups, database migrations and
//! restorations, multitenant database clusters and schemas — through their
//! state machines. This crate is how they do that safely with no shared
//! memory and no external lock service:
//!
//! - **Row locking**: a generic conditional-write lock (`lock_*` /
//!   `unlock_*` per kind) whose only concurrency guarantee is the backing
//!   store executing one UPDATE atomically. Contention is an expected
//!   outcome, surfaced as `false`, never as an error.
//! - **Pending work discovery**: per-kind `get_unlocked_*_pending_work`
//!   queries returning unlocked, live resources awaiting their next step,
//!   oldest first. Selection and acquisition are separate steps; losing the
//!   subsequent lock race means "skip, select again."
//! - **Composite transitions**: `trigger_installation_*` operations create
//!   a dependent operation record and flip the parent installation's state
//!   in one transaction — other readers observe both writes or neither.
//! - **Soft deletion**: rows are tombstoned via `delete_at`, never removed,
//!   and remain queryable (and lockable) for audit.
//!
//! ## Example
//!
//! ```no_run
//! use fleet_store::model::Installation;
//! use fleet_store::Store;
//!
//! # async fn example() -> Result<(), fleet_store::Error> {
//! let store = Store::open("/var/lib/fleet/fleet.db").await?;
//!
//! // A supervisor's polling loop:
//! for candidate in store.get_unlocked_installations_pending_work().await? {
//!     if !store.lock_installation(&candidate.id, "supervisor-1").await? {
//!         continue; // lost the race, try the next candidate
//!     }
//!     // ... perform the state-machine step, persist the outcome ...
//!     store.unlock_installation(&candidate.id, "supervisor-1", false).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency model
//!
//! Every store method is safe to call from any number of processes sharing
//! the database file. A lock holder is the only permitted writer of a
//! resource's state; field-scoped updates (scheduling data, completion
//! timestamps) are the one sanctioned write path outside the lock and are
//! expected to touch disjoint columns. A crashed supervisor leaves its lock
//! held; recovery is an operator calling `unlock_*(.., force: true)`.

pub mod error;
pub mod model;
pub mod store;

pub use error::{Error, Result};
pub use store::{
    BackupFilter, ClusterFilter, DatabaseSchemaFilter, DbMigrationFilter, DbRestorationFilter,
    InstallationFilter, Paging, Store,
};
