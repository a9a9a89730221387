//! Domain model for the coordinated resource kinds.
//!
//! Every entity managed by the store shares a common envelope: an immutable
//! id, a per-kind state enum, millisecond creation/request and soft-delete
//! timestamps, and the generic lock columns (`lock_acquired_by`,
//! `lock_acquired_at`). An entity is unlocked exactly when
//! `lock_acquired_at == 0` and `lock_acquired_by` is absent; no row is ever
//! observably half-locked.

mod backup;
mod cluster;
mod database;
mod installation;
mod migration;
mod restoration;

pub use backup::{BackupSchedulingData, BackupState, DataResidence, InstallationBackup};
pub(crate) use backup::{decode_data_residence, encode_data_residence};
pub(crate) use cluster::{decode_provisioner_config, encode_provisioner_config};
pub(crate) use database::{decode_installation_ids, encode_installation_ids};
pub(crate) use installation::{decode_env, encode_env};
pub use cluster::{Cluster, ClusterState, ProvisionerConfig};
pub use database::{DatabaseCluster, DatabaseClusterState, DatabaseSchema, DatabaseSchemaState};
pub use installation::{
    next_installation_state, Installation, InstallationState, OperationKind,
};
pub use migration::{DbMigrationRequest, DbMigrationState, InstallationDbMigration};
pub use restoration::{DbRestorationRequest, DbRestorationState, InstallationDbRestoration};

use chrono::Utc;
use uuid::Uuid;

/// Assign a fresh entity id (uuid v4, hyphen-free).
pub(crate) fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Current wall-clock time in milliseconds since the epoch.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
