use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a database migration operation.
///
/// The forward path is `Requested → BackupInProgress → SwitchingDatabase →
/// RefreshingCredentials → Finalizing → Succeeded`; any step may land in
/// `Failed`, after which a rollback can be requested. `Succeeded`, `Failed`
/// and `RollbackFinished` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DbMigrationState {
    Requested,
    BackupInProgress,
    SwitchingDatabase,
    RefreshingCredentials,
    Finalizing,
    Succeeded,
    Failed,
    RollbackRequested,
    RollbackInProgress,
    RollbackFinished,
}

impl DbMigrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbMigrationState::Requested => "requested",
            DbMigrationState::BackupInProgress => "backup-in-progress",
            DbMigrationState::SwitchingDatabase => "switching-database",
            DbMigrationState::RefreshingCredentials => "refreshing-credentials",
            DbMigrationState::Finalizing => "finalizing",
            DbMigrationState::Succeeded => "succeeded",
            DbMigrationState::Failed => "failed",
            DbMigrationState::RollbackRequested => "rollback-requested",
            DbMigrationState::RollbackInProgress => "rollback-in-progress",
            DbMigrationState::RollbackFinished => "rollback-finished",
        }
    }

    pub fn pending_work_states() -> &'static [DbMigrationState] {
        &[
            DbMigrationState::Requested,
            DbMigrationState::BackupInProgress,
            DbMigrationState::SwitchingDatabase,
            DbMigrationState::RefreshingCredentials,
            DbMigrationState::Finalizing,
            DbMigrationState::RollbackRequested,
            DbMigrationState::RollbackInProgress,
        ]
    }
}

impl fmt::Display for DbMigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbMigrationState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "requested" => Ok(DbMigrationState::Requested),
            "backup-in-progress" => Ok(DbMigrationState::BackupInProgress),
            "switching-database" => Ok(DbMigrationState::SwitchingDatabase),
            "refreshing-credentials" => Ok(DbMigrationState::RefreshingCredentials),
            "finalizing" => Ok(DbMigrationState::Finalizing),
            "succeeded" => Ok(DbMigrationState::Succeeded),
            "failed" => Ok(DbMigrationState::Failed),
            "rollback-requested" => Ok(DbMigrationState::RollbackRequested),
            "rollback-in-progress" => Ok(DbMigrationState::RollbackInProgress),
            "rollback-finished" => Ok(DbMigrationState::RollbackFinished),
            other => Err(Error::UnknownState {
                kind: "db migration",
                value: other.to_string(),
            }),
        }
    }
}

/// Client request for a database migration, handed to the composite trigger.
#[derive(Debug, Clone)]
pub struct DbMigrationRequest {
    pub installation_id: String,
    pub source_database: String,
    pub destination_database: String,
}

/// A database migration operation against a single installation.
///
/// References its parent installation and, once the safety backup has been
/// taken, the backup it depends on — both by id only.
#[derive(Debug, Clone)]
pub struct InstallationDbMigration {
    pub id: String,
    pub installation_id: String,
    /// Prerequisite backup; set by the migration supervisor once taken.
    pub backup_id: Option<String>,
    pub source_database: String,
    pub destination_database: String,
    pub state: DbMigrationState,
    pub request_at: i64,
    pub complete_at: i64,
    pub delete_at: i64,
    pub lock_acquired_by: Option<String>,
    pub lock_acquired_at: i64,
}
