use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a database restoration operation.
/// `Succeeded`, `Failed` and `Invalid` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DbRestorationState {
    Requested,
    Beginning,
    InProgress,
    Finalizing,
    Succeeded,
    Failed,
    /// The request referenced a backup that cannot be restored (wrong
    /// installation, missing artifact). Set by the supervisor, never retried.
    Invalid,
}

impl DbRestorationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbRestorationState::Requested => "requested",
            DbRestorationState::Beginning => "beginning",
            DbRestorationState::InProgress => "in-progress",
            DbRestorationState::Finalizing => "finalizing",
            DbRestorationState::Succeeded => "succeeded",
            DbRestorationState::Failed => "failed",
            DbRestorationState::Invalid => "invalid",
        }
    }

    pub fn pending_work_states() -> &'static [DbRestorationState] {
        &[
            DbRestorationState::Requested,
            DbRestorationState::Beginning,
            DbRestorationState::InProgress,
            DbRestorationState::Finalizing,
        ]
    }
}

impl fmt::Display for DbRestorationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbRestorationState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "requested" => Ok(DbRestorationState::Requested),
            "beginning" => Ok(DbRestorationState::Beginning),
            "in-progress" => Ok(DbRestorationState::InProgress),
            "finalizing" => Ok(DbRestorationState::Finalizing),
            "succeeded" => Ok(DbRestorationState::Succeeded),
            "failed" => Ok(DbRestorationState::Failed),
            "invalid" => Ok(DbRestorationState::Invalid),
            other => Err(Error::UnknownState {
                kind: "db restoration",
                value: other.to_string(),
            }),
        }
    }
}

/// Client request for a database restoration, handed to the composite
/// trigger. The backup must belong to the target installation; the
/// supervisor validates that before work starts.
#[derive(Debug, Clone)]
pub struct DbRestorationRequest {
    pub installation_id: String,
    pub backup_id: String,
}

/// A database restoration operation restoring one installation from one of
/// its backups. Both references are plain ids, looked up on demand.
#[derive(Debug, Clone)]
pub struct InstallationDbRestoration {
    pub id: String,
    pub installation_id: String,
    pub backup_id: String,
    pub state: DbRestorationState,
    pub request_at: i64,
    pub complete_at: i64,
    pub delete_at: i64,
    pub lock_acquired_by: Option<String>,
    pub lock_acquired_at: i64,
}
