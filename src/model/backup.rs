use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of an installation backup operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupState {
    BackupRequested,
    BackupInProgress,
    BackupSucceeded,
    BackupFailed,
    DeletionRequested,
    Deleted,
}

impl BackupState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupState::BackupRequested => "backup-requested",
            BackupState::BackupInProgress => "backup-in-progress",
            BackupState::BackupSucceeded => "backup-succeeded",
            BackupState::BackupFailed => "backup-failed",
            BackupState::DeletionRequested => "deletion-requested",
            BackupState::Deleted => "deleted",
        }
    }

    pub fn pending_work_states() -> &'static [BackupState] {
        &[
            BackupState::BackupRequested,
            BackupState::BackupInProgress,
            BackupState::DeletionRequested,
        ]
    }
}

impl fmt::Display for BackupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "backup-requested" => Ok(BackupState::BackupRequested),
            "backup-in-progress" => Ok(BackupState::BackupInProgress),
            "backup-succeeded" => Ok(BackupState::BackupSucceeded),
            "backup-failed" => Ok(BackupState::BackupFailed),
            "deletion-requested" => Ok(BackupState::DeletionRequested),
            "deleted" => Ok(BackupState::Deleted),
            other => Err(Error::UnknownState {
                kind: "backup",
                value: other.to_string(),
            }),
        }
    }
}

/// Where the backup artifact lives once the backup job has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResidence {
    pub region: String,
    pub bucket: String,
    pub object_key: String,
}

pub(crate) fn encode_data_residence(residence: &DataResidence) -> Result<String> {
    Ok(serde_json::to_string(residence)?)
}

pub(crate) fn decode_data_residence(raw: &str) -> Result<DataResidence> {
    Ok(serde_json::from_str(raw)?)
}

/// Scheduling metadata owned by the backup supervisor; updated through a
/// field-scoped write so it never clobbers columns other paths touch.
#[derive(Debug, Clone, Copy)]
pub struct BackupSchedulingData {
    pub start_at: i64,
}

/// A backup of a single installation's data.
///
/// Holds a non-owning reference to its parent installation by id only; the
/// installation row is looked up on demand.
#[derive(Debug, Clone)]
pub struct InstallationBackup {
    pub id: String,
    pub installation_id: String,
    pub state: BackupState,
    pub request_at: i64,
    /// When the backup job actually started; 0 until scheduled.
    pub start_at: i64,
    pub data_residence: Option<DataResidence>,
    pub delete_at: i64,
    pub lock_acquired_by: Option<String>,
    pub lock_acquired_at: i64,
}

impl InstallationBackup {
    pub fn new(installation_id: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            installation_id: installation_id.into(),
            state: BackupState::BackupRequested,
            request_at: 0,
            start_at: 0,
            data_residence: None,
            delete_at: 0,
            lock_acquired_by: None,
            lock_acquired_at: 0,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.delete_at > 0
    }
}
