use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a tenant installation.
///
/// The installation supervisor drives the `*Requested`/`*InProgress` states.
/// `BackupInProgress`, `DbMigrationInProgress` and `DbRestorationInProgress`
/// are entered through a composite trigger and are driven by the respective
/// operation supervisors, so they are deliberately absent from the
/// installation pending-work set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallationState {
    Stable,
    CreationRequested,
    CreationInProgress,
    CreationFailed,
    UpdateRequested,
    UpdateInProgress,
    UpdateFailed,
    HibernationRequested,
    Hibernating,
    WakeUpRequested,
    BackupInProgress,
    DbMigrationInProgress,
    DbRestorationInProgress,
    DeletionRequested,
    DeletionInProgress,
    DeletionFailed,
    Deleted,
}

impl InstallationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallationState::Stable => "stable",
            InstallationState::CreationRequested => "creation-requested",
            InstallationState::CreationInProgress => "creation-in-progress",
            InstallationState::CreationFailed => "creation-failed",
            InstallationState::UpdateRequested => "update-requested",
            InstallationState::UpdateInProgress => "update-in-progress",
            InstallationState::UpdateFailed => "update-failed",
            InstallationState::HibernationRequested => "hibernation-requested",
            InstallationState::Hibernating => "hibernating",
            InstallationState::WakeUpRequested => "wake-up-requested",
            InstallationState::BackupInProgress => "backup-in-progress",
            InstallationState::DbMigrationInProgress => "db-migration-in-progress",
            InstallationState::DbRestorationInProgress => "db-restoration-in-progress",
            InstallationState::DeletionRequested => "deletion-requested",
            InstallationState::DeletionInProgress => "deletion-in-progress",
            InstallationState::DeletionFailed => "deletion-failed",
            InstallationState::Deleted => "deleted",
        }
    }

    /// States the installation supervisor acts on.
    pub fn pending_work_states() -> &'static [InstallationState] {
        &[
            InstallationState::CreationRequested,
            InstallationState::CreationInProgress,
            InstallationState::UpdateRequested,
            InstallationState::UpdateInProgress,
            InstallationState::HibernationRequested,
            InstallationState::WakeUpRequested,
            InstallationState::DeletionRequested,
            InstallationState::DeletionInProgress,
        ]
    }
}

impl fmt::Display for InstallationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallationState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stable" => Ok(InstallationState::Stable),
            "creation-requested" => Ok(InstallationState::CreationRequested),
            "creation-in-progress" => Ok(InstallationState::CreationInProgress),
            "creation-failed" => Ok(InstallationState::CreationFailed),
            "update-requested" => Ok(InstallationState::UpdateRequested),
            "update-in-progress" => Ok(InstallationState::UpdateInProgress),
            "update-failed" => Ok(InstallationState::UpdateFailed),
            "hibernation-requested" => Ok(InstallationState::HibernationRequested),
            "hibernating" => Ok(InstallationState::Hibernating),
            "wake-up-requested" => Ok(InstallationState::WakeUpRequested),
            "backup-in-progress" => Ok(InstallationState::BackupInProgress),
            "db-migration-in-progress" => Ok(InstallationState::DbMigrationInProgress),
            "db-restoration-in-progress" => Ok(InstallationState::DbRestorationInProgress),
            "deletion-requested" => Ok(InstallationState::DeletionRequested),
            "deletion-in-progress" => Ok(InstallationState::DeletionInProgress),
            "deletion-failed" => Ok(InstallationState::DeletionFailed),
            "deleted" => Ok(InstallationState::Deleted),
            other => Err(Error::UnknownState {
                kind: "installation",
                value: other.to_string(),
            }),
        }
    }
}

/// Kind of dependent operation a composite trigger creates against an
/// installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Backup,
    DbMigration,
    DbRestoration,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Backup => "backup",
            OperationKind::DbMigration => "db-migration",
            OperationKind::DbRestoration => "db-restoration",
        }
    }
}

/// Pure transition function used by the composite triggers: the state the
/// installation moves to when an operation of the given kind starts, or
/// `None` when the operation is not allowed from the current state.
///
/// Operations may only start against an installation that is `Stable` or
/// `Hibernating` — anything else either already has a supervisor working on
/// it or is on its way out.
pub fn next_installation_state(
    current: InstallationState,
    kind: OperationKind,
) -> Option<InstallationState> {
    match current {
        InstallationState::Stable | InstallationState::Hibernating => Some(match kind {
            OperationKind::Backup => InstallationState::BackupInProgress,
            OperationKind::DbMigration => InstallationState::DbMigrationInProgress,
            OperationKind::DbRestoration => InstallationState::DbRestorationInProgress,
        }),
        _ => None,
    }
}

pub(crate) fn encode_env(env: &BTreeMap<String, String>) -> Result<String> {
    Ok(serde_json::to_string(env)?)
}

pub(crate) fn decode_env(raw: &str) -> Result<BTreeMap<String, String>> {
    Ok(serde_json::from_str(raw)?)
}

/// A tenant installation hosted on a cluster.
#[derive(Debug, Clone)]
pub struct Installation {
    pub id: String,
    pub state: InstallationState,
    pub owner_id: String,
    pub group_id: Option<String>,
    pub version: String,
    pub size: String,
    pub affinity: String,
    /// Environment overrides persisted as an opaque JSON blob.
    pub env: BTreeMap<String, String>,
    pub create_at: i64,
    pub delete_at: i64,
    pub lock_acquired_by: Option<String>,
    pub lock_acquired_at: i64,
    /// Set when [`Installation::merge_group_overrides`] has rewritten `env`
    /// from group configuration. Never persisted; a merged record must not
    /// be written back to the store.
    group_overrides_applied: bool,
}

impl Installation {
    pub fn new(owner_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            state: InstallationState::CreationRequested,
            owner_id: owner_id.into(),
            group_id: None,
            version: version.into(),
            size: "100users".to_string(),
            affinity: "multitenant".to_string(),
            env: BTreeMap::new(),
            create_at: 0,
            delete_at: 0,
            lock_acquired_by: None,
            lock_acquired_at: 0,
            group_overrides_applied: false,
        }
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Merge group-level env overrides into this record for presentation.
    /// Group values win over installation values. The result is a derived
    /// view and is rejected by every store write path.
    pub fn merge_group_overrides(&mut self, overrides: &BTreeMap<String, String>) {
        for (key, value) in overrides {
            self.env.insert(key.clone(), value.clone());
        }
        self.group_overrides_applied = true;
    }

    pub fn group_overrides_applied(&self) -> bool {
        self.group_overrides_applied
    }

    pub fn is_deleted(&self) -> bool {
        self.delete_at > 0
    }

    pub fn is_locked(&self) -> bool {
        self.lock_acquired_at != 0
    }
}
