use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a multitenant database cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatabaseClusterState {
    ProvisioningRequested,
    Stable,
    DeletionRequested,
    Deleted,
}

impl DatabaseClusterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseClusterState::ProvisioningRequested => "provisioning-requested",
            DatabaseClusterState::Stable => "stable",
            DatabaseClusterState::DeletionRequested => "deletion-requested",
            DatabaseClusterState::Deleted => "deleted",
        }
    }

    pub fn pending_work_states() -> &'static [DatabaseClusterState] {
        &[
            DatabaseClusterState::ProvisioningRequested,
            DatabaseClusterState::DeletionRequested,
        ]
    }
}

impl fmt::Display for DatabaseClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseClusterState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "provisioning-requested" => Ok(DatabaseClusterState::ProvisioningRequested),
            "stable" => Ok(DatabaseClusterState::Stable),
            "deletion-requested" => Ok(DatabaseClusterState::DeletionRequested),
            "deleted" => Ok(DatabaseClusterState::Deleted),
            other => Err(Error::UnknownState {
                kind: "database cluster",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle state of a logical database schema inside a database cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatabaseSchemaState {
    CreationRequested,
    Stable,
    DeletionRequested,
    Deleted,
}

impl DatabaseSchemaState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseSchemaState::CreationRequested => "creation-requested",
            DatabaseSchemaState::Stable => "stable",
            DatabaseSchemaState::DeletionRequested => "deletion-requested",
            DatabaseSchemaState::Deleted => "deleted",
        }
    }

    pub fn pending_work_states() -> &'static [DatabaseSchemaState] {
        &[
            DatabaseSchemaState::CreationRequested,
            DatabaseSchemaState::DeletionRequested,
        ]
    }
}

impl fmt::Display for DatabaseSchemaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseSchemaState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "creation-requested" => Ok(DatabaseSchemaState::CreationRequested),
            "stable" => Ok(DatabaseSchemaState::Stable),
            "deletion-requested" => Ok(DatabaseSchemaState::DeletionRequested),
            "deleted" => Ok(DatabaseSchemaState::Deleted),
            other => Err(Error::UnknownState {
                kind: "database schema",
                value: other.to_string(),
            }),
        }
    }
}

pub(crate) fn encode_installation_ids(ids: &[String]) -> Result<String> {
    Ok(serde_json::to_string(ids)?)
}

pub(crate) fn decode_installation_ids(raw: &str) -> Result<Vec<String>> {
    Ok(serde_json::from_str(raw)?)
}

/// A shared multitenant database cluster hosting many installation schemas.
#[derive(Debug, Clone)]
pub struct DatabaseCluster {
    pub id: String,
    pub state: DatabaseClusterState,
    pub max_installations: u32,
    /// Installations assigned to this cluster, persisted as a JSON blob.
    pub installation_ids: Vec<String>,
    pub create_at: i64,
    pub delete_at: i64,
    pub lock_acquired_by: Option<String>,
    pub lock_acquired_at: i64,
}

impl DatabaseCluster {
    pub fn new(max_installations: u32) -> Self {
        Self {
            id: String::new(),
            state: DatabaseClusterState::ProvisioningRequested,
            max_installations,
            installation_ids: Vec::new(),
            create_at: 0,
            delete_at: 0,
            lock_acquired_by: None,
            lock_acquired_at: 0,
        }
    }

    pub fn has_capacity(&self) -> bool {
        (self.installation_ids.len() as u32) < self.max_installations
    }
}

/// A logical schema carved out of a database cluster for one installation.
#[derive(Debug, Clone)]
pub struct DatabaseSchema {
    pub id: String,
    pub state: DatabaseSchemaState,
    pub database_cluster_id: String,
    pub installation_id: String,
    pub name: String,
    pub create_at: i64,
    pub delete_at: i64,
    pub lock_acquired_by: Option<String>,
    pub lock_acquired_at: i64,
}

impl DatabaseSchema {
    pub fn new(
        database_cluster_id: impl Into<String>,
        installation_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            state: DatabaseSchemaState::CreationRequested,
            database_cluster_id: database_cluster_id.into(),
            installation_id: installation_id.into(),
            name: name.into(),
            create_at: 0,
            delete_at: 0,
            lock_acquired_by: None,
            lock_acquired_at: 0,
        }
    }
}
