use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a cluster.
///
/// Clusters are driven by the cluster supervisor: a client request parks the
/// cluster in one of the `*Requested` states, the supervisor picks it up via
/// the pending-work query, and the outcome is either `Stable`, the matching
/// `*Failed` state (which a client may re-request), or `Deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterState {
    CreationRequested,
    CreationFailed,
    ProvisioningRequested,
    ProvisioningFailed,
    UpgradeRequested,
    UpgradeFailed,
    ResizeRequested,
    ResizeFailed,
    DeletionRequested,
    DeletionFailed,
    Deleted,
    Stable,
}

impl ClusterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterState::CreationRequested => "creation-requested",
            ClusterState::CreationFailed => "creation-failed",
            ClusterState::ProvisioningRequested => "provisioning-requested",
            ClusterState::ProvisioningFailed => "provisioning-failed",
            ClusterState::UpgradeRequested => "upgrade-requested",
            ClusterState::UpgradeFailed => "upgrade-failed",
            ClusterState::ResizeRequested => "resize-requested",
            ClusterState::ResizeFailed => "resize-failed",
            ClusterState::DeletionRequested => "deletion-requested",
            ClusterState::DeletionFailed => "deletion-failed",
            ClusterState::Deleted => "deleted",
            ClusterState::Stable => "stable",
        }
    }

    /// States in which the cluster supervisor has a next step to perform.
    pub fn pending_work_states() -> &'static [ClusterState] {
        &[
            ClusterState::CreationRequested,
            ClusterState::ProvisioningRequested,
            ClusterState::UpgradeRequested,
            ClusterState::ResizeRequested,
            ClusterState::DeletionRequested,
        ]
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "creation-requested" => Ok(ClusterState::CreationRequested),
            "creation-failed" => Ok(ClusterState::CreationFailed),
            "provisioning-requested" => Ok(ClusterState::ProvisioningRequested),
            "provisioning-failed" => Ok(ClusterState::ProvisioningFailed),
            "upgrade-requested" => Ok(ClusterState::UpgradeRequested),
            "upgrade-failed" => Ok(ClusterState::UpgradeFailed),
            "resize-requested" => Ok(ClusterState::ResizeRequested),
            "resize-failed" => Ok(ClusterState::ResizeFailed),
            "deletion-requested" => Ok(ClusterState::DeletionRequested),
            "deletion-failed" => Ok(ClusterState::DeletionFailed),
            "deleted" => Ok(ClusterState::Deleted),
            "stable" => Ok(ClusterState::Stable),
            other => Err(Error::UnknownState {
                kind: "cluster",
                value: other.to_string(),
            }),
        }
    }
}

/// Provisioner settings persisted as an opaque JSON blob on the cluster row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    pub node_count: u32,
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_cidr: Option<String>,
}

pub(crate) fn encode_provisioner_config(config: &ProvisionerConfig) -> Result<String> {
    Ok(serde_json::to_string(config)?)
}

pub(crate) fn decode_provisioner_config(raw: &str) -> Result<ProvisionerConfig> {
    Ok(serde_json::from_str(raw)?)
}

/// A managed Kubernetes cluster.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: String,
    pub state: ClusterState,
    pub provider: String,
    pub region: String,
    pub version: String,
    pub allow_installations: bool,
    pub provisioner_config: ProvisionerConfig,
    pub create_at: i64,
    pub delete_at: i64,
    pub lock_acquired_by: Option<String>,
    pub lock_acquired_at: i64,
}

impl Cluster {
    /// A new cluster request; id and creation timestamp are assigned by the
    /// store on create.
    pub fn new(
        provider: impl Into<String>,
        region: impl Into<String>,
        version: impl Into<String>,
        provisioner_config: ProvisionerConfig,
    ) -> Self {
        Self {
            id: String::new(),
            state: ClusterState::CreationRequested,
            provider: provider.into(),
            region: region.into(),
            version: version.into(),
            allow_installations: false,
            provisioner_config,
            create_at: 0,
            delete_at: 0,
            lock_acquired_by: None,
            lock_acquired_at: 0,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.delete_at > 0
    }

    pub fn is_locked(&self) -> bool {
        self.lock_acquired_at != 0
    }
}
