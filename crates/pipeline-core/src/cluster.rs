use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::*;

/// Cloud (or virtual) provider a cluster record belongs to.
///
/// This is the closed set of discriminators the system knows how to resolve.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Amazon,
    Azure,
    Google,
    Alibaba,
    Oracle,
    Kubernetes,
    Dummy,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 7] = [
        ProviderKind::Amazon,
        ProviderKind::Azure,
        ProviderKind::Google,
        ProviderKind::Alibaba,
        ProviderKind::Oracle,
        ProviderKind::Kubernetes,
        ProviderKind::Dummy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Amazon => "amazon",
            ProviderKind::Azure => "azure",
            ProviderKind::Google => "google",
            ProviderKind::Alibaba => "alibaba",
            ProviderKind::Oracle => "oracle",
            ProviderKind::Kubernetes => "kubernetes",
            ProviderKind::Dummy => "dummy",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown cluster provider: {0:?}")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}

/// Lifecycle status persisted next to a cluster record.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClusterStatus {
    Creating,
    Running,
    Updating,
    Deleting,
    Warning,
    Error,
    Unknown,
}

impl ClusterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterStatus::Creating => "CREATING",
            ClusterStatus::Running => "RUNNING",
            ClusterStatus::Updating => "UPDATING",
            ClusterStatus::Deleting => "DELETING",
            ClusterStatus::Warning => "WARNING",
            ClusterStatus::Error => "ERROR",
            ClusterStatus::Unknown => "UNKNOWN",
        }
    }

    /// Lenient parse; anything unrecognised is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "CREATING" => ClusterStatus::Creating,
            "RUNNING" => ClusterStatus::Running,
            "UPDATING" => ClusterStatus::Updating,
            "DELETING" => ClusterStatus::Deleting,
            "WARNING" => ClusterStatus::Warning,
            "ERROR" => ClusterStatus::Error,
            _ => ClusterStatus::Unknown,
        }
    }
}

/// Persisted cluster row.
///
/// `provider` is kept as the raw discriminator: a record may carry a value this
/// build does not know, which only surfaces when the record is resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: ClusterId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub provider: String,
    pub location: String,
    pub secret_id: SecretId,
    pub status: String,
    pub status_message: String,
    /// Provider-specific configuration, JSON encoded.
    pub config: String,
    pub created_by: UserId,
    pub created_at_unix: i64,
    pub deleted_at_unix: Option<i64>,
}

impl ClusterRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at_unix.is_some()
    }
}

/// Input for creating a cluster row; ids and timestamps are assigned by storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewClusterRecord {
    pub organization_id: OrganizationId,
    pub name: String,
    pub provider: String,
    pub location: String,
    pub secret_id: SecretId,
    pub status: String,
    pub status_message: String,
    pub config: String,
    pub created_by: UserId,
}
