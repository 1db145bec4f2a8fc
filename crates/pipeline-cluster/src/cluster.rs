use std::fmt;

use pipeline_core::{ClusterId, ClusterStatus, OrganizationId, ProviderKind, SecretId};
use serde::Serialize;

/// Provider-independent view of a node pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodePoolSummary {
    pub name: String,
    pub instance_type: String,
    pub count: u32,
    pub autoscaling: bool,
    pub min_count: u32,
    pub max_count: u32,
}

/// Live handle for one cluster record.
///
/// Handles are rebuilt on every resolution and never shared between callers.
pub trait Cluster: Send + Sync + fmt::Debug {
    fn id(&self) -> ClusterId;
    fn name(&self) -> &str;
    fn organization_id(&self) -> OrganizationId;
    fn provider(&self) -> ProviderKind;
    fn location(&self) -> &str;

    /// Secret holding the provider credentials.
    fn secret_id(&self) -> &SecretId;

    fn status(&self) -> ClusterStatus;
    fn status_message(&self) -> &str;

    fn kubernetes_version(&self) -> Option<&str>;
    fn node_pools(&self) -> Vec<NodePoolSummary>;

    fn node_count(&self) -> u32 {
        self.node_pools().iter().fold(0u32, |total, p| total.saturating_add(p.count))
    }

    fn summary(&self) -> ClusterSummary {
        ClusterSummary {
            id: self.id(),
            name: self.name().to_string(),
            organization_id: self.organization_id(),
            provider: self.provider(),
            location: self.location().to_string(),
            secret_id: self.secret_id().clone(),
            status: self.status(),
            status_message: self.status_message().to_string(),
            kubernetes_version: self.kubernetes_version().map(str::to_string),
            node_pools: self.node_pools(),
        }
    }
}

/// Serializable snapshot of a [`Cluster`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClusterSummary {
    pub id: ClusterId,
    pub name: String,
    pub organization_id: OrganizationId,
    pub provider: ProviderKind,
    pub location: String,
    pub secret_id: SecretId,
    pub status: ClusterStatus,
    pub status_message: String,
    pub kubernetes_version: Option<String>,
    pub node_pools: Vec<NodePoolSummary>,
}
