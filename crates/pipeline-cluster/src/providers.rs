//! Provider-specific configuration blobs and the handle type built from them.

use std::collections::BTreeMap;
use std::fmt;

use pipeline_core::{ClusterId, ClusterRecord, ClusterStatus, OrganizationId, ProviderKind, SecretId};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::cluster::{Cluster, NodePoolSummary};

/// Decoded provider configuration of a cluster record.
pub trait ProviderConfig: DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    const KIND: ProviderKind;

    fn kubernetes_version(&self) -> Option<&str>;
    fn node_pools(&self) -> Vec<NodePoolSummary>;

    /// Structural checks beyond what deserialization enforces.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Node pool shape shared by the managed providers.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodePoolConfig {
    pub instance_type: String,
    pub count: u32,
    pub autoscaling: bool,
    pub min_count: u32,
    pub max_count: u32,
    /// Bid price for spot instances; empty means on-demand.
    pub spot_price: String,
}

fn summarize(pools: &BTreeMap<String, NodePoolConfig>) -> Vec<NodePoolSummary> {
    pools
        .iter()
        .map(|(name, p)| NodePoolSummary {
            name: name.clone(),
            instance_type: p.instance_type.clone(),
            count: p.count,
            autoscaling: p.autoscaling,
            min_count: p.min_count,
            max_count: p.max_count,
        })
        .collect()
}

fn validate_pools(pools: &BTreeMap<String, NodePoolConfig>) -> Result<(), String> {
    if pools.is_empty() {
        return Err("at least one node pool is required".to_string());
    }
    for (name, p) in pools {
        if p.autoscaling && p.min_count > p.max_count {
            return Err(format!("node pool {name}: minCount {} exceeds maxCount {}", p.min_count, p.max_count));
        }
    }
    Ok(())
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmazonConfig {
    #[serde(default)]
    pub version: Option<String>,
    pub node_pools: BTreeMap<String, NodePoolConfig>,
}

impl ProviderConfig for AmazonConfig {
    const KIND: ProviderKind = ProviderKind::Amazon;

    fn kubernetes_version(&self) -> Option<&str> {
        self.version.as_deref()
    }
    fn node_pools(&self) -> Vec<NodePoolSummary> {
        summarize(&self.node_pools)
    }
    fn validate(&self) -> Result<(), String> {
        validate_pools(&self.node_pools)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureConfig {
    pub resource_group: String,
    #[serde(default)]
    pub kubernetes_version: Option<String>,
    pub node_pools: BTreeMap<String, NodePoolConfig>,
}

impl ProviderConfig for AzureConfig {
    const KIND: ProviderKind = ProviderKind::Azure;

    fn kubernetes_version(&self) -> Option<&str> {
        self.kubernetes_version.as_deref()
    }
    fn node_pools(&self) -> Vec<NodePoolSummary> {
        summarize(&self.node_pools)
    }
    fn validate(&self) -> Result<(), String> {
        if self.resource_group.trim().is_empty() {
            return Err("resourceGroup is required".to_string());
        }
        validate_pools(&self.node_pools)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleConfig {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub master_version: Option<String>,
    pub node_pools: BTreeMap<String, NodePoolConfig>,
}

impl ProviderConfig for GoogleConfig {
    const KIND: ProviderKind = ProviderKind::Google;

    fn kubernetes_version(&self) -> Option<&str> {
        self.master_version.as_deref()
    }
    fn node_pools(&self) -> Vec<NodePoolSummary> {
        summarize(&self.node_pools)
    }
    fn validate(&self) -> Result<(), String> {
        validate_pools(&self.node_pools)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlibabaConfig {
    pub region_id: String,
    #[serde(default)]
    pub zone_id: Option<String>,
    pub node_pools: BTreeMap<String, NodePoolConfig>,
}

impl ProviderConfig for AlibabaConfig {
    const KIND: ProviderKind = ProviderKind::Alibaba;

    fn kubernetes_version(&self) -> Option<&str> {
        None
    }
    fn node_pools(&self) -> Vec<NodePoolSummary> {
        summarize(&self.node_pools)
    }
    fn validate(&self) -> Result<(), String> {
        validate_pools(&self.node_pools)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleConfig {
    #[serde(default)]
    pub version: Option<String>,
    pub node_pools: BTreeMap<String, NodePoolConfig>,
}

impl ProviderConfig for OracleConfig {
    const KIND: ProviderKind = ProviderKind::Oracle;

    fn kubernetes_version(&self) -> Option<&str> {
        self.version.as_deref()
    }
    fn node_pools(&self) -> Vec<NodePoolSummary> {
        summarize(&self.node_pools)
    }
    fn validate(&self) -> Result<(), String> {
        validate_pools(&self.node_pools)
    }
}

/// Imported cluster; only its kubeconfig is known, so there are no node pools.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct KubernetesConfig {
    pub metadata: BTreeMap<String, String>,
}

impl ProviderConfig for KubernetesConfig {
    const KIND: ProviderKind = ProviderKind::Kubernetes;

    fn kubernetes_version(&self) -> Option<&str> {
        self.metadata.get("version").map(String::as_str)
    }
    fn node_pools(&self) -> Vec<NodePoolSummary> {
        vec![]
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DummyConfig {
    pub kubernetes_version: Option<String>,
    pub node_count: u32,
}

impl ProviderConfig for DummyConfig {
    const KIND: ProviderKind = ProviderKind::Dummy;

    fn kubernetes_version(&self) -> Option<&str> {
        self.kubernetes_version.as_deref()
    }
    fn node_pools(&self) -> Vec<NodePoolSummary> {
        vec![NodePoolSummary {
            name: "dummy".to_string(),
            instance_type: "dummy".to_string(),
            count: self.node_count,
            autoscaling: false,
            min_count: self.node_count,
            max_count: self.node_count,
        }]
    }
}

/// Cluster handle over a record and its decoded provider configuration.
#[derive(Debug)]
pub struct ProviderCluster<C: ProviderConfig> {
    record: ClusterRecord,
    status: ClusterStatus,
    config: C,
}

impl<C: ProviderConfig> ProviderCluster<C> {
    pub(crate) fn new(record: ClusterRecord, config: C) -> Self {
        let status = ClusterStatus::parse(&record.status);
        Self { record, status, config }
    }

    pub fn config(&self) -> &C {
        &self.config
    }
}

impl<C: ProviderConfig> Cluster for ProviderCluster<C> {
    fn id(&self) -> ClusterId {
        self.record.id
    }
    fn name(&self) -> &str {
        &self.record.name
    }
    fn organization_id(&self) -> OrganizationId {
        self.record.organization_id
    }
    fn provider(&self) -> ProviderKind {
        C::KIND
    }
    fn location(&self) -> &str {
        &self.record.location
    }
    fn secret_id(&self) -> &SecretId {
        &self.record.secret_id
    }
    fn status(&self) -> ClusterStatus {
        self.status
    }
    fn status_message(&self) -> &str {
        &self.record.status_message
    }
    fn kubernetes_version(&self) -> Option<&str> {
        self.config.kubernetes_version()
    }
    fn node_pools(&self) -> Vec<NodePoolSummary> {
        self.config.node_pools()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amazon_config_requires_node_pools() {
        let cfg: AmazonConfig = serde_json::from_str(r#"{"nodePools":{}}"#).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn autoscaling_bounds_are_checked() {
        let cfg: GoogleConfig = serde_json::from_str(
            r#"{"nodePools":{"pool1":{"instanceType":"n1-standard-2","count":2,"autoscaling":true,"minCount":3,"maxCount":1}}}"#,
        )
        .unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("pool1"));
    }

    #[test]
    fn dummy_reports_single_pool() {
        let cfg: DummyConfig = serde_json::from_str(r#"{"nodeCount":3}"#).unwrap();
        let pools = cfg.node_pools();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].count, 3);
    }
}
