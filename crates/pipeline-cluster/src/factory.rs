use pipeline_core::{ClusterRecord, ProviderKind};

use crate::cluster::Cluster;
use crate::error::FactoryError;
use crate::providers::{
    AlibabaConfig, AmazonConfig, AzureConfig, DummyConfig, GoogleConfig, KubernetesConfig, OracleConfig,
    ProviderCluster, ProviderConfig,
};

/// Builds a handle for one provider.
pub type Constructor = fn(&ClusterRecord) -> Result<Box<dyn Cluster>, FactoryError>;

/// Registration table. The match is exhaustive, so a new [`ProviderKind`]
/// does not compile until it has a constructor.
pub fn constructor_for(kind: ProviderKind) -> Constructor {
    match kind {
        ProviderKind::Amazon => build::<AmazonConfig> as Constructor,
        ProviderKind::Azure => build::<AzureConfig>,
        ProviderKind::Google => build::<GoogleConfig>,
        ProviderKind::Alibaba => build::<AlibabaConfig>,
        ProviderKind::Oracle => build::<OracleConfig>,
        ProviderKind::Kubernetes => build::<KubernetesConfig>,
        ProviderKind::Dummy => build::<DummyConfig>,
    }
}

fn build<C: ProviderConfig>(record: &ClusterRecord) -> Result<Box<dyn Cluster>, FactoryError> {
    let raw = if record.config.trim().is_empty() { "{}" } else { record.config.as_str() };
    let config: C = serde_json::from_str(raw).map_err(|source| FactoryError::MalformedConfig {
        cluster: record.name.clone(),
        provider: C::KIND,
        source,
    })?;
    config.validate().map_err(|reason| FactoryError::InvalidConfig {
        cluster: record.name.clone(),
        provider: C::KIND,
        reason,
    })?;
    Ok(Box::new(ProviderCluster::new(record.clone(), config)))
}

/// Maps persisted records to cluster handles. Stateless; free to share across threads.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClusterFactory;

impl ClusterFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn supported_providers(&self) -> &'static [ProviderKind] {
        &ProviderKind::ALL
    }

    pub fn resolve(&self, record: &ClusterRecord) -> Result<Box<dyn Cluster>, FactoryError> {
        let kind: ProviderKind = record.provider.parse().map_err(|_| FactoryError::UnsupportedProvider {
            cluster: record.name.clone(),
            provider: record.provider.clone(),
        })?;
        constructor_for(kind)(record)
    }
}
