use pipeline_core::{OrganizationId, ProviderKind};
use pipeline_storage::StorageError;
use thiserror::Error;

/// Why a record could not be turned into a cluster handle.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("cluster {cluster}: unsupported provider {provider:?}")]
    UnsupportedProvider { cluster: String, provider: String },

    #[error("cluster {cluster}: malformed {provider} configuration")]
    MalformedConfig {
        cluster: String,
        provider: ProviderKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("cluster {cluster}: invalid {provider} configuration: {reason}")]
    InvalidConfig {
        cluster: String,
        provider: ProviderKind,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster {cluster} not found in organization {organization_id}")]
    NotFound {
        organization_id: OrganizationId,
        cluster: String,
    },

    #[error("could not resolve cluster {cluster} of organization {organization_id}")]
    ResolutionFailed {
        organization_id: OrganizationId,
        cluster: String,
        #[source]
        source: FactoryError,
    },

    #[error("could not get clusters from database")]
    Storage(#[source] StorageError),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}
