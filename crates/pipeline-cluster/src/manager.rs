use std::sync::Arc;

use pipeline_core::{ClusterId, ClusterRecord, OrganizationId, SecretId};
use pipeline_storage::{ClusterRepository, StorageError};
use tracing::{debug, warn};

use crate::cluster::Cluster;
use crate::error::ClusterError;
use crate::factory::ClusterFactory;

/// Organization-scoped and global cluster lookups.
///
/// Listings skip records that fail to resolve (logged, not returned); single
/// lookups report the failure to the caller.
pub struct ClusterManager {
    clusters: Arc<dyn ClusterRepository>,
    factory: ClusterFactory,
}

impl ClusterManager {
    pub fn new(clusters: Arc<dyn ClusterRepository>, factory: ClusterFactory) -> Self {
        Self { clusters, factory }
    }

    /// Clusters of an organization.
    pub fn list_by_organization(&self, organization_id: OrganizationId) -> Result<Vec<Box<dyn Cluster>>, ClusterError> {
        debug!(organization = %organization_id, "fetching clusters from database");
        let records = self
            .clusters
            .find_by_organization(organization_id)
            .map_err(ClusterError::Storage)?;
        Ok(self.resolve_all(records))
    }

    /// Clusters of every organization.
    pub fn list_all(&self) -> Result<Vec<Box<dyn Cluster>>, ClusterError> {
        debug!("fetching clusters from database");
        let records = self.clusters.all().map_err(ClusterError::Storage)?;
        Ok(self.resolve_all(records))
    }

    /// Clusters of an organization that use the given secret.
    pub fn list_by_secret(
        &self,
        organization_id: OrganizationId,
        secret_id: &SecretId,
    ) -> Result<Vec<Box<dyn Cluster>>, ClusterError> {
        debug!(organization = %organization_id, secret = %secret_id, "fetching clusters from database");
        let records = self
            .clusters
            .find_by_secret(organization_id, secret_id)
            .map_err(ClusterError::Storage)?;
        Ok(self.resolve_all(records))
    }

    pub fn get_by_id(&self, organization_id: OrganizationId, cluster_id: ClusterId) -> Result<Box<dyn Cluster>, ClusterError> {
        debug!(organization = %organization_id, cluster = %cluster_id, "getting cluster from database");
        let record = self
            .clusters
            .find_one_by_id(organization_id, cluster_id)
            .map_err(|e| lookup_error(e, organization_id, cluster_id.to_string()))?;
        self.resolve_one(record)
    }

    pub fn get_by_name(&self, organization_id: OrganizationId, name: &str) -> Result<Box<dyn Cluster>, ClusterError> {
        debug!(organization = %organization_id, cluster = %name, "getting cluster from database");
        let record = self
            .clusters
            .find_one_by_name(organization_id, name)
            .map_err(|e| lookup_error(e, organization_id, name.to_string()))?;
        self.resolve_one(record)
    }

    fn resolve_one(&self, record: ClusterRecord) -> Result<Box<dyn Cluster>, ClusterError> {
        self.factory.resolve(&record).map_err(|source| ClusterError::ResolutionFailed {
            organization_id: record.organization_id,
            cluster: record.name.clone(),
            source,
        })
    }

    fn resolve_all(&self, records: Vec<ClusterRecord>) -> Vec<Box<dyn Cluster>> {
        let mut clusters = Vec::with_capacity(records.len());
        for record in records {
            debug!(organization = %record.organization_id, cluster = %record.name, "converting cluster record to cluster");
            match self.factory.resolve(&record) {
                Ok(cluster) => clusters.push(cluster),
                Err(e) => {
                    warn!(
                        organization = %record.organization_id,
                        cluster = %record.name,
                        error = %e,
                        "converting cluster record to cluster failed"
                    );
                }
            }
        }
        clusters
    }
}

fn lookup_error(e: StorageError, organization_id: OrganizationId, cluster: String) -> ClusterError {
    if e.is_not_found() {
        ClusterError::NotFound { organization_id, cluster }
    } else {
        ClusterError::Storage(e)
    }
}
