use pipeline_core::{
    ClusterId, ClusterRecord, CreateSecretRequest, NewClusterRecord, OrganizationId, SecretId, SpotguideRecord,
};

use crate::error::Result;

/// Cluster rows. Every finder ignores soft-deleted records.
pub trait ClusterRepository: Send + Sync {
    fn all(&self) -> Result<Vec<ClusterRecord>>;
    fn find_by_organization(&self, organization_id: OrganizationId) -> Result<Vec<ClusterRecord>>;

    /// Fails with `StorageError::NotFound` when no live record matches.
    fn find_one_by_id(&self, organization_id: OrganizationId, cluster_id: ClusterId) -> Result<ClusterRecord>;
    fn find_one_by_name(&self, organization_id: OrganizationId, name: &str) -> Result<ClusterRecord>;

    fn find_by_secret(&self, organization_id: OrganizationId, secret_id: &SecretId) -> Result<Vec<ClusterRecord>>;

    fn exists(&self, organization_id: OrganizationId, name: &str) -> Result<bool>;

    /// Fails with `StorageError::Conflict` if a live record with the same name exists in the organization.
    fn create(&self, record: NewClusterRecord) -> Result<ClusterRecord>;
    fn soft_delete(&self, organization_id: OrganizationId, cluster_id: ClusterId) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(SpotguideRecord),
    Updated(SpotguideRecord),
    /// A row with identical raw bytes already existed; nothing was written.
    Unchanged(SpotguideRecord),
}

impl UpsertOutcome {
    pub fn record(&self) -> &SpotguideRecord {
        match self {
            UpsertOutcome::Created(r) | UpsertOutcome::Updated(r) | UpsertOutcome::Unchanged(r) => r,
        }
    }
}

/// Spotguide catalog rows, keyed by full repository name.
pub trait SpotguideRepository: Send + Sync {
    fn list(&self) -> Result<Vec<SpotguideRecord>>;
    fn find_by_name(&self, name: &str) -> Result<Option<SpotguideRecord>>;

    /// Match-and-assign-or-create on `name`. Raw manifests over
    /// `MAX_SPOTGUIDE_RAW_BYTES` are rejected with `StorageError::TooLarge`.
    fn upsert(&self, name: &str, spotguide_raw: &[u8]) -> Result<UpsertOutcome>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredSecret {
    pub id: SecretId,
    pub organization_id: OrganizationId,
    pub request: CreateSecretRequest,
}

pub trait SecretStore: Send + Sync {
    fn store(&self, organization_id: OrganizationId, request: &CreateSecretRequest) -> Result<SecretId>;
    fn list(&self, organization_id: OrganizationId) -> Result<Vec<StoredSecret>>;
}
