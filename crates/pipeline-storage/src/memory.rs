use std::sync::Mutex;

use pipeline_core::{
    ClusterId, ClusterRecord, CreateSecretRequest, NewClusterRecord, OrganizationId, SecretId, SpotguideId,
    SpotguideRecord, MAX_SPOTGUIDE_RAW_BYTES,
};

use crate::error::{Result, StorageError};
use crate::now_unix;
use crate::traits::{ClusterRepository, SecretStore, SpotguideRepository, StoredSecret, UpsertOutcome};

/// In-memory storage for tests. Not durable, but good for unit/small scenario tests.
///
/// Rows are kept in insertion order so listings are stable.
#[derive(Default)]
pub struct InMemoryStorage {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    clusters: Vec<ClusterRecord>,
    spotguides: Vec<SpotguideRecord>,
    secrets: Vec<StoredSecret>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn live(r: &&ClusterRecord) -> bool {
    !r.is_deleted()
}

impl ClusterRepository for InMemoryStorage {
    fn all(&self) -> Result<Vec<ClusterRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.clusters.iter().filter(live).cloned().collect())
    }

    fn find_by_organization(&self, organization_id: OrganizationId) -> Result<Vec<ClusterRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .clusters
            .iter()
            .filter(live)
            .filter(|c| c.organization_id == organization_id)
            .cloned()
            .collect())
    }

    fn find_one_by_id(&self, organization_id: OrganizationId, cluster_id: ClusterId) -> Result<ClusterRecord> {
        let inner = self.inner.lock().unwrap();
        inner
            .clusters
            .iter()
            .filter(live)
            .find(|c| c.organization_id == organization_id && c.id == cluster_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("cluster", format!("id={cluster_id} organization={organization_id}")))
    }

    fn find_one_by_name(&self, organization_id: OrganizationId, name: &str) -> Result<ClusterRecord> {
        let inner = self.inner.lock().unwrap();
        inner
            .clusters
            .iter()
            .filter(live)
            .find(|c| c.organization_id == organization_id && c.name == name)
            .cloned()
            .ok_or_else(|| StorageError::not_found("cluster", format!("name={name} organization={organization_id}")))
    }

    fn find_by_secret(&self, organization_id: OrganizationId, secret_id: &SecretId) -> Result<Vec<ClusterRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .clusters
            .iter()
            .filter(live)
            .filter(|c| c.organization_id == organization_id && &c.secret_id == secret_id)
            .cloned()
            .collect())
    }

    fn exists(&self, organization_id: OrganizationId, name: &str) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .clusters
            .iter()
            .filter(live)
            .any(|c| c.organization_id == organization_id && c.name == name))
    }

    fn create(&self, record: NewClusterRecord) -> Result<ClusterRecord> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .clusters
            .iter()
            .filter(live)
            .any(|c| c.organization_id == record.organization_id && c.name == record.name)
        {
            return Err(StorageError::Conflict {
                entity: "cluster",
                key: format!("name={} organization={}", record.name, record.organization_id),
            });
        }
        let created = ClusterRecord {
            id: ClusterId(inner.clusters.len() as u64 + 1),
            organization_id: record.organization_id,
            name: record.name,
            provider: record.provider,
            location: record.location,
            secret_id: record.secret_id,
            status: record.status,
            status_message: record.status_message,
            config: record.config,
            created_by: record.created_by,
            created_at_unix: now_unix(),
            deleted_at_unix: None,
        };
        inner.clusters.push(created.clone());
        Ok(created)
    }

    fn soft_delete(&self, organization_id: OrganizationId, cluster_id: ClusterId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let found = inner
            .clusters
            .iter_mut()
            .find(|c| !c.is_deleted() && c.organization_id == organization_id && c.id == cluster_id)
            .ok_or_else(|| StorageError::not_found("cluster", format!("id={cluster_id} organization={organization_id}")))?;
        found.deleted_at_unix = Some(now_unix());
        Ok(())
    }
}

impl SpotguideRepository for InMemoryStorage {
    fn list(&self) -> Result<Vec<SpotguideRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.spotguides.iter().filter(|s| s.deleted_at_unix.is_none()).cloned().collect())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<SpotguideRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .spotguides
            .iter()
            .find(|s| s.deleted_at_unix.is_none() && s.name == name)
            .cloned())
    }

    fn upsert(&self, name: &str, spotguide_raw: &[u8]) -> Result<UpsertOutcome> {
        if spotguide_raw.len() > MAX_SPOTGUIDE_RAW_BYTES {
            return Err(StorageError::TooLarge {
                entity: "spotguide manifest",
                key: name.to_string(),
                size: spotguide_raw.len(),
                limit: MAX_SPOTGUIDE_RAW_BYTES,
            });
        }

        let mut inner = self.inner.lock().unwrap();
        let now = now_unix();
        if let Some(existing) = inner
            .spotguides
            .iter_mut()
            .find(|s| s.deleted_at_unix.is_none() && s.name == name)
        {
            if existing.spotguide_raw == spotguide_raw {
                return Ok(UpsertOutcome::Unchanged(existing.clone()));
            }
            existing.spotguide_raw = spotguide_raw.to_vec();
            existing.updated_at_unix = now;
            return Ok(UpsertOutcome::Updated(existing.clone()));
        }

        let record = SpotguideRecord {
            id: SpotguideId(inner.spotguides.len() as u64 + 1),
            created_at_unix: now,
            updated_at_unix: now,
            deleted_at_unix: None,
            name: name.to_string(),
            icon: String::new(),
            spotguide_raw: spotguide_raw.to_vec(),
        };
        inner.spotguides.push(record.clone());
        Ok(UpsertOutcome::Created(record))
    }
}

impl SecretStore for InMemoryStorage {
    fn store(&self, organization_id: OrganizationId, request: &CreateSecretRequest) -> Result<SecretId> {
        let mut inner = self.inner.lock().unwrap();
        let id = request.id();
        if inner.secrets.iter().any(|s| s.organization_id == organization_id && s.id == id) {
            return Err(StorageError::Conflict {
                entity: "secret",
                key: format!("name={} organization={organization_id}", request.name),
            });
        }
        inner.secrets.push(StoredSecret {
            id: id.clone(),
            organization_id,
            request: request.clone(),
        });
        Ok(id)
    }

    fn list(&self, organization_id: OrganizationId) -> Result<Vec<StoredSecret>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .secrets
            .iter()
            .filter(|s| s.organization_id == organization_id)
            .cloned()
            .collect())
    }
}
