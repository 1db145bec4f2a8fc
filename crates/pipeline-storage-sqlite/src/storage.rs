use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use pipeline_core::{
    ClusterId, ClusterRecord, CreateSecretRequest, NewClusterRecord, OrganizationId, SecretId, SpotguideId,
    SpotguideRecord, UserId, MAX_SPOTGUIDE_RAW_BYTES,
};
use pipeline_storage::{
    now_unix, ClusterRepository, Result, SecretStore, SpotguideRepository, StorageError, StoredSecret, UpsertOutcome,
};

const CLUSTER_COLUMNS: &str = "id, organization_id, name, provider, location, secret_id, status, status_message, \
                               config, created_by, created_at, deleted_at";

const SPOTGUIDE_COLUMNS: &str = "id, created_at, updated_at, deleted_at, name, icon, spotguide_raw";

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory().context("open in-memory sqlite db")?)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql).context("apply schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn cluster_from_row(r: &Row<'_>) -> rusqlite::Result<ClusterRecord> {
        Ok(ClusterRecord {
            id: ClusterId(r.get::<_, i64>(0)? as u64),
            organization_id: OrganizationId(r.get::<_, i64>(1)? as u64),
            name: r.get(2)?,
            provider: r.get(3)?,
            location: r.get(4)?,
            secret_id: SecretId::from_str(r.get::<_, String>(5)?),
            status: r.get(6)?,
            status_message: r.get(7)?,
            config: r.get(8)?,
            created_by: UserId(r.get::<_, i64>(9)? as u64),
            created_at_unix: r.get(10)?,
            deleted_at_unix: r.get(11)?,
        })
    }

    fn spotguide_from_row(r: &Row<'_>) -> rusqlite::Result<SpotguideRecord> {
        Ok(SpotguideRecord {
            id: SpotguideId(r.get::<_, i64>(0)? as u64),
            created_at_unix: r.get(1)?,
            updated_at_unix: r.get(2)?,
            deleted_at_unix: r.get(3)?,
            name: r.get(4)?,
            icon: r.get(5)?,
            spotguide_raw: r.get(6)?,
        })
    }

    fn query_clusters(&self, filter: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<ClusterRecord>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {CLUSTER_COLUMNS} FROM clusters WHERE deleted_at IS NULL {filter} ORDER BY id");
        let mut stmt = conn.prepare(&sql).context("prepare cluster query")?;
        let rows = stmt.query_map(args, Self::cluster_from_row).context("query clusters")?;
        let mut clusters = vec![];
        for row in rows {
            clusters.push(row.context("decode cluster row")?);
        }
        Ok(clusters)
    }

    fn find_one_cluster(&self, field: &str, key: String, args: &[&dyn rusqlite::ToSql]) -> Result<ClusterRecord> {
        let mut found = self.query_clusters(&format!("AND organization_id = ?1 AND {field} = ?2"), args)?;
        if found.is_empty() {
            return Err(StorageError::not_found("cluster", key));
        }
        Ok(found.swap_remove(0))
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

impl ClusterRepository for SqliteStorage {
    fn all(&self) -> Result<Vec<ClusterRecord>> {
        self.query_clusters("", &[])
    }

    fn find_by_organization(&self, organization_id: OrganizationId) -> Result<Vec<ClusterRecord>> {
        self.query_clusters("AND organization_id = ?1", &[&(organization_id.get() as i64)])
    }

    fn find_one_by_id(&self, organization_id: OrganizationId, cluster_id: ClusterId) -> Result<ClusterRecord> {
        self.find_one_cluster(
            "id",
            format!("id={cluster_id} organization={organization_id}"),
            &[&(organization_id.get() as i64), &(cluster_id.get() as i64)],
        )
    }

    fn find_one_by_name(&self, organization_id: OrganizationId, name: &str) -> Result<ClusterRecord> {
        self.find_one_cluster(
            "name",
            format!("name={name} organization={organization_id}"),
            &[&(organization_id.get() as i64), &name],
        )
    }

    fn find_by_secret(&self, organization_id: OrganizationId, secret_id: &SecretId) -> Result<Vec<ClusterRecord>> {
        self.query_clusters(
            "AND organization_id = ?1 AND secret_id = ?2",
            &[&(organization_id.get() as i64), &secret_id.as_str()],
        )
    }

    fn exists(&self, organization_id: OrganizationId, name: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(1) FROM clusters WHERE organization_id=?1 AND name=?2 AND deleted_at IS NULL",
                params![organization_id.get() as i64, name],
                |r| r.get(0),
            )
            .context("check cluster existence")?;
        Ok(n > 0)
    }

    fn create(&self, record: NewClusterRecord) -> Result<ClusterRecord> {
        let conn = self.conn.lock().unwrap();
        let now = now_unix();
        let res = conn.execute(
            "INSERT INTO clusters(organization_id, name, provider, location, secret_id, status, status_message, config, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.organization_id.get() as i64,
                record.name,
                record.provider,
                record.location,
                record.secret_id.as_str(),
                record.status,
                record.status_message,
                record.config,
                record.created_by.get() as i64,
                now
            ],
        );
        match res {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(StorageError::Conflict {
                    entity: "cluster",
                    key: format!("name={} organization={}", record.name, record.organization_id),
                });
            }
            Err(e) => return Err(anyhow::Error::new(e).context("insert cluster").into()),
        }

        Ok(ClusterRecord {
            id: ClusterId(conn.last_insert_rowid() as u64),
            organization_id: record.organization_id,
            name: record.name,
            provider: record.provider,
            location: record.location,
            secret_id: record.secret_id,
            status: record.status,
            status_message: record.status_message,
            config: record.config,
            created_by: record.created_by,
            created_at_unix: now,
            deleted_at_unix: None,
        })
    }

    fn soft_delete(&self, organization_id: OrganizationId, cluster_id: ClusterId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn
            .execute(
                "UPDATE clusters SET deleted_at=?1 WHERE organization_id=?2 AND id=?3 AND deleted_at IS NULL",
                params![now_unix(), organization_id.get() as i64, cluster_id.get() as i64],
            )
            .context("soft delete cluster")?;
        if n == 0 {
            return Err(StorageError::not_found(
                "cluster",
                format!("id={cluster_id} organization={organization_id}"),
            ));
        }
        Ok(())
    }
}

impl SpotguideRepository for SqliteStorage {
    fn list(&self) -> Result<Vec<SpotguideRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!("SELECT {SPOTGUIDE_COLUMNS} FROM spotguide_repos WHERE deleted_at IS NULL ORDER BY id"))
            .context("prepare spotguide query")?;
        let rows = stmt.query_map([], Self::spotguide_from_row).context("query spotguides")?;
        let mut spotguides = vec![];
        for row in rows {
            spotguides.push(row.context("decode spotguide row")?);
        }
        Ok(spotguides)
    }

    fn find_by_name(&self, name: &str) -> Result<Option<SpotguideRecord>> {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(
                &format!("SELECT {SPOTGUIDE_COLUMNS} FROM spotguide_repos WHERE name=?1 AND deleted_at IS NULL"),
                params![name],
                Self::spotguide_from_row,
            )
            .optional()
            .context("find spotguide by name")?;
        Ok(found)
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

        let conn = self.conn.lock().unwrap();
        let now = now_unix();
        let tx = conn.unchecked_transaction().context("begin spotguide upsert")?;

        let existing = tx
            .query_row(
                &format!("SELECT {SPOTGUIDE_COLUMNS} FROM spotguide_repos WHERE name=?1 AND deleted_at IS NULL"),
                params![name],
                Self::spotguide_from_row,
            )
            .optional()
            .context("find spotguide for upsert")?;

        let outcome = match existing {
            Some(record) if record.spotguide_raw == spotguide_raw => UpsertOutcome::Unchanged(record),
            Some(mut record) => {
                tx.execute(
                    "UPDATE spotguide_repos SET spotguide_raw=?1, updated_at=?2 WHERE id=?3",
                    params![spotguide_raw, now, record.id.get() as i64],
                )
                .context("update spotguide")?;
                record.spotguide_raw = spotguide_raw.to_vec();
                record.updated_at_unix = now;
                UpsertOutcome::Updated(record)
            }
            None => {
                tx.execute(
                    "INSERT INTO spotguide_repos(created_at, updated_at, name, icon, spotguide_raw) VALUES (?1, ?1, ?2, '', ?3)",
                    params![now, name, spotguide_raw],
                )
                .context("insert spotguide")?;
                UpsertOutcome::Created(SpotguideRecord {
                    id: SpotguideId(tx.last_insert_rowid() as u64),
                    created_at_unix: now,
                    updated_at_unix: now,
                    deleted_at_unix: None,
                    name: name.to_string(),
                    icon: String::new(),
                    spotguide_raw: spotguide_raw.to_vec(),
                })
            }
        };

        tx.commit().context("commit spotguide upsert")?;
        Ok(outcome)
    }
}

impl SecretStore for SqliteStorage {
    fn store(&self, organization_id: OrganizationId, request: &CreateSecretRequest) -> Result<SecretId> {
        let conn = self.conn.lock().unwrap();
        let id = request.id();
        let values_json = serde_json::to_string(&request.values).context("encode secret values")?;
        let tags_json = serde_json::to_string(&request.tags).context("encode secret tags")?;
        let res = conn.execute(
            "INSERT INTO secrets(organization_id, id, name, type, values_json, tags_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                organization_id.get() as i64,
                id.as_str(),
                request.name,
                request.secret_type,
                values_json,
                tags_json,
                now_unix()
            ],
        );
        match res {
            Ok(_) => {
                tracing::debug!(organization = %organization_id, secret = %request.name, "stored secret");
                Ok(id)
            }
            Err(e) if is_constraint_violation(&e) => Err(StorageError::Conflict {
                entity: "secret",
                key: format!("name={} organization={organization_id}", request.name),
            }),
            Err(e) => Err(anyhow::Error::new(e).context("insert secret").into()),
        }
    }

    fn list(&self, organization_id: OrganizationId) -> Result<Vec<StoredSecret>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, name, type, values_json, tags_json FROM secrets WHERE organization_id=?1 ORDER BY created_at, name")
            .context("prepare secret query")?;
        let rows = stmt
            .query_map(params![organization_id.get() as i64], |r| {
                let values_json: String = r.get(3)?;
                let tags_json: String = r.get(4)?;
                Ok(StoredSecret {
                    id: SecretId::from_str(r.get::<_, String>(0)?),
                    organization_id,
                    request: CreateSecretRequest {
                        name: r.get(1)?,
                        secret_type: r.get(2)?,
                        values: serde_json::from_str(&values_json).unwrap_or_default(),
                        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
                    },
                })
            })
            .context("query secrets")?;
        let mut secrets = vec![];
        for row in rows {
            secrets.push(row.context("decode secret row")?);
        }
        Ok(secrets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_cluster(org: u64, name: &str) -> NewClusterRecord {
        NewClusterRecord {
            organization_id: OrganizationId(org),
            name: name.to_string(),
            provider: "amazon".to_string(),
            location: "eu-west-1".to_string(),
            secret_id: SecretId::from_str("s1"),
            status: "RUNNING".to_string(),
            status_message: String::new(),
            config: r#"{"nodePools":{}}"#.to_string(),
            created_by: UserId(1),
        }
    }

    #[test]
    fn sqlite_open_and_migrate() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("pipeline.db");
        let _ = SqliteStorage::open(&db_path).unwrap();
        // migrations are idempotent
        let _ = SqliteStorage::open(&db_path).unwrap();
    }

    #[test]
    fn cluster_round_trip() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let created = store.create(new_cluster(1, "prod")).unwrap();
        let found = store.find_one_by_id(OrganizationId(1), created.id).unwrap();
        assert_eq!(found, created);
        assert_eq!(store.find_one_by_name(OrganizationId(1), "prod").unwrap().id, created.id);
        assert!(store.exists(OrganizationId(1), "prod").unwrap());
        assert_eq!(store.find_by_secret(OrganizationId(1), &SecretId::from_str("s1")).unwrap().len(), 1);
    }

    #[test]
    fn missing_cluster_is_not_found() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let created = store.create(new_cluster(1, "prod")).unwrap();
        assert!(store.find_one_by_id(OrganizationId(2), created.id).unwrap_err().is_not_found());
        assert!(store.find_one_by_name(OrganizationId(1), "staging").unwrap_err().is_not_found());
    }

    #[test]
    fn name_is_unique_among_live_clusters() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let first = store.create(new_cluster(1, "prod")).unwrap();
        assert!(matches!(store.create(new_cluster(1, "prod")), Err(StorageError::Conflict { .. })));

        store.soft_delete(OrganizationId(1), first.id).unwrap();
        assert!(store.find_by_organization(OrganizationId(1)).unwrap().is_empty());
        let second = store.create(new_cluster(1, "prod")).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(store.all().unwrap().len(), 1);
    }

    #[test]
    fn spotguide_upsert_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = SqliteStorage::open(&dir.path().join("pipeline.db")).unwrap();

        let created = store.upsert("banzaicloud/spotguide-spark", b"name: spark").unwrap();
        assert!(matches!(created, UpsertOutcome::Created(_)));
        let before = SpotguideRepository::list(&store).unwrap();

        let again = store.upsert("banzaicloud/spotguide-spark", b"name: spark").unwrap();
        assert!(matches!(again, UpsertOutcome::Unchanged(_)));
        assert_eq!(SpotguideRepository::list(&store).unwrap(), before);

        let updated = store.upsert("banzaicloud/spotguide-spark", b"name: spark2").unwrap();
        assert!(matches!(updated, UpsertOutcome::Updated(_)));
        let found = store.find_by_name("banzaicloud/spotguide-spark").unwrap().unwrap();
        assert_eq!(found.spotguide_raw, b"name: spark2");
        assert_eq!(found.id, created.record().id);
    }

    #[test]
    fn secrets_are_stored_per_organization() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let mut req = CreateSecretRequest::new("DB_PASS").with_value("password", "x");
        req.tags.push("repo:acme/proj1".into());

        let id = store.store(OrganizationId(1), &req).unwrap();
        assert_eq!(id, req.id());
        assert!(matches!(store.store(OrganizationId(1), &req), Err(StorageError::Conflict { .. })));
        store.store(OrganizationId(2), &req).unwrap();

        let listed = SecretStore::list(&store, OrganizationId(1)).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].request, req);
    }
}
