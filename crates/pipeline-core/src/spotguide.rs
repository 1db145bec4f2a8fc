use serde::{Deserialize, Serialize};

use crate::ids::SpotguideId;

/// Decoded `.banzaicloud/spotguide.yaml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotguideManifest {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub resources: Resources,
    /// Launch-time questions. The schema is owned by the UI, so entries are kept as-is.
    pub questions: Vec<serde_yaml::Value>,
}

/// Aggregate resource hints for the cluster a spotguide runs on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
    #[serde(rename = "sumCpu")]
    pub cpu: u32,
    #[serde(rename = "sumMem")]
    pub memory: u32,
    pub filters: Vec<String>,
    #[serde(rename = "sameSize")]
    pub same_size: bool,
    #[serde(rename = "onDemandPct")]
    pub on_demand_pct: u32,
    #[serde(rename = "minNodes")]
    pub min_nodes: u32,
    #[serde(rename = "maxNodes")]
    pub max_nodes: u32,
}

impl SpotguideManifest {
    pub fn from_yaml(raw: &[u8]) -> Result<Self, serde_yaml::Error> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_yaml::from_slice(raw)
    }
}

/// Persisted spotguide row (`spotguide_repos`).
///
/// Only the raw manifest bytes are stored; callers decode them on every read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotguideRecord {
    pub id: SpotguideId,
    pub created_at_unix: i64,
    pub updated_at_unix: i64,
    pub deleted_at_unix: Option<i64>,
    /// Full repository name, `owner/repo`.
    pub name: String,
    pub icon: String,
    #[serde(skip)]
    pub spotguide_raw: Vec<u8>,
}

impl SpotguideRecord {
    /// Splits the full name into `(owner, repo)`.
    pub fn owner_and_repo(&self) -> Option<(&str, &str)> {
        split_full_name(&self.name)
    }
}

/// Splits `owner/repo`; both halves must be non-empty and the repo part must not contain `/`.
pub fn split_full_name(full_name: &str) -> Option<(&str, &str)> {
    let (owner, repo) = full_name.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner, repo))
}
