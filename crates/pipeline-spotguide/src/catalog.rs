use std::sync::Arc;

use pipeline_core::{SpotguideManifest, SpotguideRecord};
use pipeline_storage::SpotguideRepository;
use serde::Serialize;
use tracing::debug;

use crate::error::CatalogError;

/// A catalog row together with its manifest, decoded from the raw bytes on read.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Spotguide {
    #[serde(flatten)]
    pub record: SpotguideRecord,
    #[serde(rename = "spotguide")]
    pub manifest: SpotguideManifest,
}

impl Spotguide {
    pub fn decode(record: SpotguideRecord) -> Result<Self, CatalogError> {
        let manifest = SpotguideManifest::from_yaml(&record.spotguide_raw).map_err(|source| {
            CatalogError::MalformedManifest { name: record.name.clone(), source }
        })?;
        Ok(Self { record, manifest })
    }
}

/// Read side of the spotguide catalog.
#[derive(Clone)]
pub struct SpotguideCatalog {
    spotguides: Arc<dyn SpotguideRepository>,
}

impl SpotguideCatalog {
    pub fn new(spotguides: Arc<dyn SpotguideRepository>) -> Self {
        Self { spotguides }
    }

    /// Every live spotguide. One malformed manifest fails the whole listing.
    pub fn list(&self) -> Result<Vec<Spotguide>, CatalogError> {
        let records = self.spotguides.list()?;
        debug!(count = records.len(), "decoding spotguides");
        records.into_iter().map(Spotguide::decode).collect()
    }

    /// Exact match on the full repository name.
    pub fn get(&self, name: &str) -> Result<Spotguide, CatalogError> {
        let record = self
            .spotguides
            .find_by_name(name)?
            .ok_or_else(|| CatalogError::TemplateNotFound { name: name.to_string() })?;
        Spotguide::decode(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_storage::InMemoryStorage;

    fn catalog(entries: &[(&str, &[u8])]) -> SpotguideCatalog {
        let storage = InMemoryStorage::new();
        for (name, raw) in entries {
            storage.upsert(name, raw).unwrap();
        }
        SpotguideCatalog::new(Arc::new(storage))
    }

    #[test]
    fn get_decodes_manifest() {
        let catalog = catalog(&[("banzaicloud/spotguide-a", b"name: A\ntags: [x]\nresources:\n  sumCpu: 2\n")]);
        let sg = catalog.get("banzaicloud/spotguide-a").unwrap();
        assert_eq!(sg.manifest.name, "A");
        assert_eq!(sg.manifest.resources.cpu, 2);
        assert_eq!(sg.record.name, "banzaicloud/spotguide-a");
    }

    #[test]
    fn get_unknown_is_template_not_found() {
        let catalog = catalog(&[("banzaicloud/spotguide-a", b"name: A")]);
        let err = catalog.get("banzaicloud/spotguide-b").unwrap_err();
        assert!(matches!(err, CatalogError::TemplateNotFound { ref name } if name == "banzaicloud/spotguide-b"));
        // lookup is exact
        assert!(catalog.get("spotguide-a").is_err());
    }

    #[test]
    fn list_fails_on_malformed_manifest() {
        let catalog = catalog(&[("banzaicloud/ok", b"name: ok"), ("banzaicloud/bad", b"tags: {a: [")]);
        let err = catalog.list().unwrap_err();
        assert!(matches!(err, CatalogError::MalformedManifest { ref name, .. } if name == "banzaicloud/bad"));
    }

    #[test]
    fn serializes_manifest_under_spotguide_key() {
        let catalog = catalog(&[("banzaicloud/spotguide-a", b"name: A")]);
        let sg = catalog.get("banzaicloud/spotguide-a").unwrap();
        let json = serde_yaml::to_value(&sg).unwrap();
        assert_eq!(json["name"], serde_yaml::Value::from("banzaicloud/spotguide-a"));
        assert_eq!(json["spotguide"]["name"], serde_yaml::Value::from("A"));
    }
}
