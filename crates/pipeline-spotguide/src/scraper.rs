use std::sync::Arc;

use pipeline_core::{SPOTGUIDE_GITHUB_ORGANIZATION, SPOTGUIDE_GITHUB_TOPIC, SPOTGUIDE_LIST_PAGE_SIZE, SPOTGUIDE_YAML_PATH};
use pipeline_hosting::{org_repositories, Repository, RepositoryHost};
use pipeline_storage::{SpotguideRepository, UpsertOutcome};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ScrapeError;

/// What a scrape saw and wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeSummary {
    /// Repositories listed in the organization, spotguides or not.
    pub repositories: usize,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
}

impl ScrapeSummary {
    pub fn spotguides(&self) -> usize {
        self.created.len() + self.updated.len() + self.unchanged.len()
    }
}

/// Mirrors the manifests of the organization's spotguide repositories into the catalog.
pub struct Scraper {
    host: Arc<dyn RepositoryHost>,
    spotguides: Arc<dyn SpotguideRepository>,
    organization: String,
}

impl Scraper {
    pub fn new(host: Arc<dyn RepositoryHost>, spotguides: Arc<dyn SpotguideRepository>) -> Self {
        Self { host, spotguides, organization: SPOTGUIDE_GITHUB_ORGANIZATION.to_string() }
    }

    /// Walks every page of the organization's repositories. The first failing
    /// repository aborts the scrape; rows written before it are kept.
    pub fn scrape(&self) -> Result<ScrapeSummary, ScrapeError> {
        let mut summary = ScrapeSummary::default();
        let pages = org_repositories(self.host.as_ref(), &self.organization, SPOTGUIDE_LIST_PAGE_SIZE);
        for page in pages {
            let repositories = page.map_err(|source| ScrapeError::ListRepositories {
                organization: self.organization.clone(),
                source,
            })?;
            summary.repositories += repositories.len();
            for repository in repositories.iter().filter(|r| r.has_topic(SPOTGUIDE_GITHUB_TOPIC)) {
                self.scrape_repository(repository, &mut summary)?;
            }
        }
        info!(
            organization = %self.organization,
            repositories = summary.repositories,
            created = summary.created.len(),
            updated = summary.updated.len(),
            unchanged = summary.unchanged.len(),
            "scraped spotguides"
        );
        Ok(summary)
    }

    fn scrape_repository(&self, repository: &Repository, summary: &mut ScrapeSummary) -> Result<(), ScrapeError> {
        let name = repository.full_name.clone();
        debug!(repository = %name, "downloading spotguide manifest");
        let raw = self
            .host
            .download_contents(&repository.owner_login, &repository.name, SPOTGUIDE_YAML_PATH)
            .map_err(|source| ScrapeError::DownloadManifest { repository: name.clone(), source })?;

        let outcome = self
            .spotguides
            .upsert(&name, &raw)
            .map_err(|source| ScrapeError::Store { repository: name.clone(), source })?;
        match outcome {
            UpsertOutcome::Created(_) => summary.created.push(name),
            UpsertOutcome::Updated(_) => summary.updated.push(name),
            UpsertOutcome::Unchanged(_) => summary.unchanged.push(name),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_core::MAX_SPOTGUIDE_RAW_BYTES;
    use pipeline_hosting::MemoryHost;
    use pipeline_storage::{InMemoryStorage, StorageError};

    fn setup() -> (Arc<MemoryHost>, Arc<InMemoryStorage>, Scraper) {
        let host = Arc::new(MemoryHost::new("me"));
        let storage = Arc::new(InMemoryStorage::new());
        let scraper = Scraper::new(host.clone(), storage.clone());
        (host, storage, scraper)
    }

    #[test]
    fn only_topic_tagged_repositories_are_stored() {
        let (host, storage, scraper) = setup();
        host.add_repository("banzaicloud/spotguide-a", &["spotguide"], &[(SPOTGUIDE_YAML_PATH, b"name: A")]);
        host.add_repository("banzaicloud/pipeline", &["kubernetes"], &[]);
        host.add_repository("someone/spotguide-b", &["spotguide"], &[(SPOTGUIDE_YAML_PATH, b"name: B")]);

        let summary = scraper.scrape().unwrap();
        assert_eq!(summary.repositories, 2);
        assert_eq!(summary.created, vec!["banzaicloud/spotguide-a"]);

        let stored = storage.find_by_name("banzaicloud/spotguide-a").unwrap().unwrap();
        assert_eq!(stored.spotguide_raw, b"name: A");
    }

    #[test]
    fn follows_every_page() {
        let (host, _storage, scraper) = setup();
        for i in 0..(SPOTGUIDE_LIST_PAGE_SIZE + 5) {
            host.add_repository(&format!("banzaicloud/repo-{i}"), &[], &[]);
        }
        host.add_repository("banzaicloud/spotguide-last", &["spotguide"], &[(SPOTGUIDE_YAML_PATH, b"name: last")]);

        let summary = scraper.scrape().unwrap();
        assert_eq!(summary.repositories, SPOTGUIDE_LIST_PAGE_SIZE as usize + 6);
        assert_eq!(summary.created, vec!["banzaicloud/spotguide-last"]);
    }

    #[test]
    fn missing_manifest_aborts_with_repository_name() {
        let (host, _storage, scraper) = setup();
        host.add_repository("banzaicloud/spotguide-empty", &["spotguide"], &[]);

        let err = scraper.scrape().unwrap_err();
        assert!(matches!(err, ScrapeError::DownloadManifest { ref repository, .. } if repository == "banzaicloud/spotguide-empty"));
    }

    #[test]
    fn oversized_manifest_aborts() {
        let (host, _storage, scraper) = setup();
        let big = vec![b'#'; MAX_SPOTGUIDE_RAW_BYTES + 1];
        host.add_repository("banzaicloud/spotguide-big", &["spotguide"], &[(SPOTGUIDE_YAML_PATH, &big)]);

        let err = scraper.scrape().unwrap_err();
        assert!(matches!(err, ScrapeError::Store { source: StorageError::TooLarge { .. }, .. }));
    }

    #[test]
    fn listing_failure_is_reported() {
        let (host, _storage, scraper) = setup();
        host.fail_on("list_org_repositories");
        assert!(matches!(scraper.scrape().unwrap_err(), ScrapeError::ListRepositories { .. }));
    }
}
