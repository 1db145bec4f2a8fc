use pipeline_core::TreeEntry;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Repository as reported by the hosting service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    /// `owner/name`
    pub full_name: String,
    pub owner_login: String,
    pub topics: Vec<String>,
    pub default_branch: String,
}

impl Repository {
    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }
}

/// Page selector; pages are 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListOptions {
    pub page: u32,
    pub per_page: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` (or `Some(0)`) on the last page.
    pub next_page: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    pub zipball_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewRepository {
    pub name: String,
    pub description: String,
    pub private: bool,
}

/// Single-file commit through the contents API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewFile {
    pub path: String,
    pub message: String,
    pub content: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedFile {
    pub content_sha: String,
    pub commit_sha: String,
    /// Tree of the commit that added the file.
    pub tree_sha: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCommit {
    pub message: String,
    pub tree_sha: String,
    pub parents: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub sha: String,
    pub tree_sha: String,
    pub parents: Vec<String>,
}

/// Git reference; `name` is fully qualified (`refs/heads/master`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub sha: String,
}

/// Repository as known to the CI service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiRepository {
    pub owner: String,
    pub name: String,
    pub active: bool,
}

impl CiRepository {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Source-control hosting operations used by the scraper and the launch flow.
///
/// References are passed without the `refs/` prefix (`heads/master`).
pub trait RepositoryHost: Send + Sync {
    fn list_org_repositories(&self, org: &str, opts: ListOptions) -> Result<Page<Repository>>;

    /// Raw file content from the default branch.
    fn download_contents(&self, owner: &str, repo: &str, path: &str) -> Result<Vec<u8>>;

    /// Fails with `HostingError::NotFound` when no release carries `tag`.
    fn release_by_tag(&self, owner: &str, repo: &str, tag: &str) -> Result<Release>;

    fn download_archive(&self, url: &str) -> Result<Vec<u8>>;

    /// Creates the repository under `org`, or under the authenticated user when `org` is `None`.
    fn create_repository(&self, org: Option<&str>, repo: &NewRepository) -> Result<Repository>;

    fn create_file(&self, owner: &str, repo: &str, file: &NewFile) -> Result<CreatedFile>;

    /// Returns the SHA of a new tree holding `entries` on top of `base_tree`.
    fn create_tree(&self, owner: &str, repo: &str, base_tree: &str, entries: &[TreeEntry]) -> Result<String>;

    fn create_commit(&self, owner: &str, repo: &str, commit: &NewCommit) -> Result<Commit>;

    fn get_ref(&self, owner: &str, repo: &str, reference: &str) -> Result<Reference>;

    /// Points `reference` at `sha`. Without `force` the update must be a fast-forward.
    fn update_ref(&self, owner: &str, repo: &str, reference: &str, sha: &str, force: bool) -> Result<Reference>;
}

/// CI service operations used to enable builds for a new repository.
pub trait CiHost: Send + Sync {
    /// Refreshes the CI service's view of the user's repositories and returns it.
    fn sync_repositories(&self) -> Result<Vec<CiRepository>>;

    fn activate_repository(&self, owner: &str, name: &str) -> Result<CiRepository>;
}
