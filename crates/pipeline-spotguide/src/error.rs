use std::fmt;

use pipeline_hosting::{BoxError, HostingError};
use pipeline_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("spotguide {name} not found")]
    TemplateNotFound { name: String },

    #[error("spotguide {name}: malformed manifest")]
    MalformedManifest {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("could not read spotguides from database")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("failed to list repositories of {organization}")]
    ListRepositories {
        organization: String,
        #[source]
        source: HostingError,
    },

    #[error("failed to download spotguide manifest of {repository}")]
    DownloadManifest {
        repository: String,
        #[source]
        source: HostingError,
    },

    #[error("failed to store spotguide {repository}")]
    Store {
        repository: String,
        #[source]
        source: StorageError,
    },
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("release {tag} of {repository} not found")]
    SourceReleaseNotFound {
        repository: String,
        tag: String,
        #[source]
        source: HostingError,
    },

    #[error("failed to download release archive of {repository}")]
    DownloadFailed {
        repository: String,
        #[source]
        source: HostingError,
    },

    #[error("failed to extract release archive of {repository}: {reason}")]
    ContentExtractionFailure {
        repository: String,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl ContentError {
    pub(crate) fn extraction(repository: &str, reason: impl Into<String>) -> Self {
        Self::ContentExtractionFailure { repository: repository.to_string(), reason: reason.into(), source: None }
    }
}

/// Sub-step of repository creation that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepositoryStep {
    CreateRepository,
    SeedReadme,
    MaterializeContent,
    CreateTree,
    CreateCommit,
    GetRef,
    UpdateRef,
}

impl fmt::Display for RepositoryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RepositoryStep::CreateRepository => "create repository",
            RepositoryStep::SeedReadme => "initialize repository",
            RepositoryStep::MaterializeContent => "prepare spotguide content",
            RepositoryStep::CreateTree => "create git tree",
            RepositoryStep::CreateCommit => "create git commit",
            RepositoryStep::GetRef => "get git ref",
            RepositoryStep::UpdateRef => "update git ref",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CiStep {
    SyncRepositories,
    ActivateRepository,
}

impl fmt::Display for CiStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CiStep::SyncRepositories => "sync repositories",
            CiStep::ActivateRepository => "activate repository",
        })
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("spotguide {name} not found")]
    TemplateNotFound { name: String },

    #[error("failed to load spotguide {name}")]
    Catalog {
        name: String,
        #[source]
        source: CatalogError,
    },

    #[error("failed to create spotguide secret: {secret}")]
    SecretCreationFailed {
        secret: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to create repository {repository}: {step}")]
    RepositoryCreationFailed {
        repository: String,
        step: RepositoryStep,
        #[source]
        source: BoxError,
    },

    #[error("failed to enable CI for {repository}: {step}")]
    CIEnableFailed {
        repository: String,
        step: CiStep,
        #[source]
        source: HostingError,
    },
}
