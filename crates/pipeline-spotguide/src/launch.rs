use std::fmt;
use std::sync::Arc;

use pipeline_core::{LaunchRequest, OrganizationId, SecretId, SPOTGUIDE_BRANCH_REF};
use pipeline_hosting::{CiHost, HostingError, NewCommit, NewFile, NewRepository, Repository, RepositoryHost};
use pipeline_storage::{SecretStore, SpotguideRepository};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::catalog::{Spotguide, SpotguideCatalog};
use crate::content::ContentMaterializer;
use crate::error::{CatalogError, CiStep, LaunchError, RepositoryStep};

const REPOSITORY_DESCRIPTION: &str = "Spotguide by BanzaiCloud";
const README_PATH: &str = "README.md";
const README_CONTENT: &[u8] = b"# Say hello to Spotguides!";
const README_MESSAGE: &str = "initial import";
const COMMIT_MESSAGE: &str = "adding spotguide structure";

/// Who is launching: the organization secrets are stored under and the
/// hosting login of the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchContext {
    pub organization_id: OrganizationId,
    pub user_login: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LaunchState {
    Start,
    SecretsCreated,
    RepositoryCreated,
    CIEnabled,
    Failed,
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LaunchState::Start => "start",
            LaunchState::SecretsCreated => "secrets_created",
            LaunchState::RepositoryCreated => "repository_created",
            LaunchState::CIEnabled => "ci_enabled",
            LaunchState::Failed => "failed",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LaunchOutcome {
    /// Correlation id carried by every log line of the launch.
    pub launch_id: String,
    /// `organization/name` of the created repository.
    pub repository: String,
    pub secrets: Vec<SecretId>,
    /// Commit the branch was advanced to.
    pub commit_sha: String,
}

/// Runs a launch: secrets, then the repository, then CI.
///
/// Steps run strictly in order and the first failure ends the launch. Nothing
/// is rolled back: secrets stored before a later failure stay stored, and a
/// created repository stays on the hosting service.
pub struct SpotguideLauncher {
    catalog: SpotguideCatalog,
    secrets: Arc<dyn SecretStore>,
    host: Arc<dyn RepositoryHost>,
    ci: Arc<dyn CiHost>,
    materializer: ContentMaterializer,
}

impl SpotguideLauncher {
    pub fn new(
        spotguides: Arc<dyn SpotguideRepository>,
        secrets: Arc<dyn SecretStore>,
        host: Arc<dyn RepositoryHost>,
        ci: Arc<dyn CiHost>,
    ) -> Self {
        Self {
            catalog: SpotguideCatalog::new(spotguides),
            secrets,
            materializer: ContentMaterializer::new(host.clone()),
            host,
            ci,
        }
    }

    pub fn launch(&self, ctx: &LaunchContext, request: &LaunchRequest) -> Result<LaunchOutcome, LaunchError> {
        let launch_id = Uuid::new_v4();
        let repository = request.repo_full_name();
        info!(
            launch_id = %launch_id,
            spotguide = %request.spotguide_name,
            repository = %repository,
            organization = %ctx.organization_id,
            state = %LaunchState::Start,
            "launching spotguide"
        );

        let result = self.run(ctx, request, launch_id);
        if let Err(e) = &result {
            error!(launch_id = %launch_id, repository = %repository, state = %LaunchState::Failed, error = %e, "spotguide launch failed");
        }
        result
    }

    fn run(&self, ctx: &LaunchContext, request: &LaunchRequest, launch_id: Uuid) -> Result<LaunchOutcome, LaunchError> {
        let repository = request.repo_full_name();
        let template = self.resolve(&request.spotguide_name)?;

        let secrets = self.create_secrets(ctx, request)?;
        info!(launch_id = %launch_id, repository = %repository, secrets = secrets.len(), state = %LaunchState::SecretsCreated, "created secrets for spotguide");

        let commit_sha = self.create_repository(ctx, request, &template)?;
        info!(launch_id = %launch_id, repository = %repository, commit = %commit_sha, state = %LaunchState::RepositoryCreated, "created spotguide repository");

        self.enable_ci(request)?;
        info!(launch_id = %launch_id, repository = %repository, state = %LaunchState::CIEnabled, "enabled CI for spotguide");

        Ok(LaunchOutcome { launch_id: launch_id.to_string(), repository, secrets, commit_sha })
    }

    fn resolve(&self, name: &str) -> Result<Spotguide, LaunchError> {
        self.catalog.get(name).map_err(|source| match source {
            CatalogError::TemplateNotFound { name } => LaunchError::TemplateNotFound { name },
            source => LaunchError::Catalog { name: name.to_string(), source },
        })
    }

    fn create_secrets(&self, ctx: &LaunchContext, request: &LaunchRequest) -> Result<Vec<SecretId>, LaunchError> {
        let repo_tag = request.repo_tag();
        let mut created = Vec::with_capacity(request.secrets.len());
        for secret in &request.secrets {
            let mut secret = secret.clone();
            secret.tags.push(repo_tag.clone());
            let id = self
                .secrets
                .store(ctx.organization_id, &secret)
                .map_err(|source| LaunchError::SecretCreationFailed { secret: secret.name.clone(), source })?;
            created.push(id);
        }
        Ok(created)
    }

    /// Returns the SHA of the spotguide commit the branch now points at.
    fn create_repository(&self, ctx: &LaunchContext, request: &LaunchRequest, template: &Spotguide) -> Result<String, LaunchError> {
        let owner = request.repo_organization.as_str();
        let name = request.repo_name.as_str();
        let failed = |step: RepositoryStep| {
            let repository = request.repo_full_name();
            move |e: HostingError| LaunchError::RepositoryCreationFailed { repository, step, source: Box::new(e) }
        };

        // repositories owned by the user itself go through the user endpoint
        let org = if request.repo_organization == ctx.user_login { None } else { Some(owner) };
        let new = NewRepository { name: name.to_string(), description: REPOSITORY_DESCRIPTION.to_string(), private: false };
        let created = self.host.create_repository(org, &new).map_err(failed(RepositoryStep::CreateRepository))?;
        let branch = branch_ref(&created);

        // the git data API needs a first commit to build on
        let readme = NewFile { path: README_PATH.to_string(), message: README_MESSAGE.to_string(), content: README_CONTENT.to_vec() };
        let seed = self.host.create_file(owner, name, &readme).map_err(failed(RepositoryStep::SeedReadme))?;

        let entries = self
            .materializer
            .materialize(&template.record, &request.distinct_secret_names())
            .map_err(|e| LaunchError::RepositoryCreationFailed {
                repository: request.repo_full_name(),
                step: RepositoryStep::MaterializeContent,
                source: Box::new(e),
            })?;

        let tree = self
            .host
            .create_tree(owner, name, &seed.tree_sha, &entries)
            .map_err(failed(RepositoryStep::CreateTree))?;

        let commit = NewCommit { message: COMMIT_MESSAGE.to_string(), tree_sha: tree, parents: vec![seed.commit_sha] };
        let commit = self.host.create_commit(owner, name, &commit).map_err(failed(RepositoryStep::CreateCommit))?;

        self.host
            .get_ref(owner, name, &branch)
            .map_err(failed(RepositoryStep::GetRef))?;
        self.host
            .update_ref(owner, name, &branch, &commit.sha, false)
            .map_err(failed(RepositoryStep::UpdateRef))?;
        Ok(commit.sha)
    }

    fn enable_ci(&self, request: &LaunchRequest) -> Result<(), LaunchError> {
        let failed = |step: CiStep| {
            let repository = request.repo_full_name();
            move |source: HostingError| LaunchError::CIEnableFailed { repository, step, source }
        };
        self.ci.sync_repositories().map_err(failed(CiStep::SyncRepositories))?;
        self.ci
            .activate_repository(&request.repo_organization, &request.repo_name)
            .map_err(failed(CiStep::ActivateRepository))?;
        Ok(())
    }
}

/// Reference of the branch a new repository starts on, `heads/<default branch>`.
fn branch_ref(repository: &Repository) -> String {
    if repository.default_branch.is_empty() {
        SPOTGUIDE_BRANCH_REF.to_string()
    } else {
        format!("heads/{}", repository.default_branch)
    }
}
