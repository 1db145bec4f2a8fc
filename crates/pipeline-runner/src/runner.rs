use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use pipeline_ci_drone::{DroneClient, DroneSettings};
use pipeline_cluster::{ClusterFactory, ClusterManager};
use pipeline_core::{ClusterRecord, CreateSecretRequest, LaunchRequest, NewClusterRecord, OrganizationId};
use pipeline_hosting::{CiHost, RepositoryHost};
use pipeline_hosting_github::{GithubClient, GithubSettings};
use pipeline_spotguide::{LaunchContext, LaunchOutcome, ScrapeSummary, Scraper, SpotguideCatalog, SpotguideLauncher};
use pipeline_storage::ClusterRepository;
use pipeline_storage_sqlite::SqliteStorage;
use tracing::info;

use crate::Config;

/// Everything a command needs, wired against one repo-local database.
pub struct Runner {
    pub repo_root: PathBuf,
    /// Settings with environment references already expanded.
    pub cfg: Config,
    pub storage: Arc<SqliteStorage>,
    pub clusters: ClusterManager,
    pub catalog: SpotguideCatalog,
    pub scraper: Scraper,
    pub launcher: SpotguideLauncher,
}

impl Runner {
    /// Loads (or writes a default) `.pipeline/pipeline.toml`, opens the
    /// database and connects the GitHub and Drone clients.
    pub fn open(repo_root: PathBuf) -> Result<Self> {
        let cfg = load_or_init_config(&repo_root)?.expanded()?;

        let github = GithubClient::new(GithubSettings {
            api_url: cfg.github.api_url.clone(),
            token: cfg.github.token.clone(),
            timeout: cfg.timeout(),
        })
        .context("build github client")?;
        let drone = DroneClient::new(DroneSettings {
            url: cfg.drone.url.clone(),
            token: cfg.drone.token.clone(),
            timeout: cfg.timeout(),
        })
        .context("build drone client")?;

        Self::with_hosts(repo_root, cfg, Arc::new(github), Arc::new(drone))
    }

    /// Wires the services against explicit hosting backends. `cfg` must
    /// already be expanded.
    pub fn with_hosts(
        repo_root: PathBuf,
        cfg: Config,
        host: Arc<dyn RepositoryHost>,
        ci: Arc<dyn CiHost>,
    ) -> Result<Self> {
        let db_path = cfg.db_path(&repo_root);
        let storage = Arc::new(
            SqliteStorage::open(&db_path).with_context(|| format!("open database {}", db_path.display()))?,
        );

        Ok(Self {
            clusters: ClusterManager::new(storage.clone(), ClusterFactory::new()),
            catalog: SpotguideCatalog::new(storage.clone()),
            scraper: Scraper::new(host.clone(), storage.clone()),
            launcher: SpotguideLauncher::new(storage.clone(), storage.clone(), host, ci),
            repo_root,
            cfg,
            storage,
        })
    }

    pub fn init_repo(repo_root: &Path) -> Result<()> {
        let cfg = load_or_init_config(repo_root)?;
        // create db
        let _ = SqliteStorage::open(&cfg.db_path(repo_root))?;
        Ok(())
    }

    pub fn launch_context(&self, organization_id: OrganizationId) -> LaunchContext {
        LaunchContext { organization_id, user_login: self.cfg.github.user_login.clone() }
    }

    pub fn scrape(&self) -> Result<ScrapeSummary> {
        Ok(self.scraper.scrape()?)
    }

    pub fn launch(&self, organization_id: OrganizationId, request: &LaunchRequest) -> Result<LaunchOutcome> {
        let ctx = self.launch_context(organization_id);
        let outcome = self
            .launcher
            .launch(&ctx, request)
            .with_context(|| format!("launch {} into {}", request.spotguide_name, request.repo_full_name()))?;
        Ok(outcome)
    }

    /// Seeds a cluster row; clusters are otherwise created by provisioning
    /// flows outside this tool.
    pub fn add_cluster(&self, record: NewClusterRecord) -> Result<ClusterRecord> {
        let name = record.name.clone();
        let created = self.storage.create(record).with_context(|| format!("create cluster {name}"))?;
        info!(organization = %created.organization_id, cluster = %created.name, id = %created.id, "added cluster");
        Ok(created)
    }
}

fn load_or_init_config(repo_root: &Path) -> Result<Config> {
    let cfg_path = Config::config_path(repo_root);
    if cfg_path.exists() {
        return Config::load_from(&cfg_path);
    }
    let cfg = Config::default_for_repo();
    cfg.save_to(&cfg_path)?;
    Ok(cfg)
}

/// Parses `NAME=KEY=VALUE` (or a bare `NAME`) into a generic secret request.
/// Repeating a name across arguments is left to the caller to merge.
pub fn parse_secret_arg(arg: &str) -> Result<CreateSecretRequest> {
    let mut parts = arg.splitn(3, '=');
    let name = parts.next().unwrap_or_default();
    if name.is_empty() {
        return Err(anyhow!("secret argument {arg:?} has no name"));
    }
    let secret = CreateSecretRequest::new(name);
    match (parts.next(), parts.next()) {
        (None, _) => Ok(secret),
        (Some(key), Some(value)) if !key.is_empty() => Ok(secret.with_value(key, value)),
        _ => Err(anyhow!("secret argument {arg:?} must look like NAME=KEY=VALUE")),
    }
}

/// Folds repeated names into one request each, keeping first-seen order.
pub fn merge_secret_args(args: &[String]) -> Result<Vec<CreateSecretRequest>> {
    let mut merged: Vec<CreateSecretRequest> = Vec::new();
    for arg in args {
        let secret = parse_secret_arg(arg)?;
        match merged.iter_mut().find(|s| s.name == secret.name) {
            Some(existing) => existing.values.extend(secret.values),
            None => merged.push(secret),
        }
    }
    Ok(merged)
}
