use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use pipeline_hosting_github::DEFAULT_API_URL;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub github: GithubConfig,
    pub drone: DroneConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GithubConfig {
    pub api_url: String,
    /// May reference environment variables, e.g. `${GITHUB_TOKEN:-}`.
    pub token: String,
    /// Login of the launching user; repositories launched into this owner
    /// are created under the user account rather than an organization.
    pub user_login: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DroneConfig {
    pub url: String,
    pub token: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Relative paths resolve against the repo root; `~` is expanded.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: ".pipeline/pipeline.db".to_string() }
    }
}

impl Config {
    pub fn default_for_repo() -> Self {
        Self {
            github: GithubConfig {
                api_url: DEFAULT_API_URL.to_string(),
                token: "${GITHUB_TOKEN:-}".to_string(),
                user_login: "${GITHUB_USER:-}".to_string(),
            },
            drone: DroneConfig {
                url: "${DRONE_SERVER:-http://localhost:8000}".to_string(),
                token: "${DRONE_TOKEN:-}".to_string(),
            },
            http: HttpConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse pipeline.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Copy with every environment reference in the string settings expanded.
    pub fn expanded(&self) -> Result<Self> {
        let mut cfg = self.clone();
        cfg.github.api_url = expand_env("github.api_url", &self.github.api_url)?;
        cfg.github.token = expand_env("github.token", &self.github.token)?;
        cfg.github.user_login = expand_env("github.user_login", &self.github.user_login)?;
        cfg.drone.url = expand_env("drone.url", &self.drone.url)?;
        cfg.drone.token = expand_env("drone.token", &self.drone.token)?;
        Ok(cfg)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn db_path(&self, repo_root: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(&self.storage.path).to_string();
        repo_root.join(expanded)
    }

    pub fn config_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".pipeline").join("pipeline.toml")
    }
}

fn expand_env(key: &str, value: &str) -> Result<String> {
    let expanded = shellexpand::env(value).with_context(|| format!("expand {key}"))?;
    Ok(expanded.into_owned())
}
