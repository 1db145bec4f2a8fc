use std::time::Duration;

use pipeline_hosting::{CiHost, CiRepository, HostingError, Result};
use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct DroneSettings {
    /// Server root, e.g. `https://drone.example.com`.
    pub url: String,
    pub token: String,
    pub timeout: Duration,
}

/// Drone repository; older servers call the owner `owner`, newer ones `namespace`.
#[derive(Deserialize)]
struct RepoBody {
    #[serde(alias = "namespace")]
    owner: String,
    name: String,
    #[serde(default)]
    active: bool,
}

impl From<RepoBody> for CiRepository {
    fn from(r: RepoBody) -> Self {
        CiRepository { owner: r.owner, name: r.name, active: r.active }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Blocking client for the two Drone calls the launch flow needs.
#[derive(Clone, Debug)]
pub struct DroneClient {
    http: Client,
    url: String,
    token: String,
}

impl DroneClient {
    pub fn new(settings: DroneSettings) -> reqwest::Result<Self> {
        let http = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { http, url: settings.url.trim_end_matches('/').to_string(), token: settings.token })
    }

    fn send(&self, entity: &'static str, method: Method, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.url, path);
        debug!(method = %method, url = %url, "drone request");
        let mut req = self.http.request(method.clone(), &url).header(ACCEPT, "application/json");
        if !self.token.is_empty() {
            req = req.bearer_auth(&self.token);
        }
        let resp = req.send().map_err(|e| HostingError::Transport {
            method: method.to_string(),
            url: url.clone(),
            source: Box::new(e),
        })?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(HostingError::not_found(entity, url));
        }
        let text = resp.text().unwrap_or_default();
        Err(HostingError::Api { method: method.to_string(), url, status: status.as_u16(), message: error_message(&text) })
    }
}

impl CiHost for DroneClient {
    /// `all=true` lists inactive repositories too; `flush=true` makes Drone re-read them from the forge first.
    fn sync_repositories(&self) -> Result<Vec<CiRepository>> {
        let path = "/api/user/repos?all=true&flush=true";
        let resp = self.send("user", Method::GET, path)?;
        let repos: Vec<RepoBody> = decode(path, resp)?;
        Ok(repos.into_iter().map(CiRepository::from).collect())
    }

    fn activate_repository(&self, owner: &str, name: &str) -> Result<CiRepository> {
        let path = format!("/api/repos/{owner}/{name}");
        let resp = self.send("ci repository", Method::POST, &path)?;
        let repo: RepoBody = decode(&path, resp)?;
        Ok(repo.into())
    }
}

fn decode<T: serde::de::DeserializeOwned>(path: &str, resp: Response) -> Result<T> {
    let bytes = resp.bytes().map_err(|e| HostingError::Decode { url: path.to_string(), source: Box::new(e) })?;
    serde_json::from_slice(&bytes).map_err(|e| HostingError::Decode { url: path.to_string(), source: Box::new(e) })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string())
}
