use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use pipeline_core::TreeEntry;
use pipeline_hosting::{
    Commit, CreatedFile, HostingError, ListOptions, NewCommit, NewFile, NewRepository, Page, Reference, Release,
    Repository, RepositoryHost, Result,
};
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, LINK};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::wire::{
    CommitBody, CreateBlobBody, CreateCommitBody, CreateRepositoryBody, CreateTreeBody, ErrorBody,
    PutContentsBody, PutContentsResponse, ReferenceBody, ReleaseBody, RepositoryBody, Sha, TreeItem,
    UpdateReferenceBody,
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const MEDIA_JSON: &str = "application/vnd.github+json";
const MEDIA_RAW: &str = "application/vnd.github.raw";
const USER_AGENT: &str = concat!("pipeline/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug)]
pub struct GithubSettings {
    pub api_url: String,
    /// Personal access token; empty means anonymous.
    pub token: String,
    pub timeout: Duration,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Blocking GitHub REST v3 client.
#[derive(Clone, Debug)]
pub struct GithubClient {
    http: Client,
    api_url: String,
    token: String,
}

impl GithubClient {
    pub fn new(settings: GithubSettings) -> reqwest::Result<Self> {
        let http = Client::builder().timeout(settings.timeout).user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            token: settings.token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn get(&self, entity: &'static str, url: &str, accept: &str) -> Result<Response> {
        self.send(entity, Method::GET, url, accept, None::<&()>)
    }

    /// A 404 becomes `HostingError::NotFound` for `entity`; any other non-2xx status is an API error.
    fn send<B: Serialize + ?Sized>(
        &self,
        entity: &'static str,
        method: Method,
        url: &str,
        accept: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        debug!(method = %method, url, "github request");
        let mut req = self.http.request(method.clone(), url).header(ACCEPT, accept);
        if !self.token.is_empty() {
            req = req.bearer_auth(&self.token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().map_err(|e| HostingError::Transport {
            method: method.to_string(),
            url: url.to_string(),
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
        Err(HostingError::Api {
            method: method.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
            message: api_message(&text),
        })
    }

    fn create_blob(&self, owner: &str, repo: &str, content: &[u8]) -> Result<String> {
        let url = self.url(&format!("/repos/{owner}/{repo}/git/blobs"));
        let body = CreateBlobBody { content: B64.encode(content), encoding: "base64" };
        let resp = self.send("repository", Method::POST, &url, MEDIA_JSON, Some(&body))?;
        let blob: Sha = decode(&url, resp)?;
        Ok(blob.sha)
    }
}

impl RepositoryHost for GithubClient {
    fn list_org_repositories(&self, org: &str, opts: ListOptions) -> Result<Page<Repository>> {
        let url = self.url(&format!("/orgs/{org}/repos?per_page={}&page={}", opts.per_page, opts.page));
        let resp = self.get("organization", &url, MEDIA_JSON)?;
        let next_page = resp
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_page_from_link);
        let repos: Vec<RepositoryBody> = decode(&url, resp)?;
        Ok(Page { items: repos.into_iter().map(Repository::from).collect(), next_page })
    }

    fn download_contents(&self, owner: &str, repo: &str, path: &str) -> Result<Vec<u8>> {
        let url = self.url(&format!("/repos/{owner}/{repo}/contents/{path}"));
        let resp = self.get("file", &url, MEDIA_RAW)?;
        read_body(&url, resp)
    }

    fn release_by_tag(&self, owner: &str, repo: &str, tag: &str) -> Result<Release> {
        let url = self.url(&format!("/repos/{owner}/{repo}/releases/tags/{tag}"));
        let resp = self.get("release", &url, MEDIA_JSON)?;
        let release: ReleaseBody = decode(&url, resp)?;
        Ok(release.into())
    }

    fn download_archive(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.get("archive", url, "*/*")?;
        read_body(url, resp)
    }

    fn create_repository(&self, org: Option<&str>, repo: &NewRepository) -> Result<Repository> {
        let url = match org {
            Some(org) => self.url(&format!("/orgs/{org}/repos")),
            None => self.url("/user/repos"),
        };
        let body = CreateRepositoryBody {
            name: &repo.name,
            description: &repo.description,
            private: repo.private,
            auto_init: false,
        };
        let resp = self.send("organization", Method::POST, &url, MEDIA_JSON, Some(&body))?;
        let created: RepositoryBody = decode(&url, resp)?;
        Ok(created.into())
    }

    fn create_file(&self, owner: &str, repo: &str, file: &NewFile) -> Result<CreatedFile> {
        let url = self.url(&format!("/repos/{owner}/{repo}/contents/{}", file.path));
        let body = PutContentsBody { message: &file.message, content: B64.encode(&file.content) };
        let resp = self.send("repository", Method::PUT, &url, MEDIA_JSON, Some(&body))?;
        let created: PutContentsResponse = decode(&url, resp)?;
        Ok(CreatedFile {
            content_sha: created.content.sha,
            commit_sha: created.commit.sha,
            tree_sha: created.commit.tree.sha,
        })
    }

    fn create_tree(&self, owner: &str, repo: &str, base_tree: &str, entries: &[TreeEntry]) -> Result<String> {
        // the tree API only takes inline UTF-8 content; anything else goes through a blob
        let mut blobs = Vec::with_capacity(entries.len());
        for entry in entries {
            blobs.push(match entry.text() {
                Some(_) => None,
                None => Some(self.create_blob(owner, repo, &entry.content)?),
            });
        }

        let url = self.url(&format!("/repos/{owner}/{repo}/git/trees"));
        let body = CreateTreeBody {
            base_tree,
            tree: entries.iter().zip(blobs).map(|(e, sha)| tree_item(e, sha)).collect(),
        };
        debug!(repository = %format!("{owner}/{repo}"), entries = entries.len(), "creating tree");
        let resp = self.send("tree", Method::POST, &url, MEDIA_JSON, Some(&body))?;
        let tree: Sha = decode(&url, resp)?;
        Ok(tree.sha)
    }

    fn create_commit(&self, owner: &str, repo: &str, commit: &NewCommit) -> Result<Commit> {
        let url = self.url(&format!("/repos/{owner}/{repo}/git/commits"));
        let body = CreateCommitBody { message: &commit.message, tree: &commit.tree_sha, parents: &commit.parents };
        let resp = self.send("commit", Method::POST, &url, MEDIA_JSON, Some(&body))?;
        let created: CommitBody = decode(&url, resp)?;
        Ok(created.into())
    }

    fn get_ref(&self, owner: &str, repo: &str, reference: &str) -> Result<Reference> {
        let url = self.url(&format!("/repos/{owner}/{repo}/git/ref/{reference}"));
        let resp = self.get("reference", &url, MEDIA_JSON)?;
        let found: ReferenceBody = decode(&url, resp)?;
        Ok(found.into())
    }

    fn update_ref(&self, owner: &str, repo: &str, reference: &str, sha: &str, force: bool) -> Result<Reference> {
        let url = self.url(&format!("/repos/{owner}/{repo}/git/refs/{reference}"));
        let body = UpdateReferenceBody { sha, force };
        let resp = self.send("reference", Method::PATCH, &url, MEDIA_JSON, Some(&body))?;
        let updated: ReferenceBody = decode(&url, resp)?;
        Ok(updated.into())
    }
}

fn read_body(url: &str, resp: Response) -> Result<Vec<u8>> {
    resp.bytes().map(|b| b.to_vec()).map_err(|e| HostingError::Decode {
        url: url.to_string(),
        source: Box::new(e),
    })
}

fn decode<T: DeserializeOwned>(url: &str, resp: Response) -> Result<T> {
    let bytes = read_body(url, resp)?;
    serde_json::from_slice(&bytes).map_err(|e| HostingError::Decode {
        url: url.to_string(),
        source: Box::new(e),
    })
}

/// GitHub error bodies are `{"message": ...}`; fall back to the raw text.
fn api_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string())
}

/// Page number of the `rel="next"` link, if any.
fn next_page_from_link(header: &str) -> Option<u32> {
    header.split(',').find_map(|link| {
        let mut parts = link.split(';');
        let target = parts.next()?.trim().trim_start_matches('<').trim_end_matches('>');
        if !parts.any(|p| p.trim() == r#"rel="next""#) {
            return None;
        }
        let (_, query) = target.split_once('?')?;
        query
            .split('&')
            .filter_map(|kv| kv.split_once('='))
            .find(|(k, _)| *k == "page")
            .and_then(|(_, v)| v.parse().ok())
    })
}

fn tree_item(entry: &TreeEntry, blob_sha: Option<String>) -> TreeItem<'_> {
    TreeItem {
        path: &entry.path,
        mode: &entry.mode,
        kind: &entry.kind,
        content: if blob_sha.is_none() { entry.text() } else { None },
        sha: blob_sha,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_page_comes_from_next_link() {
        let header = r#"<https://api.github.com/organizations/1/repos?per_page=100&page=3>; rel="next", <https://api.github.com/organizations/1/repos?per_page=100&page=7>; rel="last""#;
        assert_eq!(next_page_from_link(header), Some(3));
    }

    #[test]
    fn last_page_has_no_next() {
        let header = r#"<https://api.github.com/organizations/1/repos?per_page=100&page=1>; rel="first", <https://api.github.com/organizations/1/repos?per_page=100&page=6>; rel="prev""#;
        assert_eq!(next_page_from_link(header), None);
        assert_eq!(next_page_from_link(""), None);
    }

    #[test]
    fn per_page_is_not_mistaken_for_page() {
        let header = r#"<https://api.github.com/orgs/x/repos?per_page=100>; rel="next""#;
        assert_eq!(next_page_from_link(header), None);
    }

    #[test]
    fn api_message_prefers_json_message() {
        assert_eq!(api_message(r#"{"message":"Bad credentials","documentation_url":"x"}"#), "Bad credentials");
        assert_eq!(api_message("  gateway timeout \n"), "gateway timeout");
    }

    #[test]
    fn text_entries_are_inlined_and_binary_ones_referenced() {
        let text = TreeEntry::blob("a/b.txt", b"hello".to_vec());
        let item = serde_json::to_value(tree_item(&text, None)).unwrap();
        assert_eq!(
            item,
            serde_json::json!({"path": "a/b.txt", "mode": "100644", "type": "blob", "content": "hello"})
        );

        let binary = TreeEntry::blob("logo.png", vec![0x89, 0x50, 0xff]);
        let item = serde_json::to_value(tree_item(&binary, Some("abc".into()))).unwrap();
        assert_eq!(item, serde_json::json!({"path": "logo.png", "mode": "100644", "type": "blob", "sha": "abc"}));
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = GithubClient::new(GithubSettings {
            api_url: "https://github.example.com/api/v3/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.url("/user/repos"), "https://github.example.com/api/v3/user/repos");
    }
}
