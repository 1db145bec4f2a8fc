//! GitHub REST v3 request and response bodies.

use pipeline_hosting::{Commit, Reference, Release, Repository};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub(crate) struct Owner {
    pub login: String,
}

#[derive(Deserialize)]
pub(crate) struct RepositoryBody {
    pub name: String,
    pub full_name: String,
    pub owner: Owner,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
}

impl From<RepositoryBody> for Repository {
    fn from(r: RepositoryBody) -> Self {
        Repository {
            name: r.name,
            full_name: r.full_name,
            owner_login: r.owner.login,
            topics: r.topics,
            default_branch: r.default_branch.unwrap_or_else(|| "master".to_string()),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct ReleaseBody {
    pub tag_name: String,
    #[serde(default)]
    pub zipball_url: Option<String>,
}

impl From<ReleaseBody> for Release {
    fn from(r: ReleaseBody) -> Self {
        Release { tag_name: r.tag_name, zipball_url: r.zipball_url.unwrap_or_default() }
    }
}

#[derive(Serialize)]
pub(crate) struct CreateRepositoryBody<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub private: bool,
    pub auto_init: bool,
}

#[derive(Serialize)]
pub(crate) struct PutContentsBody<'a> {
    pub message: &'a str,
    /// Base64 of the file bytes.
    pub content: String,
}

#[derive(Deserialize)]
pub(crate) struct Sha {
    pub sha: String,
}

#[derive(Deserialize)]
pub(crate) struct PutContentsResponse {
    pub content: Sha,
    pub commit: CommitBody,
}

#[derive(Serialize)]
pub(crate) struct CreateBlobBody {
    pub content: String,
    pub encoding: &'static str,
}

/// Tree item carrying either inline text or a blob reference.
#[derive(Debug, PartialEq, Serialize)]
pub(crate) struct TreeItem<'a> {
    pub path: &'a str,
    pub mode: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct CreateTreeBody<'a> {
    pub base_tree: &'a str,
    pub tree: Vec<TreeItem<'a>>,
}

#[derive(Serialize)]
pub(crate) struct CreateCommitBody<'a> {
    pub message: &'a str,
    pub tree: &'a str,
    pub parents: &'a [String],
}

#[derive(Deserialize)]
pub(crate) struct CommitBody {
    pub sha: String,
    pub tree: Sha,
    #[serde(default)]
    pub parents: Vec<Sha>,
}

impl From<CommitBody> for Commit {
    fn from(c: CommitBody) -> Self {
        Commit {
            sha: c.sha,
            tree_sha: c.tree.sha,
            parents: c.parents.into_iter().map(|p| p.sha).collect(),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct ReferenceBody {
    #[serde(rename = "ref")]
    pub name: String,
    pub object: Sha,
}

impl From<ReferenceBody> for Reference {
    fn from(r: ReferenceBody) -> Self {
        Reference { name: r.name, sha: r.object.sha }
    }
}

#[derive(Serialize)]
pub(crate) struct UpdateReferenceBody<'a> {
    pub sha: &'a str,
    pub force: bool,
}

#[derive(Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: String,
}
