//! In-memory hosting and CI services for tests and offline runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use pipeline_core::TreeEntry;

use crate::error::{HostingError, Result};
use crate::types::{
    CiHost, CiRepository, Commit, CreatedFile, ListOptions, NewCommit, NewFile, NewRepository, Page, Reference,
    Release, Repository, RepositoryHost,
};

type Tree = BTreeMap<String, Vec<u8>>;

#[derive(Default)]
struct MemoryRepo {
    repository: Repository,
    releases: Vec<Release>,
    trees: HashMap<String, Tree>,
    commits: HashMap<String, Commit>,
    /// Fully qualified name -> commit sha.
    refs: BTreeMap<String, String>,
}

impl MemoryRepo {
    fn head_tree(&self) -> Option<&Tree> {
        let sha = self.refs.get(&format!("refs/heads/{}", self.repository.default_branch))?;
        let commit = self.commits.get(sha)?;
        self.trees.get(&commit.tree_sha)
    }

    fn descends_from(&self, sha: &str, ancestor: &str) -> bool {
        let mut pending = vec![sha.to_string()];
        let mut seen = BTreeSet::new();
        while let Some(current) = pending.pop() {
            if current == ancestor {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&current) {
                pending.extend(commit.parents.iter().cloned());
            }
        }
        false
    }
}

#[derive(Default)]
struct HostState {
    user_login: String,
    /// Default branch given to repositories created from now on.
    default_branch: String,
    /// Insertion order is the listing order.
    repos: Vec<MemoryRepo>,
    archives: HashMap<String, Vec<u8>>,
    failing: BTreeSet<&'static str>,
    next_sha: u64,
}

impl HostState {
    fn sha(&mut self) -> String {
        self.next_sha += 1;
        format!("{:040x}", self.next_sha)
    }

    fn check(&self, operation: &'static str, key: &str) -> Result<()> {
        if self.failing.contains(operation) {
            return Err(HostingError::Api {
                method: "MEMORY".to_string(),
                url: format!("{operation}/{key}"),
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn repo(&self, owner: &str, repo: &str) -> Result<&MemoryRepo> {
        let full_name = format!("{owner}/{repo}");
        self.repos
            .iter()
            .find(|r| r.repository.full_name == full_name)
            .ok_or_else(|| HostingError::not_found("repository", full_name))
    }

    fn repo_mut(&mut self, owner: &str, repo: &str) -> Result<&mut MemoryRepo> {
        let full_name = format!("{owner}/{repo}");
        self.repos
            .iter_mut()
            .find(|r| r.repository.full_name == full_name)
            .ok_or_else(|| HostingError::not_found("repository", full_name))
    }
}

/// Git-hosting service kept in memory, with a minimal object model (trees,
/// commits, refs) so a launch can be inspected afterwards.
#[derive(Default)]
pub struct MemoryHost {
    inner: Mutex<HostState>,
}

impl MemoryHost {
    /// `user_login` is the account repositories are created under when no organization is given.
    pub fn new(user_login: impl Into<String>) -> Self {
        let host = Self::default();
        {
            let mut state = host.inner.lock().unwrap();
            state.user_login = user_login.into();
            state.default_branch = "master".to_string();
        }
        host
    }

    /// Repositories added or created after this call start on `branch`.
    pub fn set_default_branch(&self, branch: &str) {
        self.inner.lock().unwrap().default_branch = branch.to_string();
    }

    /// Seeds a repository whose default branch holds `files`.
    pub fn add_repository(&self, full_name: &str, topics: &[&str], files: &[(&str, &[u8])]) {
        let mut state = self.inner.lock().unwrap();
        let (owner, name) = full_name.split_once('/').unwrap_or(("", full_name));
        let mut repo = MemoryRepo {
            repository: Repository {
                name: name.to_string(),
                full_name: full_name.to_string(),
                owner_login: owner.to_string(),
                topics: topics.iter().map(|t| t.to_string()).collect(),
                default_branch: state.default_branch.clone(),
            },
            ..Default::default()
        };
        if !files.is_empty() {
            let tree: Tree = files.iter().map(|(p, c)| (p.to_string(), c.to_vec())).collect();
            let tree_sha = state.sha();
            let commit_sha = state.sha();
            repo.trees.insert(tree_sha.clone(), tree);
            repo.commits.insert(
                commit_sha.clone(),
                Commit { sha: commit_sha.clone(), tree_sha, parents: vec![] },
            );
            repo.refs.insert(format!("refs/heads/{}", repo.repository.default_branch), commit_sha);
        }
        state.repos.push(repo);
    }

    /// Publishes a release of `full_name` whose zipball is `archive`.
    pub fn add_release(&self, full_name: &str, tag: &str, archive: Vec<u8>) {
        let mut state = self.inner.lock().unwrap();
        let url = format!("memory://{full_name}/zipball/{tag}");
        state.archives.insert(url.clone(), archive);
        if let Some(repo) = state.repos.iter_mut().find(|r| r.repository.full_name == full_name) {
            repo.releases.push(Release { tag_name: tag.to_string(), zipball_url: url });
        }
    }

    /// Makes every later call of `operation` (a [`RepositoryHost`] method name) fail.
    pub fn fail_on(&self, operation: &'static str) {
        self.inner.lock().unwrap().failing.insert(operation);
    }

    pub fn repository(&self, full_name: &str) -> Option<Repository> {
        let state = self.inner.lock().unwrap();
        state
            .repos
            .iter()
            .find(|r| r.repository.full_name == full_name)
            .map(|r| r.repository.clone())
    }

    pub fn repository_names(&self) -> Vec<String> {
        let state = self.inner.lock().unwrap();
        state.repos.iter().map(|r| r.repository.full_name.clone()).collect()
    }

    /// Files on the default branch head.
    pub fn head_files(&self, full_name: &str) -> Option<BTreeMap<String, Vec<u8>>> {
        let state = self.inner.lock().unwrap();
        let (owner, repo) = full_name.split_once('/')?;
        let files = state.repo(owner, repo).ok()?.head_tree().cloned();
        files
    }

    /// Commit the default branch points at.
    pub fn head_commit(&self, full_name: &str) -> Option<Commit> {
        let state = self.inner.lock().unwrap();
        let (owner, repo) = full_name.split_once('/')?;
        let repo = state.repo(owner, repo).ok()?;
        let sha = repo.refs.get(&format!("refs/heads/{}", repo.repository.default_branch))?;
        repo.commits.get(sha).cloned()
    }
}

impl RepositoryHost for MemoryHost {
    fn list_org_repositories(&self, org: &str, opts: ListOptions) -> Result<Page<Repository>> {
        let state = self.inner.lock().unwrap();
        state.check("list_org_repositories", org)?;
        let all: Vec<&Repository> = state
            .repos
            .iter()
            .map(|r| &r.repository)
            .filter(|r| r.owner_login == org)
            .collect();
        let per_page = opts.per_page.max(1) as usize;
        let start = (opts.page.max(1) as usize - 1) * per_page;
        let end = (start + per_page).min(all.len());
        let items = all.get(start..end).unwrap_or_default().iter().map(|r| (*r).clone()).collect();
        let next_page = if end < all.len() { Some(opts.page + 1) } else { None };
        Ok(Page { items, next_page })
    }

    fn download_contents(&self, owner: &str, repo: &str, path: &str) -> Result<Vec<u8>> {
        let state = self.inner.lock().unwrap();
        state.check("download_contents", path)?;
        state
            .repo(owner, repo)?
            .head_tree()
            .and_then(|t| t.get(path))
            .cloned()
            .ok_or_else(|| HostingError::not_found("file", format!("{owner}/{repo}/{path}")))
    }

    fn release_by_tag(&self, owner: &str, repo: &str, tag: &str) -> Result<Release> {
        let state = self.inner.lock().unwrap();
        state.check("release_by_tag", tag)?;
        state
            .repo(owner, repo)?
            .releases
            .iter()
            .find(|r| r.tag_name == tag)
            .cloned()
            .ok_or_else(|| HostingError::not_found("release", format!("{owner}/{repo}@{tag}")))
    }

    fn download_archive(&self, url: &str) -> Result<Vec<u8>> {
        let state = self.inner.lock().unwrap();
        state.check("download_archive", url)?;
        state
            .archives
            .get(url)
            .cloned()
            .ok_or_else(|| HostingError::not_found("archive", url))
    }

    fn create_repository(&self, org: Option<&str>, repo: &NewRepository) -> Result<Repository> {
        let mut state = self.inner.lock().unwrap();
        state.check("create_repository", &repo.name)?;
        let owner = org.map(str::to_string).unwrap_or_else(|| state.user_login.clone());
        let full_name = format!("{owner}/{}", repo.name);
        if state.repos.iter().any(|r| r.repository.full_name == full_name) {
            return Err(HostingError::Api {
                method: "POST".to_string(),
                url: format!("memory://repos/{full_name}"),
                status: 422,
                message: "name already exists on this account".to_string(),
            });
        }
        let repository = Repository {
            name: repo.name.clone(),
            full_name,
            owner_login: owner,
            topics: vec![],
            default_branch: state.default_branch.clone(),
        };
        state.repos.push(MemoryRepo { repository: repository.clone(), ..Default::default() });
        Ok(repository)
    }

    fn create_file(&self, owner: &str, repo: &str, file: &NewFile) -> Result<CreatedFile> {
        let mut state = self.inner.lock().unwrap();
        state.check("create_file", &file.path)?;
        state.repo(owner, repo)?;
        let content_sha = state.sha();
        let tree_sha = state.sha();
        let commit_sha = state.sha();

        let target = state.repo_mut(owner, repo)?;
        let head_ref = format!("refs/heads/{}", target.repository.default_branch);
        let parent = target.refs.get(&head_ref).cloned();
        let mut tree = target.head_tree().cloned().unwrap_or_default();
        tree.insert(file.path.clone(), file.content.clone());
        target.trees.insert(tree_sha.clone(), tree);
        target.commits.insert(
            commit_sha.clone(),
            Commit { sha: commit_sha.clone(), tree_sha: tree_sha.clone(), parents: parent.into_iter().collect() },
        );
        target.refs.insert(head_ref, commit_sha.clone());
        Ok(CreatedFile { content_sha, commit_sha, tree_sha })
    }

    fn create_tree(&self, owner: &str, repo: &str, base_tree: &str, entries: &[TreeEntry]) -> Result<String> {
        let mut state = self.inner.lock().unwrap();
        state.check("create_tree", base_tree)?;
        let mut tree = state
            .repo(owner, repo)?
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| HostingError::not_found("tree", base_tree))?;
        for entry in entries {
            tree.insert(entry.path.clone(), entry.content.clone());
        }
        let sha = state.sha();
        state.repo_mut(owner, repo)?.trees.insert(sha.clone(), tree);
        Ok(sha)
    }

    fn create_commit(&self, owner: &str, repo: &str, commit: &NewCommit) -> Result<Commit> {
        let mut state = self.inner.lock().unwrap();
        state.check("create_commit", &commit.message)?;
        {
            let target = state.repo(owner, repo)?;
            if !target.trees.contains_key(&commit.tree_sha) {
                return Err(HostingError::not_found("tree", commit.tree_sha.clone()));
            }
            if let Some(missing) = commit.parents.iter().find(|p| !target.commits.contains_key(*p)) {
                return Err(HostingError::not_found("commit", missing.clone()));
            }
        }
        let created = Commit {
            sha: state.sha(),
            tree_sha: commit.tree_sha.clone(),
            parents: commit.parents.clone(),
        };
        state.repo_mut(owner, repo)?.commits.insert(created.sha.clone(), created.clone());
        Ok(created)
    }

    fn get_ref(&self, owner: &str, repo: &str, reference: &str) -> Result<Reference> {
        let state = self.inner.lock().unwrap();
        state.check("get_ref", reference)?;
        let name = format!("refs/{reference}");
        let sha = state
            .repo(owner, repo)?
            .refs
            .get(&name)
            .cloned()
            .ok_or_else(|| HostingError::not_found("reference", format!("{owner}/{repo}@{name}")))?;
        Ok(Reference { name, sha })
    }

    fn update_ref(&self, owner: &str, repo: &str, reference: &str, sha: &str, force: bool) -> Result<Reference> {
        let mut state = self.inner.lock().unwrap();
        state.check("update_ref", reference)?;
        let name = format!("refs/{reference}");
        let target = state.repo_mut(owner, repo)?;
        if !target.commits.contains_key(sha) {
            return Err(HostingError::not_found("commit", sha));
        }
        let current = target
            .refs
            .get(&name)
            .cloned()
            .ok_or_else(|| HostingError::not_found("reference", format!("{owner}/{repo}@{name}")))?;
        if !force && !target.descends_from(sha, &current) {
            return Err(HostingError::Api {
                method: "PATCH".to_string(),
                url: format!("memory://repos/{owner}/{repo}/git/{name}"),
                status: 422,
                message: "Update is not a fast forward".to_string(),
            });
        }
        target.refs.insert(name.clone(), sha.to_string());
        Ok(Reference { name, sha: sha.to_string() })
    }
}

#[derive(Default)]
struct CiState {
    repos: Vec<CiRepository>,
    failing: BTreeSet<&'static str>,
}

/// CI service kept in memory. A sync discovers every repository of the backing [`MemoryHost`].
pub struct MemoryCi {
    host: Arc<MemoryHost>,
    inner: Mutex<CiState>,
}

impl MemoryCi {
    pub fn new(host: Arc<MemoryHost>) -> Self {
        Self { host, inner: Mutex::new(CiState::default()) }
    }

    /// Makes every later call of `operation` (a [`CiHost`] method name) fail.
    pub fn fail_on(&self, operation: &'static str) {
        self.inner.lock().unwrap().failing.insert(operation);
    }

    pub fn is_active(&self, full_name: &str) -> bool {
        let state = self.inner.lock().unwrap();
        state.repos.iter().any(|r| r.active && r.full_name() == full_name)
    }

    fn check(state: &CiState, operation: &'static str, key: &str) -> Result<()> {
        if state.failing.contains(operation) {
            return Err(HostingError::Api {
                method: "MEMORY".to_string(),
                url: format!("{operation}/{key}"),
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl CiHost for MemoryCi {
    fn sync_repositories(&self) -> Result<Vec<CiRepository>> {
        let upstream = self.host.repository_names();
        let mut state = self.inner.lock().unwrap();
        Self::check(&state, "sync_repositories", "")?;
        for full_name in upstream {
            let Some((owner, name)) = full_name.split_once('/') else { continue };
            if !state.repos.iter().any(|r| r.owner == owner && r.name == name) {
                state.repos.push(CiRepository { owner: owner.to_string(), name: name.to_string(), active: false });
            }
        }
        Ok(state.repos.clone())
    }

    fn activate_repository(&self, owner: &str, name: &str) -> Result<CiRepository> {
        let mut state = self.inner.lock().unwrap();
        Self::check(&state, "activate_repository", name)?;
        let repo = state
            .repos
            .iter_mut()
            .find(|r| r.owner == owner && r.name == name)
            .ok_or_else(|| HostingError::not_found("ci repository", format!("{owner}/{name}")))?;
        repo.active = true;
        Ok(repo.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::org_repositories;

    #[test]
    fn lists_org_repositories_in_pages() {
        let host = MemoryHost::new("me");
        for i in 0..5 {
            host.add_repository(&format!("banzaicloud/r{i}"), &[], &[]);
        }
        host.add_repository("other/x", &[], &[]);

        let pages: Vec<Vec<Repository>> = org_repositories(&host, "banzaicloud", 2).collect::<Result<_>>().unwrap();
        assert_eq!(pages.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);
    }

    #[test]
    fn created_repositories_start_on_configured_branch() {
        let host = MemoryHost::new("me");
        host.set_default_branch("main");
        let new = NewRepository { name: "proj".into(), description: String::new(), private: false };
        let created = host.create_repository(Some("acme"), &new).unwrap();
        assert_eq!(created.default_branch, "main");

        let file = NewFile { path: "README.md".into(), message: "init".into(), content: b"hi".to_vec() };
        let seed = host.create_file("acme", "proj", &file).unwrap();
        assert_eq!(host.get_ref("acme", "proj", "heads/main").unwrap().sha, seed.commit_sha);
        assert!(host.get_ref("acme", "proj", "heads/master").unwrap_err().is_not_found());
    }

    #[test]
    fn creates_repository_under_user_without_org() {
        let host = MemoryHost::new("me");
        let new = NewRepository { name: "proj".into(), description: String::new(), private: false };
        assert_eq!(host.create_repository(None, &new).unwrap().full_name, "me/proj");
        assert_eq!(host.create_repository(Some("acme"), &new).unwrap().full_name, "acme/proj");
        assert_eq!(host.create_repository(Some("acme"), &new).unwrap_err().status(), Some(422));
    }

    #[test]
    fn commits_and_fast_forwards() {
        let host = MemoryHost::new("me");
        let new = NewRepository { name: "proj".into(), description: String::new(), private: false };
        host.create_repository(Some("acme"), &new).unwrap();
        let seed = host
            .create_file("acme", "proj", &NewFile { path: "README.md".into(), message: "init".into(), content: b"hi".to_vec() })
            .unwrap();

        let tree = host
            .create_tree("acme", "proj", &seed.tree_sha, &[TreeEntry::blob("a.txt", b"a".to_vec())])
            .unwrap();
        let commit = host
            .create_commit("acme", "proj", &NewCommit { message: "m".into(), tree_sha: tree, parents: vec![seed.commit_sha.clone()] })
            .unwrap();
        assert_eq!(host.get_ref("acme", "proj", "heads/master").unwrap().sha, seed.commit_sha);

        // an unrelated commit is not a fast-forward
        let orphan = host
            .create_commit("acme", "proj", &NewCommit { message: "o".into(), tree_sha: seed.tree_sha.clone(), parents: vec![] })
            .unwrap();
        host.update_ref("acme", "proj", "heads/master", &commit.sha, false).unwrap();
        assert!(host.update_ref("acme", "proj", "heads/master", &orphan.sha, false).is_err());

        let files = host.head_files("acme/proj").unwrap();
        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["README.md", "a.txt"]);
    }

    #[test]
    fn ci_activation_requires_sync() {
        let host = Arc::new(MemoryHost::new("me"));
        host.add_repository("acme/proj", &[], &[]);
        let ci = MemoryCi::new(host);

        assert!(ci.activate_repository("acme", "proj").unwrap_err().is_not_found());
        ci.sync_repositories().unwrap();
        assert!(ci.activate_repository("acme", "proj").unwrap().active);
        assert!(ci.is_active("acme/proj"));
    }
}
