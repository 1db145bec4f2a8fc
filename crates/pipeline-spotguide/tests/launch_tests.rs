use std::sync::Arc;

use pipeline_core::{
    CreateSecretRequest, LaunchRequest, OrganizationId, PIPELINE_YAML_PATH, SPOTGUIDE_YAML_PATH,
};
use pipeline_hosting::{MemoryCi, MemoryHost};
use pipeline_spotguide::fixtures::publish_template;
use pipeline_spotguide::{CiStep, ContentError, LaunchContext, LaunchError, RepositoryStep, SpotguideLauncher};
use pipeline_storage::{InMemoryStorage, SecretStore, SpotguideRepository};
use pipeline_storage_sqlite::SqliteStorage;
use serde_yaml::Value;
use tempfile::tempdir;

const MANIFEST: &[u8] = b"name: Template A\ndescription: test template\ntags: [go]\n";
const PIPELINE: &[u8] = b"pipeline:\n  build:\n    image: golang:1.11\n    commands: [go build]\n  deploy:\n    image: banzaicloud/ci-pipeline-client\n    secrets: [KUBECONFIG]\n";

struct Env {
    host: Arc<MemoryHost>,
    ci: Arc<MemoryCi>,
    storage: Arc<InMemoryStorage>,
    launcher: SpotguideLauncher,
}

fn env() -> Env {
    let host = Arc::new(MemoryHost::new("jdoe"));
    let ci = Arc::new(MemoryCi::new(host.clone()));
    let storage = Arc::new(InMemoryStorage::new());
    publish_template(
        &host,
        "org/template-a",
        MANIFEST,
        &[("main.go", b"package main\n"), ("a/b.txt", b"nested"), (PIPELINE_YAML_PATH, PIPELINE)],
    )
    .unwrap();
    storage.upsert("org/template-a", MANIFEST).unwrap();
    let launcher = SpotguideLauncher::new(storage.clone(), storage.clone(), host.clone(), ci.clone());
    Env { host, ci, storage, launcher }
}

fn ctx() -> LaunchContext {
    LaunchContext { organization_id: OrganizationId(1), user_login: "jdoe".to_string() }
}

fn request(org: &str, name: &str) -> LaunchRequest {
    LaunchRequest {
        spotguide_name: "org/template-a".to_string(),
        repo_organization: org.to_string(),
        repo_name: name.to_string(),
        secrets: vec![CreateSecretRequest::new("DB_PASS").with_value("password", "s3cr3t")],
    }
}

fn step_secrets(pipeline: &[u8], step: &str) -> Vec<String> {
    let doc: Value = serde_yaml::from_slice(pipeline).unwrap();
    doc["pipeline"][step]["secrets"]
        .as_sequence()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_launch_end_to_end() {
    let env = env();
    let outcome = env.launcher.launch(&ctx(), &request("acme", "proj1")).unwrap();
    assert_eq!(outcome.repository, "acme/proj1");

    let secrets = SecretStore::list(env.storage.as_ref(), OrganizationId(1)).unwrap();
    assert_eq!(secrets.len(), 1);
    assert_eq!(secrets[0].request.name, "DB_PASS");
    assert_eq!(secrets[0].request.tags, vec!["repo:acme/proj1"]);
    assert_eq!(outcome.secrets, vec![secrets[0].id.clone()]);

    let files = env.host.head_files("acme/proj1").unwrap();
    let paths: Vec<&str> = files.keys().map(String::as_str).collect();
    assert_eq!(paths, vec![PIPELINE_YAML_PATH, SPOTGUIDE_YAML_PATH, "README.md", "a/b.txt", "main.go"]);
    assert_eq!(files["README.md"], b"# Say hello to Spotguides!");
    assert_eq!(files["a/b.txt"], b"nested");

    let pipeline = &files[PIPELINE_YAML_PATH];
    assert_eq!(step_secrets(pipeline, "build"), vec!["DB_PASS"]);
    assert_eq!(step_secrets(pipeline, "deploy"), vec!["KUBECONFIG", "DB_PASS"]);

    let head = env.host.head_commit("acme/proj1").unwrap();
    assert_eq!(head.sha, outcome.commit_sha);
    assert_eq!(head.parents.len(), 1);

    assert!(env.ci.is_active("acme/proj1"));
}

#[test]
fn test_repository_failure_keeps_secrets() {
    let env = env();
    env.host.fail_on("create_repository");

    let err = env.launcher.launch(&ctx(), &request("acme", "proj1")).unwrap_err();
    assert!(matches!(
        err,
        LaunchError::RepositoryCreationFailed { step: RepositoryStep::CreateRepository, ref repository, .. } if repository == "acme/proj1"
    ));
    assert_eq!(SecretStore::list(env.storage.as_ref(), OrganizationId(1)).unwrap().len(), 1);
    assert!(env.host.repository("acme/proj1").is_none());
    assert!(!env.ci.is_active("acme/proj1"));
}

#[test]
fn test_failure_after_repository_creation_is_not_rolled_back() {
    let env = env();
    env.host.fail_on("create_tree");

    let err = env.launcher.launch(&ctx(), &request("acme", "proj1")).unwrap_err();
    assert!(matches!(err, LaunchError::RepositoryCreationFailed { step: RepositoryStep::CreateTree, .. }));
    // the seeded repository stays behind
    let files = env.host.head_files("acme/proj1").unwrap();
    assert_eq!(files.keys().collect::<Vec<_>>(), vec!["README.md"]);
}

#[test]
fn test_missing_release_fails_content_step() {
    let env = env();
    env.host.add_repository("org/template-b", &["spotguide"], &[(SPOTGUIDE_YAML_PATH, MANIFEST)]);
    env.storage.upsert("org/template-b", MANIFEST).unwrap();
    let mut req = request("acme", "proj2");
    req.spotguide_name = "org/template-b".to_string();

    let err = env.launcher.launch(&ctx(), &req).unwrap_err();
    assert!(matches!(err, LaunchError::RepositoryCreationFailed { step: RepositoryStep::MaterializeContent, .. }));
    let cause = std::error::Error::source(&err).unwrap();
    assert!(matches!(cause.downcast_ref::<ContentError>(), Some(ContentError::SourceReleaseNotFound { .. })));
}

fn content_cause(err: &LaunchError) -> Option<&ContentError> {
    std::error::Error::source(err)?.downcast_ref::<ContentError>()
}

#[test]
fn test_archive_download_failure_fails_content_step() {
    let env = env();
    env.host.fail_on("download_archive");

    let err = env.launcher.launch(&ctx(), &request("acme", "proj1")).unwrap_err();
    assert!(matches!(err, LaunchError::RepositoryCreationFailed { step: RepositoryStep::MaterializeContent, .. }));
    assert!(matches!(content_cause(&err), Some(ContentError::DownloadFailed { repository, .. }) if repository == "org/template-a"));
}

#[test]
fn test_release_lookup_failure_is_a_download_failure() {
    let env = env();
    env.host.fail_on("release_by_tag");

    let err = env.launcher.launch(&ctx(), &request("acme", "proj1")).unwrap_err();
    assert!(matches!(err, LaunchError::RepositoryCreationFailed { step: RepositoryStep::MaterializeContent, .. }));
    assert!(matches!(content_cause(&err), Some(ContentError::DownloadFailed { .. })));
}

#[test]
fn test_unknown_template_creates_nothing() {
    let env = env();
    let mut req = request("acme", "proj1");
    req.spotguide_name = "org/nope".to_string();

    let err = env.launcher.launch(&ctx(), &req).unwrap_err();
    assert!(matches!(err, LaunchError::TemplateNotFound { ref name } if name == "org/nope"));
    assert!(SecretStore::list(env.storage.as_ref(), OrganizationId(1)).unwrap().is_empty());
    assert!(env.host.repository("acme/proj1").is_none());
}

#[test]
fn test_existing_secret_stops_before_repository() {
    let env = env();
    env.storage.store(OrganizationId(1), &CreateSecretRequest::new("DB_PASS")).unwrap();

    let err = env.launcher.launch(&ctx(), &request("acme", "proj1")).unwrap_err();
    assert!(matches!(err, LaunchError::SecretCreationFailed { ref secret, .. } if secret == "DB_PASS"));
    assert!(env.host.repository("acme/proj1").is_none());
}

#[test]
fn test_ci_failure_is_reported_after_repository() {
    let env = env();
    env.ci.fail_on("activate_repository");

    let err = env.launcher.launch(&ctx(), &request("acme", "proj1")).unwrap_err();
    assert!(matches!(err, LaunchError::CIEnableFailed { .. }));
    assert!(env.host.head_files("acme/proj1").unwrap().contains_key("main.go"));
}

#[test]
fn test_ci_sync_failure_stops_before_activation() {
    let env = env();
    env.ci.fail_on("sync_repositories");

    let err = env.launcher.launch(&ctx(), &request("acme", "proj1")).unwrap_err();
    assert!(matches!(
        err,
        LaunchError::CIEnableFailed { step: CiStep::SyncRepositories, ref repository, .. } if repository == "acme/proj1"
    ));
    assert!(!env.ci.is_active("acme/proj1"));
}

#[test]
fn test_launch_advances_the_default_branch() {
    let env = env();
    env.host.set_default_branch("main");

    let outcome = env.launcher.launch(&ctx(), &request("acme", "proj1")).unwrap();
    assert_eq!(env.host.repository("acme/proj1").unwrap().default_branch, "main");
    let head = env.host.head_commit("acme/proj1").unwrap();
    assert_eq!(head.sha, outcome.commit_sha);
    assert!(env.host.head_files("acme/proj1").unwrap().contains_key("main.go"));
    assert!(env.ci.is_active("acme/proj1"));
}

#[test]
fn test_launch_into_user_account() {
    let env = env();
    env.launcher.launch(&ctx(), &request("jdoe", "playground")).unwrap();
    assert_eq!(env.host.repository("jdoe/playground").unwrap().owner_login, "jdoe");
    assert!(env.ci.is_active("jdoe/playground"));
}

#[test]
fn test_launch_with_sqlite_storage() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(SqliteStorage::open(&dir.path().join("pipeline.db")).unwrap());
    let host = Arc::new(MemoryHost::new("jdoe"));
    let ci = Arc::new(MemoryCi::new(host.clone()));
    publish_template(&host, "org/template-a", MANIFEST, &[(PIPELINE_YAML_PATH, PIPELINE)]).unwrap();
    storage.upsert("org/template-a", MANIFEST).unwrap();

    let launcher = SpotguideLauncher::new(storage.clone(), storage.clone(), host.clone(), ci.clone());
    launcher.launch(&ctx(), &request("acme", "proj1")).unwrap();

    let secrets = SecretStore::list(storage.as_ref(), OrganizationId(1)).unwrap();
    assert_eq!(secrets[0].request.tags, vec!["repo:acme/proj1"]);
    assert!(ci.is_active("acme/proj1"));
}
