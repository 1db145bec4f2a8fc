use std::collections::BTreeSet;
use std::io::{Cursor, Read};
use std::sync::Arc;

use pipeline_core::{SpotguideRecord, TreeEntry, PIPELINE_YAML_PATH, SPOTGUIDE_RELEASE_TAG};
use pipeline_hosting::{HostingError, RepositoryHost};
use serde_yaml::Value;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::ContentError;

/// Turns the tagged release of a template repository into the tree entries of
/// one commit.
#[derive(Clone)]
pub struct ContentMaterializer {
    host: Arc<dyn RepositoryHost>,
}

impl ContentMaterializer {
    pub fn new(host: Arc<dyn RepositoryHost>) -> Self {
        Self { host }
    }

    /// `secret_names` are added to every step of the CI pipeline descriptor.
    pub fn materialize(&self, source: &SpotguideRecord, secret_names: &[&str]) -> Result<Vec<TreeEntry>, ContentError> {
        let repository = source.name.as_str();
        let (owner, repo) = source.owner_and_repo().ok_or_else(|| ContentError::SourceReleaseNotFound {
            repository: repository.to_string(),
            tag: SPOTGUIDE_RELEASE_TAG.to_string(),
            source: HostingError::not_found("repository", repository),
        })?;

        let release = self.host.release_by_tag(owner, repo, SPOTGUIDE_RELEASE_TAG).map_err(|source| {
            if source.is_not_found() {
                ContentError::SourceReleaseNotFound {
                    repository: repository.to_string(),
                    tag: SPOTGUIDE_RELEASE_TAG.to_string(),
                    source,
                }
            } else {
                ContentError::DownloadFailed { repository: repository.to_string(), source }
            }
        })?;

        debug!(spotguide = repository, url = %release.zipball_url, "downloading release archive");
        let archive = self
            .host
            .download_archive(&release.zipball_url)
            .map_err(|source| ContentError::DownloadFailed { repository: repository.to_string(), source })?;

        let entries = extract_archive(repository, &archive, secret_names)?;
        info!(spotguide = repository, files = entries.len(), "prepared spotguide content");
        Ok(entries)
    }
}

/// Unpacks a release zipball. Every entry loses its first path segment (the
/// `<repo>-<sha>/` folder GitHub wraps archives in); directories are skipped.
pub fn extract_archive(repository: &str, archive: &[u8], secret_names: &[&str]) -> Result<Vec<TreeEntry>, ContentError> {
    let wrap = |reason: &str, e: Box<dyn std::error::Error + Send + Sync>| ContentError::ContentExtractionFailure {
        repository: repository.to_string(),
        reason: reason.to_string(),
        source: Some(e),
    };

    let mut zip = ZipArchive::new(Cursor::new(archive)).map_err(|e| wrap("unreadable archive", Box::new(e)))?;
    let mut seen = BTreeSet::new();
    let mut entries = Vec::with_capacity(zip.len());

    for i in 0..zip.len() {
        let mut file = zip.by_index(i).map_err(|e| wrap("unreadable archive entry", Box::new(e)))?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let path = match name.split_once('/') {
            Some((_, rest)) if !rest.is_empty() => rest.to_string(),
            _ => return Err(ContentError::extraction(repository, format!("entry {name} has no root folder"))),
        };
        if !seen.insert(path.clone()) {
            return Err(ContentError::extraction(repository, format!("duplicate entry {path}")));
        }

        // the declared size comes from the archive itself and is not trusted
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|e| wrap(&format!("failed to read {name}"), Box::new(e)))?;

        if path == PIPELINE_YAML_PATH {
            content = add_pipeline_secrets(&content, secret_names)
                .map_err(|e| wrap(&format!("failed to prepare {PIPELINE_YAML_PATH}"), Box::new(e)))?;
        }
        let executable = file.unix_mode().is_some_and(|mode| mode & 0o111 != 0);
        let entry = TreeEntry::blob(path, content);
        entries.push(if executable { entry.executable() } else { entry });
    }
    Ok(entries)
}

/// Appends `secret_names` to the `secrets` list of every step under the
/// top-level `pipeline` key, skipping names a step already lists.
///
/// Steps may be given as a mapping (`pipeline: {build: {...}}`) or a sequence.
/// Documents without a `pipeline` key, or calls without names, come back unchanged.
pub fn add_pipeline_secrets(raw: &[u8], secret_names: &[&str]) -> Result<Vec<u8>, serde_yaml::Error> {
    if secret_names.is_empty() {
        return Ok(raw.to_vec());
    }
    let mut doc: Value = serde_yaml::from_slice(raw)?;
    let Some(pipeline) = doc.get_mut("pipeline") else {
        return Ok(raw.to_vec());
    };
    match pipeline {
        Value::Mapping(steps) => {
            for (_, step) in steps.iter_mut() {
                add_step_secrets(step, secret_names);
            }
        }
        Value::Sequence(steps) => {
            for step in steps.iter_mut() {
                add_step_secrets(step, secret_names);
            }
        }
        _ => return Ok(raw.to_vec()),
    }
    Ok(serde_yaml::to_string(&doc)?.into_bytes())
}

fn add_step_secrets(step: &mut Value, secret_names: &[&str]) {
    let Value::Mapping(step) = step else { return };
    if !step.contains_key("secrets") {
        step.insert(Value::from("secrets"), Value::Null);
    }
    let Some(secrets) = step.get_mut("secrets") else { return };
    if secrets.is_null() {
        *secrets = Value::Sequence(Vec::new());
    }
    let Value::Sequence(list) = secrets else { return };
    for name in secret_names {
        if !list.iter().any(|v| v.as_str() == Some(*name)) {
            list.push(Value::from(*name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::release_archive;

    #[test]
    fn strips_root_folder_and_skips_directories() {
        let archive = release_archive("X", &[("a/b.txt", b"b"), ("README.md", b"readme")]).unwrap();
        let entries = extract_archive("banzaicloud/x", &archive, &[]).unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a/b.txt", "README.md"]);
        assert_eq!(entries[0].content, b"b");
        assert_eq!(entries[0].mode, "100644");
        assert_eq!(entries[0].kind, "blob");
    }

    #[test]
    fn executable_bit_survives_extraction() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("X/run.sh", SimpleFileOptions::default().unix_permissions(0o755)).unwrap();
        writer.write_all(b"#!/bin/sh\n").unwrap();
        writer.start_file("X/notes.txt", SimpleFileOptions::default().unix_permissions(0o644)).unwrap();
        writer.write_all(b"notes").unwrap();
        let archive = writer.finish().unwrap().into_inner();

        let entries = extract_archive("banzaicloud/x", &archive, &[]).unwrap();
        assert_eq!(entries[0].path, "run.sh");
        assert_eq!(entries[0].mode, "100755");
        assert_eq!(entries[1].mode, "100644");
    }

    #[test]
    fn declared_size_is_not_preallocated() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;
        use zip::CompressionMethod;

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file("X/a.txt", stored).unwrap();
        writer.write_all(b"hello").unwrap();
        let mut archive = writer.finish().unwrap().into_inner();

        // claim ~4 GiB uncompressed in both the local and the central header
        let huge = 0xFFFF_FFF0u32.to_le_bytes();
        for i in 0..archive.len().saturating_sub(4) {
            let offset = match archive[i..i + 4] {
                [0x50, 0x4b, 0x03, 0x04] => 22,
                [0x50, 0x4b, 0x01, 0x02] => 24,
                _ => continue,
            };
            archive[i + offset..i + offset + 4].copy_from_slice(&huge);
        }

        // reading may reject the lie, but must not reserve the claimed size
        if let Ok(entries) = extract_archive("banzaicloud/x", &archive, &[]) {
            assert_eq!(entries[0].content, b"hello");
        }
    }

    #[test]
    fn rejects_garbage_archive() {
        let err = extract_archive("banzaicloud/x", b"not a zip", &[]).unwrap_err();
        assert!(matches!(err, ContentError::ContentExtractionFailure { .. }));
    }

    #[test]
    fn rejects_entry_without_root_folder() {
        let archive = release_archive("", &[("top.txt", b"t")]).unwrap();
        let err = extract_archive("banzaicloud/x", &archive, &[]).unwrap_err();
        assert!(matches!(err, ContentError::ContentExtractionFailure { ref reason, .. } if reason.contains("top.txt")));
    }

    #[test]
    fn rejects_paths_that_collide_after_stripping() {
        let mut files = release_archive_entries("X", &[("a.txt", b"1")]);
        files.extend(release_archive_entries("Y", &[("a.txt", b"2")]));
        let archive = crate::fixtures::zip_of(&files).unwrap();
        let err = extract_archive("banzaicloud/x", &archive, &[]).unwrap_err();
        assert!(matches!(err, ContentError::ContentExtractionFailure { ref reason, .. } if reason.contains("duplicate")));
    }

    fn release_archive_entries(root: &str, files: &[(&str, &[u8])]) -> Vec<(String, Vec<u8>)> {
        files.iter().map(|(p, c)| (format!("{root}/{p}"), c.to_vec())).collect()
    }

    #[test]
    fn pipeline_mapping_steps_gain_missing_secrets() {
        let raw = b"workspace:\n  base: /go\npipeline:\n  build:\n    image: golang\n    secrets: [DB_PASS]\n  deploy:\n    image: helm\n";
        let out = add_pipeline_secrets(raw, &["DB_PASS", "DB_USER"]).unwrap();
        let doc: Value = serde_yaml::from_slice(&out).unwrap();

        let build = doc["pipeline"]["build"]["secrets"].as_sequence().unwrap();
        assert_eq!(build, &vec![Value::from("DB_PASS"), Value::from("DB_USER")]);
        let deploy = doc["pipeline"]["deploy"]["secrets"].as_sequence().unwrap();
        assert_eq!(deploy, &vec![Value::from("DB_PASS"), Value::from("DB_USER")]);
        assert_eq!(doc["workspace"]["base"], Value::from("/go"));

        // key order survives the rewrite
        let text = String::from_utf8(out).unwrap();
        assert!(text.find("workspace").unwrap() < text.find("pipeline").unwrap());
        assert!(text.find("build").unwrap() < text.find("deploy").unwrap());
    }

    #[test]
    fn pipeline_sequence_steps_gain_secrets() {
        let raw = b"pipeline:\n  - name: build\n    secrets:\n  - name: test\n";
        let out = add_pipeline_secrets(raw, &["TOKEN"]).unwrap();
        let doc: Value = serde_yaml::from_slice(&out).unwrap();
        for step in doc["pipeline"].as_sequence().unwrap() {
            assert_eq!(step["secrets"], Value::Sequence(vec![Value::from("TOKEN")]));
        }
    }

    #[test]
    fn pipeline_untouched_without_names_or_pipeline_key() {
        let raw = b"# keep me\npipeline:\n  build:\n    image: golang\n";
        assert_eq!(add_pipeline_secrets(raw, &[]).unwrap(), raw.to_vec());
        let other = b"kind: something\n";
        assert_eq!(add_pipeline_secrets(other, &["X"]).unwrap(), other.to_vec());
    }

    #[test]
    fn pipeline_descriptor_is_rewritten_during_extraction() {
        let archive = release_archive(
            "spotguide-a-1234",
            &[(PIPELINE_YAML_PATH, b"pipeline:\n  build:\n    image: golang\n"), ("main.go", b"package main\n")],
        )
        .unwrap();
        let entries = extract_archive("banzaicloud/spotguide-a", &archive, &["DB_PASS"]).unwrap();
        let pipeline = entries.iter().find(|e| e.path == PIPELINE_YAML_PATH).unwrap();
        let doc: Value = serde_yaml::from_slice(&pipeline.content).unwrap();
        assert_eq!(doc["pipeline"]["build"]["secrets"][0], Value::from("DB_PASS"));

        let main = entries.iter().find(|e| e.path == "main.go").unwrap();
        assert_eq!(main.content, b"package main\n");
    }
}
