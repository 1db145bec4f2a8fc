//! Fixture builders for spotguide tests: release zipballs and template
//! repositories published on a [`MemoryHost`].

use std::io::{Cursor, Write};

use pipeline_core::{SPOTGUIDE_GITHUB_TOPIC, SPOTGUIDE_RELEASE_TAG, SPOTGUIDE_YAML_PATH};
use pipeline_hosting::MemoryHost;
use zip::result::ZipResult;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Zip archive holding `entries` verbatim, in order.
pub fn zip_of(entries: &[(String, Vec<u8>)]) -> ZipResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer.start_file(name.as_str(), SimpleFileOptions::default())?;
        writer.write_all(content)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Zipball shaped like a GitHub release archive: every file under `root/`,
/// with an explicit directory entry for the root. An empty `root` puts files
/// at the top level.
pub fn release_archive(root: &str, files: &[(&str, &[u8])]) -> ZipResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    if !root.is_empty() {
        writer.add_directory(format!("{root}/"), SimpleFileOptions::default())?;
    }
    for (path, content) in files {
        let name = if root.is_empty() { path.to_string() } else { format!("{root}/{path}") };
        writer.start_file(name, SimpleFileOptions::default())?;
        writer.write_all(content)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Publishes a spotguide template: a repository tagged with the spotguide
/// topic whose default branch holds the manifest, plus a `spotguide` release
/// whose archive holds `files` and the manifest.
pub fn publish_template(host: &MemoryHost, full_name: &str, manifest: &[u8], files: &[(&str, &[u8])]) -> ZipResult<()> {
    host.add_repository(full_name, &[SPOTGUIDE_GITHUB_TOPIC], &[(SPOTGUIDE_YAML_PATH, manifest)]);

    let mut content: Vec<(&str, &[u8])> = files.to_vec();
    content.push((SPOTGUIDE_YAML_PATH, manifest));
    let root = format!("{}-0a1b2c3", full_name.replace('/', "-"));
    host.add_release(full_name, SPOTGUIDE_RELEASE_TAG, release_archive(&root, &content)?);
    Ok(())
}
