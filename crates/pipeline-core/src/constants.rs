//! Fixed, repository-relative locations and labels shared by the scraper and the launch flow.

/// Topic a repository must carry to be picked up as a spotguide.
pub const SPOTGUIDE_GITHUB_TOPIC: &str = "spotguide";

/// Organization that hosts the spotguide template repositories.
pub const SPOTGUIDE_GITHUB_ORGANIZATION: &str = "banzaicloud";

/// Manifest location inside a template repository.
pub const SPOTGUIDE_YAML_PATH: &str = ".banzaicloud/spotguide.yaml";

/// CI pipeline descriptor location inside a template repository.
pub const PIPELINE_YAML_PATH: &str = ".banzaicloud/pipeline.yaml";

/// Release tag whose archive is used as the bootstrap content.
pub const SPOTGUIDE_RELEASE_TAG: &str = "spotguide";

/// Branch reference advanced to the spotguide commit when the hosting
/// service reports no default branch.
pub const SPOTGUIDE_BRANCH_REF: &str = "heads/master";

/// Upper bound of a persisted raw manifest.
pub const MAX_SPOTGUIDE_RAW_BYTES: usize = 10240;

/// Page size used when listing template repositories.
pub const SPOTGUIDE_LIST_PAGE_SIZE: u32 = 100;
