use serde::{Deserialize, Serialize};

use crate::secret::CreateSecretRequest;

/// Request to create a repository from a spotguide template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequest {
    pub spotguide_name: String,
    pub repo_organization: String,
    pub repo_name: String,
    #[serde(default)]
    pub secrets: Vec<CreateSecretRequest>,
}

impl LaunchRequest {
    pub fn repo_full_name(&self) -> String {
        format!("{}/{}", self.repo_organization, self.repo_name)
    }

    /// Tag attached to every secret created for this launch.
    pub fn repo_tag(&self) -> String {
        format!("repo:{}", self.repo_full_name())
    }

    /// Requested secret names, first occurrence wins.
    pub fn distinct_secret_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::with_capacity(self.secrets.len());
        for s in &self.secrets {
            if !names.contains(&s.name.as_str()) {
                names.push(&s.name);
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> LaunchRequest {
        LaunchRequest {
            spotguide_name: "banzaicloud/spotguide-nodejs-mongodb".into(),
            repo_organization: "acme".into(),
            repo_name: "proj1".into(),
            secrets: vec![
                CreateSecretRequest::new("DB_PASS"),
                CreateSecretRequest::new("DB_USER"),
                CreateSecretRequest::new("DB_PASS"),
            ],
        }
    }

    #[test]
    fn derives_full_name_and_tag() {
        let r = request();
        assert_eq!(r.repo_full_name(), "acme/proj1");
        assert_eq!(r.repo_tag(), "repo:acme/proj1");
    }

    #[test]
    fn secret_names_are_deduplicated_in_order() {
        assert_eq!(request().distinct_secret_names(), vec!["DB_PASS", "DB_USER"]);
    }

    #[test]
    fn decodes_camel_case_json_shape() {
        let r: LaunchRequest = serde_yaml::from_str(
            "spotguideName: banzaicloud/spotguide-nodejs-mongodb\nrepoOrganization: acme\nrepoName: proj1\n",
        )
        .unwrap();
        assert_eq!(r.repo_full_name(), "acme/proj1");
        assert!(r.secrets.is_empty());
    }
}
