use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ids::SecretId;

/// Request to store a secret for an organization.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSecretRequest {
    pub name: String,
    #[serde(rename = "type", default)]
    pub secret_type: String,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreateSecretRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret_type: "generic".to_string(),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> SecretId {
        secret_id_from_name(&self.name)
    }
}

/// Secret ids are the hex SHA-256 of the secret name, so re-storing a name is addressable.
pub fn secret_id_from_name(name: &str) -> SecretId {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    SecretId(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_stable_and_name_derived() {
        let a = secret_id_from_name("DB_PASS");
        assert_eq!(a, secret_id_from_name("DB_PASS"));
        assert_ne!(a, secret_id_from_name("DB_USER"));
        assert_eq!(a.as_str().len(), 64);
    }
}
