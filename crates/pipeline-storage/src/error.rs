use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} already exists: {key}")]
    Conflict { entity: &'static str, key: String },

    #[error("{entity} {key} is {size} bytes, limit is {limit}")]
    TooLarge {
        entity: &'static str,
        key: String,
        size: usize,
        limit: usize,
    },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StorageError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound { entity, key: key.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
