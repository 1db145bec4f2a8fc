use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure talking to an upstream hosting or CI service.
#[derive(Debug, Error)]
pub enum HostingError {
    #[error("{method} {url}: {status} {message}")]
    Api {
        method: String,
        url: String,
        status: u16,
        message: String,
    },

    #[error("{method} {url}: request failed")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("could not decode response of {url}")]
    Decode {
        url: String,
        #[source]
        source: BoxError,
    },
}

impl HostingError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound { entity, key: key.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, HostingError::NotFound { .. })
    }

    /// HTTP status of an API rejection, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            HostingError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, HostingError>;
