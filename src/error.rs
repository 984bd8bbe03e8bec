pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    General(String),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] zarrs::storage::StorageError),
    #[error("EOPFZARR driver could not open {path}: {reason}")]
    OpenFailed { path: String, reason: String },
    #[error("EOPFZARR driver: main path '{0}' does not exist")]
    NotFound(String),
    #[error("no matching subdataset found for: {0}")]
    SubdatasetNotFound(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Wrapped(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn general(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn wrap(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Wrapped(Box::new(error))
    }

    pub fn open_failed(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::OpenFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
