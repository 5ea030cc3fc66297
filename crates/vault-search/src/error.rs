use secret_index::RebuildError;

/// Unified error type for the vault-search service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid value for {0}: {1:?}")]
    InvalidEnv(&'static str, String),

    #[error("failed to initialize logging: {0}")]
    Logging(String),

    #[error("failed to build vault client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("initial cache build failed, vault may be unreachable: {0}")]
    InitialBuild(#[from] RebuildError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias using [`ServiceError`].
pub type ServiceResult<T> = Result<T, ServiceError>;
