//! Error types for the chat store.

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration-related errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Coarse classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request never got a response (DNS, connect, TLS, reset).
    Network,
    /// The service rejected the access key.
    Auth,
    /// The request was refused locally before any remote call.
    Validation,
    /// The service answered with an error, or an unreadable body.
    Backend,
}

/// Errors from a single remote table operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Request rejected by backend ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Failed to decode backend response: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Network(_) => ErrorKind::Network,
            StoreError::Auth { .. } => ErrorKind::Auth,
            StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::Rejected { .. } | StoreError::Decode(_) => ErrorKind::Backend,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
