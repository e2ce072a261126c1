//! Error types for Sharekit

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SocialError>;

#[derive(Error, Debug)]
pub enum SocialError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Account storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error ({context}): {source}")]
    Network {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Service error: {0}")]
    Service(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SocialError {
    /// Wrap a transport failure with the endpoint or step it happened in
    pub fn network(context: impl Into<String>, source: reqwest::Error) -> Self {
        SocialError::Network {
            context: context.into(),
            source,
        }
    }

    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SocialError::Cancelled => 0,
            SocialError::Authentication(_) => 2,
            SocialError::InvalidInput(_) => 3,
            SocialError::Config(_) => 1,
            SocialError::Storage(_) => 1,
            SocialError::Network { .. } => 1,
            SocialError::Service(_) => 1,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SocialError::Cancelled)
    }

    /// Text a user interface shows for this error
    ///
    /// Cancellation is a normal outcome and produces no message.
    pub fn user_message(&self) -> Option<String> {
        if self.is_cancelled() {
            None
        } else {
            Some(format!("Share Error: {}", self))
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid URL for {field}: {source}")]
    InvalidUrl {
        field: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Account store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse account store: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize account store: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Account '{0}' not found for {1}")]
    NotFound(String, String),
}
