//! Error types for Rotacast

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RotacastError>;

#[derive(Error, Debug)]
pub enum RotacastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credentials(#[from] CredentialError),

    #[error("Content source error: {0}")]
    Source(#[from] SourceError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

impl RotacastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            RotacastError::Config(_) | RotacastError::Credentials(_) => 2,
            RotacastError::Source(_) | RotacastError::State(_) | RotacastError::Delivery(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("No channel is enabled")]
    NoChannelEnabled,
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Missing environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("Invalid credential {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Failure to read the content source. Aborts the current cycle only.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Content source not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read content source {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Content source {path} is missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: &'static str },
}

/// Failure to persist posting state. Logged; never terminates the process.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outcome of a failed delivery attempt.
///
/// Recoverable variants leave the item eligible for the next cycle. Fatal
/// variants point at configuration or content problems an operator must fix.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Delivery timed out: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Delivery failed: {0}")]
    Other(String),
}

impl DeliveryError {
    /// Whether the failure is transient and the item should simply be retried
    /// on the next scheduled cycle.
    pub fn is_recoverable(&self) -> bool {
        match self {
            DeliveryError::Timeout(_)
            | DeliveryError::RateLimited(_)
            | DeliveryError::Network(_)
            | DeliveryError::Server { .. } => true,
            DeliveryError::Authentication(_)
            | DeliveryError::Rejected { .. }
            | DeliveryError::Other(_) => false,
        }
    }

    /// Classify a non-success HTTP status returned by a delivery endpoint.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => DeliveryError::RateLimited(body),
            401 | 403 => DeliveryError::Authentication(format!("HTTP {}: {}", status, body)),
            500..=599 => DeliveryError::Server { status, body },
            _ => DeliveryError::Rejected { status, body },
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DeliveryError::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            DeliveryError::Network(e.to_string())
        } else if let Some(status) = e.status() {
            DeliveryError::from_status(status.as_u16(), e.to_string())
        } else {
            DeliveryError::Other(e.to_string())
        }
    }
}
