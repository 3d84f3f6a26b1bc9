//! Error types for the persona widget.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Invalid input: {0}")]
    Input(#[from] InputError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Durable client-side storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt state file {path}: expected a JSON object")]
    Corrupt { path: String },
}

/// Failures reported for a remote call.
///
/// Every endpoint of the remote service resolves to either its typed payload
/// or one of these two cases.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Network failure, non-JSON body, or a body that does not fit the contract.
    #[error("Request to {endpoint} failed: {reason}")]
    Transport { endpoint: String, reason: String },

    /// The service answered and explicitly refused (an `error` field, or `valid: false`).
    #[error("{reason}")]
    Rejected { endpoint: String, reason: String },
}

impl ServiceError {
    pub fn transport(endpoint: &str, reason: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }

    pub fn rejected(endpoint: &str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }

    /// The human-readable reason, without the endpoint prefix.
    pub fn reason(&self) -> &str {
        match self {
            Self::Transport { reason, .. } | Self::Rejected { reason, .. } => reason,
        }
    }
}

/// User input rejected before any network call is made.
///
/// These surface as inline notices, never as conversation turns.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Please type a message first.")]
    EmptyMessage,

    #[error("Please enter your access token.")]
    EmptyToken,

    #[error("Please select a file to upload.")]
    NoFile,

    #[error("No file is waiting for this form.")]
    NoPendingFile,

    #[error("Unsupported file type: {name}. Use an image, a PDF, or a spreadsheet.")]
    UnsupportedFile { name: String },

    #[error("That action does not belong to the current form.")]
    WrongForm,

    #[error("Connect your access token first.")]
    MissingToken,

    #[error("Files and tokens are handled by Goose. Switch to Goose first.")]
    IngestOnly,

    /// The control for this action is disabled while its call is in flight.
    #[error("Another request is still in flight.")]
    Busy,
}

/// Result type alias for the widget.
pub type Result<T> = std::result::Result<T, Error>;
