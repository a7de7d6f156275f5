/*!
 * Error types for the kobo-anki application.
 *
 * Errors are split along the lines of how a card run reacts to them:
 * source and sink failures end the run, translation and synthesis
 * failures only degrade the item they happened on.
 */

use thiserror::Error;

/// Errors that can occur when talking to a remote provider API
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The service accepted the request but refused the action
    #[error("Service rejected the request: {0}")]
    Rejected(String),
}

impl ProviderError {
    /// Map a non-success HTTP status and body to the matching variant
    pub fn from_status(status_code: u16, message: String) -> Self {
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            429 | 456 => Self::RateLimitExceeded(message),
            _ => Self::ApiError { status_code, message },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() {
            Self::ConnectionError(error.to_string())
        } else if error.is_decode() {
            Self::ParseError(error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

/// Fatal errors raised while reaching or reading the text source
#[derive(Error, Debug)]
pub enum SourceError {
    /// No mounted e-reader was found
    #[error("No Kobo device detected (looked for volume '{0}')")]
    DeviceNotFound(String),

    /// More than one mounted e-reader matched
    #[error("Multiple Kobo devices detected: {0:?}")]
    MultipleDevices(Vec<String>),

    /// The annotation database could not be queried
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Reading a file or probing mounts failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The filter parameters cannot be applied
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

/// Per-item translation failures
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The provider answered without any text
    #[error("Empty translation returned")]
    EmptyResponse,
}

/// Per-item speech synthesis failures
#[derive(Error, Debug)]
pub enum SynthesisError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The audio could not be written to the media store
    #[error("Failed to store audio: {0}")]
    Storage(String),
}

/// Fatal errors raised while appending or exporting cards
#[derive(Error, Debug)]
pub enum SinkError {
    /// The sink refused the card
    #[error("Failed to add card: {0}")]
    AppendFailed(String),

    /// The deck could not be written out
    #[error("Failed to export deck: {0}")]
    Export(String),

    /// File system failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The source could not be materialized
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// A card could not be appended
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// The run state machine was asked for a transition it does not allow
    #[error("Invalid pipeline transition from {from} to {to}")]
    InvalidTransition {
        /// Phase the run was in
        from: String,
        /// Phase that was requested
        to: String,
    },

    /// A processing task panicked or its join failed
    #[error("Processing task failed: {0}")]
    Task(String),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Error from the card sink
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
