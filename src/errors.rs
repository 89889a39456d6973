/*!
 * Error types for the subweave application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors raised by translation provider APIs, classified by recovery strategy
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Provider rejected the request because of rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Provider-side failure (HTTP 5xx equivalents)
    #[error("Server error {status}: {message}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Provider refused the content itself; retrying the same payload is pointless
    #[error("Content filtered by provider: {0}")]
    ContentFiltered(String),

    /// Connection, DNS or timeout failure before a response arrived
    #[error("Network error: {0}")]
    Network(String),

    /// Anything the classifier could not place
    #[error("Unknown provider error: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Classify an HTTP status code and response body into a provider error
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => Self::RateLimited(message),
            500 | 502 | 503 | 504 => Self::ServerError { status, message },
            // Content-policy rejections come back as 400-class errors
            400..=499 => Self::ContentFiltered(message),
            _ => Self::Unknown(format!("HTTP {}: {}", status, message)),
        }
    }

    /// Whether the same request may succeed if sent again to the same provider
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ContentFiltered(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            Self::Network(error.to_string())
        } else {
            Self::Unknown(error.to_string())
        }
    }
}

/// Errors for a single translation batch attempt
#[derive(Error, Debug, Clone)]
pub enum BatchError {
    /// Transport or provider-side failure
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Reply did not split back into the same number of segments that were sent
    #[error("Reply segment count mismatch: expected {expected}, got {got}")]
    ContentMismatch {
        /// Segments sent in the request
        expected: usize,
        /// Segments found in the reply
        got: usize,
    },
}

impl BatchError {
    /// Mismatched replies are transport-class failures for retry purposes
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::ContentMismatch { .. } => true,
        }
    }
}

/// Job-level failures recorded on a JobRecord
#[derive(Error, Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum JobError {
    /// The submitted path is not a readable video file
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Audio extraction exceeded its timeout
    #[error("Audio extraction timed out after {0}s")]
    ExtractionTimeout(u64),

    /// Audio extraction failed
    #[error("Audio extraction failed: {0}")]
    ExtractionFailed(String),

    /// Speech recognition failed
    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    /// The translation stage broke its reassembly invariant
    #[error("Translation failed: {0}")]
    TranslationFailed(String),

    /// Subtitle burn-in failed
    #[error("Burn-in failed: {0}")]
    BurnInFailed(String),

    /// The worker process exited abnormally without reporting a result
    #[error("Worker process crashed: {0}")]
    WorkerCrashed(String),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from a translation batch
    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    /// Error from job processing
    #[error("Job error: {0}")]
    Job(#[from] JobError),

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
