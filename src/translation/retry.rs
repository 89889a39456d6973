/*!
 * Error classification and backoff timing for batch retries.
 */

use rand::Rng;
use std::time::Duration;

use crate::app_config::TranslationConfig;
use crate::errors::{BatchError, ProviderError};

/// Lower bound of the random jitter factor applied to every retry delay
pub const JITTER_MIN: f64 = 1.10;
/// Upper bound of the random jitter factor
pub const JITTER_MAX: f64 = 1.30;

/// Coarse class of the last failure, for logging and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RateLimited,
    ServerError,
    ContentFiltered,
    Network,
    Unknown,
    /// Reply parsed into the wrong number of segments
    ContentMismatch,
}

impl ErrorClass {
    /// Classify a batch error
    pub fn of(error: &BatchError) -> Self {
        match error {
            BatchError::Provider(ProviderError::RateLimited(_)) => Self::RateLimited,
            BatchError::Provider(ProviderError::ServerError { .. }) => Self::ServerError,
            BatchError::Provider(ProviderError::ContentFiltered(_)) => Self::ContentFiltered,
            BatchError::Provider(ProviderError::Network(_)) => Self::Network,
            BatchError::Provider(ProviderError::Unknown(_)) => Self::Unknown,
            BatchError::ContentMismatch { .. } => Self::ContentMismatch,
        }
    }

    /// Content filtering is the only class where a same-provider retry is
    /// pointless; unclassified errors default to retryable (with the cap)
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::ContentFiltered)
    }
}

/// Retry timing parameters for one job's translation stage
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of re-attempts after the initial try
    pub max_retries: u32,
    /// Base delay before the first retry
    pub base_delay: Duration,
    /// Cap applied to the exponential term, before jitter
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TranslationConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs_f64(config.retry_base_delay_secs),
            max_delay: Duration::from_secs_f64(config.retry_max_delay_secs),
        }
    }

    /// Delay before retry number `attempt` (0-based):
    /// `min(max_delay, base * 2^attempt)` scaled by a random jitter factor.
    ///
    /// The jitter desynchronizes retries across concurrently running batches
    /// and jobs, so a rate-limited provider is not hammered in lockstep.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        let capped = exponential.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped * jitter_factor())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Random jitter factor uniform in [JITTER_MIN, JITTER_MAX]
pub fn jitter_factor() -> f64 {
    rand::rng().random_range(JITTER_MIN..=JITTER_MAX)
}

/// State of one batch's send attempts, carried through log lines
#[derive(Debug, Clone, Copy)]
pub struct RetryContext {
    /// 0-based retry number about to run
    pub attempt: u32,
    /// Class of the failure that triggered this retry
    pub last_error_class: ErrorClass,
    /// Delay before the retry runs
    pub next_delay: Duration,
}
