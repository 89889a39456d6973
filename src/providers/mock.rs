/*!
 * Mock translation client for testing.
 *
 * Behaviors cover the paths the retry/fallback state machine cares about:
 * - `MockClient::identity()` - echoes the request (a no-op translation)
 * - `MockClient::tagged(tag)` - prefixes every segment, preserving separators
 * - `MockClient::failing_with(err)` - always fails with a chosen error class
 * - `MockClient::short_reply()` - drops separators, triggering a count mismatch
 * - `MockClient::flaky(n)` - fails the first n requests, then behaves
 */

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::ProviderError;
use crate::providers::TranslationClient;
use crate::translation::batch::BATCH_SEPARATOR;

/// Behavior mode for the mock client
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Echo the serialized request unchanged
    Identity,
    /// Prefix every segment with a tag, keeping the separator structure
    Tagged(String),
    /// Always fail with this error
    Failing(ProviderError),
    /// Return only the first segment of the request
    ShortReply,
    /// Fail the first `fail_count` requests, then echo with a tag
    Flaky {
        fail_count: usize,
        error: ProviderError,
    },
}

/// Mock translation client with scripted behavior
#[derive(Debug)]
pub struct MockClient {
    name: String,
    behavior: MockBehavior,
    request_count: Arc<AtomicUsize>,
}

impl MockClient {
    pub fn new(name: impl Into<String>, behavior: MockBehavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A no-op translator that returns its input
    pub fn identity() -> Self {
        Self::new("mock-identity", MockBehavior::Identity)
    }

    /// Prefixes every segment with `[tag] `
    pub fn tagged(tag: impl Into<String>) -> Self {
        Self::new("mock-tagged", MockBehavior::Tagged(tag.into()))
    }

    /// Always fails with the given error
    pub fn failing_with(error: ProviderError) -> Self {
        Self::new("mock-failing", MockBehavior::Failing(error))
    }

    /// Replies with fewer segments than were sent
    pub fn short_reply() -> Self {
        Self::new("mock-short", MockBehavior::ShortReply)
    }

    /// Fails `fail_count` times with the given error, then succeeds
    pub fn flaky(fail_count: usize, error: ProviderError) -> Self {
        Self::new("mock-flaky", MockBehavior::Flaky { fail_count, error })
    }

    /// Shared counter handle for asserting on attempt counts
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.request_count)
    }

    /// Number of requests this client has received
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    fn tag_segments(serialized: &str, tag: &str) -> String {
        serialized
            .split(BATCH_SEPARATOR)
            .map(|segment| format!("[{}] {}", tag, segment.trim()))
            .collect::<Vec<_>>()
            .join(&format!("\n{}\n", BATCH_SEPARATOR))
    }
}

#[async_trait]
impl TranslationClient for MockClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn translate_batch(
        &self,
        serialized: &str,
        _source_language: &str,
        _target_language: &str,
    ) -> Result<String, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);

        match &self.behavior {
            MockBehavior::Identity => Ok(serialized.to_string()),
            MockBehavior::Tagged(tag) => Ok(Self::tag_segments(serialized, tag)),
            MockBehavior::Failing(error) => Err(error.clone()),
            MockBehavior::ShortReply => Ok(serialized
                .split(BATCH_SEPARATOR)
                .next()
                .unwrap_or_default()
                .trim()
                .to_string()),
            MockBehavior::Flaky { fail_count, error } => {
                if count < *fail_count {
                    Err(error.clone())
                } else {
                    Ok(Self::tag_segments(serialized, "retried"))
                }
            }
        }
    }
}
