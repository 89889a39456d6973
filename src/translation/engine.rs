/*!
 * Batch translation engine.
 *
 * Drives the full translation stage for one job: plan batches, send them
 * concurrently, run the retry/fallback state machine per batch, and reassemble
 * the segment list in original index order. A batch that fails terminally
 * degrades (its segments keep the source text as the translation) instead of
 * failing the job; batches are independent of each other.
 */

use anyhow::{anyhow, Result};
use futures::stream::{self, StreamExt};
use log::{debug, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::app_config::TranslationConfig;
use crate::errors::BatchError;
use crate::providers::{GoogleClient, OpenAiClient, TranslationClient};
use crate::subtitle_processor::SubtitleSegment;

use super::batch::{plan_batches, BatchLimits, TranslationBatch};
use super::retry::{ErrorClass, RetryContext, RetryPolicy};

/// Result of translating one job's segments
#[derive(Debug)]
pub struct TranslationOutcome {
    /// All segments, in original index order, with `translated_text` filled in
    pub segments: Vec<SubtitleSegment>,
    /// Number of batches that kept their source text after terminal failure
    pub degraded_batches: usize,
}

/// Per-batch result before reassembly
struct BatchOutcome {
    batch_index: usize,
    segments: Vec<SubtitleSegment>,
    degraded: bool,
}

/// Batch translation engine for one job
pub struct BatchTranslationEngine {
    /// Primary provider
    primary: Arc<dyn TranslationClient>,
    /// Secondary provider; `None` when fallback is disabled or unconfigured
    fallback: Option<Arc<dyn TranslationClient>>,
    /// Retry timing parameters
    policy: RetryPolicy,
    /// Batch size ceilings
    limits: BatchLimits,
    /// Maximum batches in flight at once
    concurrent_batches: usize,
}

impl BatchTranslationEngine {
    pub fn new(
        primary: Arc<dyn TranslationClient>,
        fallback: Option<Arc<dyn TranslationClient>>,
        policy: RetryPolicy,
        limits: BatchLimits,
        concurrent_batches: usize,
    ) -> Self {
        Self {
            primary,
            fallback,
            policy,
            limits,
            concurrent_batches: concurrent_batches.max(1),
        }
    }

    /// Build an engine with real provider clients from configuration
    pub fn from_config(config: &TranslationConfig) -> Result<Self> {
        let primary: Arc<dyn TranslationClient> = Arc::new(OpenAiClient::new(&config.primary)?);

        let fallback: Option<Arc<dyn TranslationClient>> = if config.enable_fallback {
            Some(Arc::new(GoogleClient::new(&config.fallback)?))
        } else {
            None
        };

        Ok(Self::new(
            primary,
            fallback,
            RetryPolicy::from_config(config),
            BatchLimits::from_config(config),
            config.concurrent_batches,
        ))
    }

    /// Translate all segments, filling `translated_text`.
    ///
    /// `progress` is called with (completed_batches, total_batches) as each
    /// batch finishes, in completion order.
    pub async fn translate(
        &self,
        segments: Vec<SubtitleSegment>,
        source_language: &str,
        target_language: &str,
        progress: impl Fn(usize, usize) + Clone + Send + Sync + 'static,
    ) -> Result<TranslationOutcome> {
        if segments.is_empty() {
            return Ok(TranslationOutcome {
                segments,
                degraded_batches: 0,
            });
        }

        let expected_indices: Vec<usize> = segments.iter().map(|s| s.index).collect();
        let batches = plan_batches(&segments, self.limits);
        let total_batches = batches.len();

        let semaphore = Arc::new(Semaphore::new(self.concurrent_batches));
        let completed = Arc::new(AtomicUsize::new(0));

        let outcomes: Vec<BatchOutcome> = stream::iter(batches)
            .map(|batch| {
                let semaphore = semaphore.clone();
                let completed = completed.clone();
                let progress = progress.clone();
                let source_language = source_language.to_string();
                let target_language = target_language.to_string();

                async move {
                    // Closing the engine's semaphore is not possible here, so
                    // acquire cannot fail
                    let _permit = semaphore.acquire().await.expect("semaphore closed");

                    let outcome = self
                        .translate_one_batch(batch, &source_language, &target_language)
                        .await;

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress(done, total_batches);
                    outcome
                }
            })
            .buffer_unordered(self.concurrent_batches)
            .collect()
            .await;

        // Reassemble in original order regardless of completion order
        let mut sorted = outcomes;
        sorted.sort_by_key(|o| o.batch_index);

        let degraded_batches = sorted.iter().filter(|o| o.degraded).count();
        let all_segments: Vec<SubtitleSegment> =
            sorted.into_iter().flat_map(|o| o.segments).collect();

        let result_indices: Vec<usize> = all_segments.iter().map(|s| s.index).collect();
        if result_indices != expected_indices {
            return Err(anyhow!(
                "Translation changed the segment list: {} segments in, {} out",
                expected_indices.len(),
                result_indices.len()
            ));
        }

        Ok(TranslationOutcome {
            segments: all_segments,
            degraded_batches,
        })
    }

    /// Run the retry/fallback state machine for a single batch
    async fn translate_one_batch(
        &self,
        batch: TranslationBatch,
        source_language: &str,
        target_language: &str,
    ) -> BatchOutcome {
        let request = batch.serialize_request();

        let primary_texts = self
            .attempt_with_retries(&batch, &request, source_language, target_language)
            .await;

        let (texts, degraded) = match primary_texts {
            Some(texts) => (Some(texts), false),
            None => match &self.fallback {
                Some(fallback) => {
                    // One attempt only; fallback failure is terminal for the batch
                    match Self::attempt_once(
                        fallback.as_ref(),
                        &batch,
                        &request,
                        source_language,
                        target_language,
                    )
                    .await
                    {
                        Ok(texts) => (Some(texts), false),
                        Err(error) => {
                            warn!(
                                "Batch {} failed on fallback provider {}: {}",
                                batch.batch_index,
                                fallback.name(),
                                error
                            );
                            (None, true)
                        }
                    }
                }
                None => (None, true),
            },
        };

        let segments = batch
            .segments
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                let mut segment = segment.clone();
                segment.translated_text = match &texts {
                    Some(texts) => texts[i].clone(),
                    // Degraded batch: deliver the original text rather than nothing
                    None => segment.source_text.clone(),
                };
                segment
            })
            .collect();

        BatchOutcome {
            batch_index: batch.batch_index,
            segments,
            degraded,
        }
    }

    /// Try the primary provider with jittered exponential backoff.
    /// Returns `None` once retries are exhausted or the error is non-retryable.
    async fn attempt_with_retries(
        &self,
        batch: &TranslationBatch,
        request: &str,
        source_language: &str,
        target_language: &str,
    ) -> Option<Vec<String>> {
        let mut attempt: u32 = 0;

        loop {
            match Self::attempt_once(
                self.primary.as_ref(),
                batch,
                request,
                source_language,
                target_language,
            )
            .await
            {
                Ok(texts) => return Some(texts),
                Err(error) => {
                    let class = ErrorClass::of(&error);

                    if !class.is_retryable() {
                        warn!(
                            "Batch {} rejected by {} ({}), going to fallback: {}",
                            batch.batch_index,
                            self.primary.name(),
                            class_label(class),
                            error
                        );
                        return None;
                    }

                    if attempt >= self.policy.max_retries {
                        warn!(
                            "Batch {} exhausted {} retries on {}: {}",
                            batch.batch_index,
                            self.policy.max_retries,
                            self.primary.name(),
                            error
                        );
                        return None;
                    }

                    let context = RetryContext {
                        attempt,
                        last_error_class: class,
                        next_delay: self.policy.backoff_delay(attempt),
                    };
                    debug!(
                        "Batch {} attempt {} failed ({}), retrying in {:.2}s",
                        batch.batch_index,
                        context.attempt + 1,
                        class_label(context.last_error_class),
                        context.next_delay.as_secs_f64()
                    );
                    tokio::time::sleep(context.next_delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One send + parse against one provider
    async fn attempt_once(
        client: &dyn TranslationClient,
        batch: &TranslationBatch,
        request: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>, BatchError> {
        let reply = client
            .translate_batch(request, source_language, target_language)
            .await?;
        batch.parse_response(&reply)
    }
}

fn class_label(class: ErrorClass) -> &'static str {
    match class {
        ErrorClass::RateLimited => "rate limited",
        ErrorClass::ServerError => "server error",
        ErrorClass::ContentFiltered => "content filtered",
        ErrorClass::Network => "network",
        ErrorClass::Unknown => "unknown",
        ErrorClass::ContentMismatch => "content mismatch",
    }
}
