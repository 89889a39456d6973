/*!
 * Batch translation engine.
 *
 * This module turns an ordered list of subtitle segments into bilingual
 * segments by way of size-bounded batches, a delimiter wire protocol, and a
 * retry/fallback state machine per batch. It is split into submodules:
 *
 * - `batch`: batch planning and the delimiter codec
 * - `retry`: error classification and jittered exponential backoff
 * - `engine`: concurrent dispatch, fallback and reassembly
 */

pub use self::batch::{plan_batches, BatchLimits, TranslationBatch, BATCH_SEPARATOR};
pub use self::engine::{BatchTranslationEngine, TranslationOutcome};
pub use self::retry::{ErrorClass, RetryContext, RetryPolicy, JITTER_MAX, JITTER_MIN};

pub mod batch;
pub mod engine;
pub mod retry;
