/*!
 * # subweave - bilingual subtitles for your videos
 *
 * A Rust library and CLI for turning videos into bilingually subtitled ones:
 * extract the audio track, recognize speech, translate the transcript in
 * batches and optionally burn the result back into the video.
 *
 * ## Features
 *
 * - Parallel processing of many videos, each in an isolated worker process
 * - Concurrency ceiling derived from the detected hardware tier
 * - Batch translation with retry, backoff and a fallback provider
 * - Degraded delivery: a batch that cannot be translated keeps its source
 *   text instead of failing the whole job
 * - Bilingual SRT output, with optional ffmpeg burn-in
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `platform`: Hardware detection and concurrency defaults
 * - `scheduler`: Bounded-concurrency process scheduler and worker IPC
 * - `pipeline`: The per-video worker pipeline
 * - `media`: ffmpeg/whisper boundaries for extraction, transcription, burn-in
 * - `subtitle_processor`: SRT parsing and bilingual output
 * - `translation`: Batch planning, retry/fallback engine
 * - `providers`: Translation API clients
 * - `file_utils`: File system operations and cache paths
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod errors;
pub mod file_utils;
pub mod media;
pub mod pipeline;
pub mod platform;
pub mod providers;
pub mod scheduler;
pub mod subtitle_processor;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::{Config, ConcurrencyLimit};
pub use errors::{AppError, BatchError, JobError, ProviderError};
pub use scheduler::{JobId, JobState, Scheduler, SchedulerEvent, SchedulerHandle, Stage};
pub use subtitle_processor::{SubtitleDocument, SubtitleSegment};
pub use translation::BatchTranslationEngine;
