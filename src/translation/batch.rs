/*!
 * Batch planning and the delimiter wire protocol.
 *
 * Segments are grouped greedily in order under two ceilings (total characters
 * and entry count) and joined with a reserved separator token. The provider is
 * asked to keep the separator and segment count intact; replies that split
 * back into a different number of segments are a `ContentMismatch`.
 */

use crate::app_config::TranslationConfig;
use crate::errors::BatchError;
use crate::subtitle_processor::SubtitleSegment;

/// Reserved separator between segments on the wire.
///
/// Deliberately not a structured format: minor formatting drift in the reply
/// (spacing, quoting, stray newlines) must not break parsing the way it would
/// with JSON.
pub const BATCH_SEPARATOR: &str = "%%";

/// Ceilings for one translation batch
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    /// Maximum total characters of source text per batch
    pub max_chars: usize,
    /// Maximum number of segments per batch
    pub max_entries: usize,
}

impl BatchLimits {
    pub fn from_config(config: &TranslationConfig) -> Self {
        Self {
            max_chars: config.batch_max_chars,
            max_entries: config.batch_max_entries,
        }
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_chars: 1200,
            max_entries: 4,
        }
    }
}

/// An ordered group of segments sent to a provider in one request
#[derive(Debug, Clone)]
pub struct TranslationBatch {
    /// Position of this batch within the job's batch sequence
    pub batch_index: usize,
    /// The segments assigned to this batch, in original order
    pub segments: Vec<SubtitleSegment>,
}

impl TranslationBatch {
    /// Original segment indices covered by this batch
    pub fn segment_indices(&self) -> Vec<usize> {
        self.segments.iter().map(|s| s.index).collect()
    }

    /// Total source characters in this batch
    pub fn char_count(&self) -> usize {
        self.segments
            .iter()
            .map(|s| s.source_text.chars().count())
            .sum()
    }

    /// Join the segment texts with the separator token
    pub fn serialize_request(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.source_text.as_str())
            .collect::<Vec<_>>()
            .join(&format!("\n{}\n", BATCH_SEPARATOR))
    }

    /// Split a provider reply back into per-segment texts.
    ///
    /// The count must match the batch exactly; anything else is a
    /// `ContentMismatch` and goes through the retry path.
    pub fn parse_response(&self, reply: &str) -> Result<Vec<String>, BatchError> {
        let parts: Vec<String> = reply
            .split(BATCH_SEPARATOR)
            .map(|part| part.trim().to_string())
            .collect();

        if parts.len() != self.segments.len() {
            return Err(BatchError::ContentMismatch {
                expected: self.segments.len(),
                got: parts.len(),
            });
        }

        Ok(parts)
    }
}

/// Walk segments in order and accumulate batches under both ceilings.
///
/// A single segment whose own length exceeds the character ceiling becomes a
/// batch of one; splitting text mid-sentence is not allowed.
pub fn plan_batches(segments: &[SubtitleSegment], limits: BatchLimits) -> Vec<TranslationBatch> {
    let mut batches: Vec<TranslationBatch> = Vec::new();
    let mut current: Vec<SubtitleSegment> = Vec::new();
    let mut current_chars = 0usize;

    for segment in segments {
        let segment_chars = segment.source_text.chars().count();
        let would_overflow = !current.is_empty()
            && (current_chars + segment_chars > limits.max_chars
                || current.len() + 1 > limits.max_entries);

        if would_overflow {
            batches.push(TranslationBatch {
                batch_index: batches.len(),
                segments: std::mem::take(&mut current),
            });
            current_chars = 0;
        }

        current_chars += segment_chars;
        current.push(segment.clone());
    }

    if !current.is_empty() {
        batches.push(TranslationBatch {
            batch_index: batches.len(),
            segments: current,
        });
    }

    batches
}
