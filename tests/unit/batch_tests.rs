/*!
 * Tests for batch planning and the delimiter wire protocol
 */

use subweave::errors::BatchError;
use subweave::subtitle_processor::SubtitleSegment;
use subweave::translation::{plan_batches, BatchLimits, BATCH_SEPARATOR};

use crate::common;

fn segment(index: usize, text: &str) -> SubtitleSegment {
    SubtitleSegment::new(index, index as u64 * 1_000, index as u64 * 1_000 + 500, text.to_string())
}

#[test]
fn test_plan_batches_withEntryCeiling_shouldSplitByCount() {
    let segments = common::make_segments(10);
    let limits = BatchLimits {
        max_chars: 10_000,
        max_entries: 4,
    };

    let batches = plan_batches(&segments, limits);

    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0].segments.len(), 4);
    assert_eq!(batches[1].segments.len(), 4);
    assert_eq!(batches[2].segments.len(), 2);
    // Batches are contiguous index ranges in order
    assert_eq!(batches[0].segment_indices(), vec![0, 1, 2, 3]);
    assert_eq!(batches[2].segment_indices(), vec![8, 9]);
}

#[test]
fn test_plan_batches_withCharCeiling_shouldSplitByLength() {
    let segments = vec![
        segment(0, "aaaaaaaaaa"), // 10 chars
        segment(1, "bbbbbbbbbb"),
        segment(2, "cccccccccc"),
    ];
    let limits = BatchLimits {
        max_chars: 20,
        max_entries: 100,
    };

    let batches = plan_batches(&segments, limits);

    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].segment_indices(), vec![0, 1]);
    assert_eq!(batches[1].segment_indices(), vec![2]);
}

#[test]
fn test_plan_batches_withOversizedSegment_shouldMakeSingletonBatch() {
    let segments = vec![
        segment(0, "short"),
        segment(1, &"x".repeat(500)),
        segment(2, "also short"),
    ];
    let limits = BatchLimits {
        max_chars: 50,
        max_entries: 4,
    };

    let batches = plan_batches(&segments, limits);

    assert_eq!(batches.len(), 3);
    assert_eq!(batches[1].segments.len(), 1);
    assert_eq!(batches[1].char_count(), 500);
}

#[test]
fn test_plan_batches_withNoSegments_shouldReturnNoBatches() {
    let batches = plan_batches(&[], BatchLimits::default());
    assert!(batches.is_empty());
}

#[test]
fn test_serialize_request_shouldJoinWithSeparator() {
    let batches = plan_batches(&common::make_segments(2), BatchLimits::default());
    let request = batches[0].serialize_request();

    assert_eq!(
        request,
        format!("segment number 0\n{}\nsegment number 1", BATCH_SEPARATOR)
    );
}

#[test]
fn test_parse_response_withMatchingCount_shouldSplitAndTrim() {
    let batches = plan_batches(&common::make_segments(3), BatchLimits::default());
    let reply = format!("one \n{sep}\n two\n{sep}\nthree", sep = BATCH_SEPARATOR);

    let texts = batches[0].parse_response(&reply).unwrap();
    assert_eq!(texts, vec!["one", "two", "three"]);
}

#[test]
fn test_parse_response_withWrongCount_shouldBeContentMismatch() {
    let batches = plan_batches(&common::make_segments(3), BatchLimits::default());

    let err = batches[0].parse_response("only one part").unwrap_err();
    match err {
        BatchError::ContentMismatch { expected, got } => {
            assert_eq!(expected, 3);
            assert_eq!(got, 1);
        }
        other => panic!("expected ContentMismatch, got {:?}", other),
    }
    assert!(BatchError::ContentMismatch {
        expected: 3,
        got: 1
    }
    .is_retryable());
}
