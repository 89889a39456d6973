/*!
 * Tests for the worker message codec
 */

use std::path::PathBuf;

use subweave::errors::JobError;
use subweave::scheduler::ipc::{decode, encode};
use subweave::scheduler::{JobId, Stage, WorkerMessage};

#[test]
fn test_codec_shouldRoundTripEveryVariant() {
    let messages = vec![
        WorkerMessage::Progress {
            percent: 40,
            stage: Stage::Translating,
        },
        WorkerMessage::Log {
            level: "info".to_string(),
            text: "extracting audio".to_string(),
        },
        WorkerMessage::Completed {
            output_paths: vec![PathBuf::from("movie_bilingual.srt")],
            degraded_batches: 1,
        },
        WorkerMessage::Error {
            error: JobError::ExtractionTimeout(300),
        },
    ];

    for message in messages {
        let line = encode(&message).unwrap();
        // One JSON object per line, no embedded newlines
        assert!(!line.contains('\n'));
        assert_eq!(decode(&line).unwrap(), message);
    }
}

#[test]
fn test_encode_progress_shouldUseStableWireNames() {
    let line = encode(&WorkerMessage::Progress {
        percent: 20,
        stage: Stage::Transcribing,
    })
    .unwrap();

    assert!(line.contains("\"type\":\"progress\""));
    assert!(line.contains("\"stage\":\"transcribing\""));
}

#[test]
fn test_job_id_shouldRoundTripThroughJson() {
    let id = JobId::new();
    let json = serde_json::to_string(&id).unwrap();
    let back: JobId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn test_decode_withGarbage_shouldFail() {
    assert!(decode("not json at all").is_err());
    assert!(decode("{\"type\":\"no_such_message\"}").is_err());
}
