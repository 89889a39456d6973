/*!
 * Worker-to-controller message protocol.
 *
 * One JSON object per line over the worker's stdout. The stream is
 * one-directional; messages from a single worker arrive in emission order.
 * The worker's stdin is reserved for the cancellation request (a `CANCEL`
 * line, or EOF when the controller drops its end).
 */

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::JobError;
use crate::scheduler::job::Stage;

/// Cooperative cancellation request written to the worker's stdin
pub const CANCEL_LINE: &str = "CANCEL";

/// Messages a worker emits while processing its job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Stage and percent update
    Progress { percent: u8, stage: Stage },

    /// Log line to surface through the controller's logger
    Log { level: String, text: String },

    /// Terminal success report
    Completed {
        output_paths: Vec<PathBuf>,
        degraded_batches: usize,
    },

    /// Terminal failure report
    Error { error: JobError },
}

/// Serialize a message to a single line
pub fn encode(message: &WorkerMessage) -> Result<String> {
    serde_json::to_string(message).context("Failed to encode worker message")
}

/// Parse a single line back into a message
pub fn decode(line: &str) -> Result<WorkerMessage> {
    serde_json::from_str(line.trim()).context("Failed to decode worker message")
}
