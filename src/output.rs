//! JSON responses written by the CLI.
//!
//! Every command that does not stream TSV answers with one JSON object on
//! stdout carrying `status` and `schema_version`. Errors use the same
//! envelope with an `error` object whose `code` is the process exit code.

use std::io::{self, Write};

use serde::Serialize;

use faultline_core::condition::{CandidateCondition, ConditionPair};

use crate::error::{FaultlineError, OutputErrorCode};
use crate::predict::PredictReport;

/// Current schema version of every response.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Responses
// ============================================================================

/// Response for `faultline extract --out`.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractResponse {
    pub status: String,
    pub schema_version: String,
    /// Sites read from the input.
    pub sites: usize,
    /// Rows written (sites with a complete row).
    pub rows: usize,
    /// Destination file.
    pub out: String,
}

impl ExtractResponse {
    pub fn new(sites: usize, rows: usize, out: impl Into<String>) -> Self {
        ExtractResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            sites,
            rows,
            out: out.into(),
        }
    }
}

/// Response for `faultline predict`.
#[derive(Debug, Clone, Serialize)]
pub struct PredictResponse {
    pub status: String,
    pub schema_version: String,
    pub subject: String,
    /// Both condition sets, as returned to patch generation.
    pub conditions: ConditionPair,
    /// Right-hand candidates by descending probability.
    pub ranked: Vec<CandidateCondition>,
    pub report: PredictReport,
}

impl PredictResponse {
    pub fn new(subject: impl Into<String>, conditions: ConditionPair, report: PredictReport) -> Self {
        let ranked = conditions.right.ranked().into_iter().cloned().collect();
        PredictResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            subject: subject.into(),
            conditions,
            ranked,
            report,
        }
    }
}

/// Error details inside an [`ErrorResponse`].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorInfo {
    /// Numeric error code, also the process exit code.
    pub code: u8,
    pub message: String,
}

impl ErrorInfo {
    pub fn from_error(err: &FaultlineError) -> Self {
        ErrorInfo {
            code: OutputErrorCode::from(err).code(),
            message: err.to_string(),
        }
    }
}

/// Error envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub schema_version: String,
    pub error: ErrorInfo,
}

impl ErrorResponse {
    pub fn from_error(err: &FaultlineError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

// ============================================================================
// Emit
// ============================================================================

/// Emit a response as pretty JSON to a writer.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_carries_code_and_message() {
        let err = FaultlineError::invalid_args("--sites is required");
        let mut buf = Vec::new();
        emit_response(&ErrorResponse::from_error(&err), &mut buf).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["schema_version"], SCHEMA_VERSION);
        assert_eq!(value["error"]["code"], 2);
        assert_eq!(
            value["error"]["message"],
            "invalid arguments: --sites is required"
        );
    }

    #[test]
    fn predict_response_ranks_right_side() {
        let mut pair = ConditionPair::new();
        pair.right.insert(CandidateCondition::new("x > 0", "0.2"));
        pair.right.insert(CandidateCondition::new("x == null", "0.9"));

        let response = PredictResponse::new("chart_1", pair, PredictReport::default());
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["ranked"][0]["condition"], "x == null");
        assert_eq!(value["ranked"][1]["condition"], "x > 0");
        assert_eq!(value["conditions"]["left"], serde_json::json!([]));
        assert_eq!(value["report"]["accepted"], 0);
    }
}
