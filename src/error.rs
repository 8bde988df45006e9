//! Error types for the tex2card library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Tex2CardError`] — **Fatal**: the pipeline cannot run at all (input is
//!   not text, the configuration failed validation). Returned as
//!   `Err(Tex2CardError)` from the top-level entry points.
//!
//! * [`Diagnostic`] — **Non-fatal**: the input contained something malformed
//!   (an unclosed `$`, a ragged table row, a question with no answer) that
//!   the pipeline tolerated and carried past. Stored inside the output
//!   structs so callers can inspect what was patched over rather than losing
//!   the whole run to one bad line.
//!
//! The separation lets callers decide their own tolerance: treat any
//! diagnostic as a hard failure, log and continue, or collect them all for a
//! post-run report.

use thiserror::Error;

/// All fatal errors returned by the tex2card library.
///
/// Malformed *content* never lands here; it becomes a [`Diagnostic`] stored
/// in the stage outputs instead.
#[derive(Debug, Error)]
pub enum Tex2CardError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input bytes are not valid UTF-8 text.
    #[error("Input is not text: invalid UTF-8 at byte {valid_up_to}\nDecode or transcode the input before handing it to the pipeline.")]
    InputNotText { valid_up_to: usize },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (a contract breach, not bad user text).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal condition tolerated while processing one input.
///
/// Collected in stage outputs and aggregated by the top-level entry points.
/// The run continues past every one of these.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum Diagnostic {
    /// A math opener had no matching closer; it was left as literal text.
    #[error("unmatched math delimiter {delimiter:?} at byte {offset}; left as literal text")]
    UnmatchedMathDelimiter { offset: usize, delimiter: String },

    /// A table row's cell count differs from the header row's.
    #[error("table row {row} has {cells} cell(s) but the header declares {expected}; row kept verbatim")]
    MalformedTableRow {
        row: usize,
        cells: usize,
        expected: usize,
    },

    /// Problem extraction ran over input containing no problem markers.
    #[error("no problem markers found; returning zero records")]
    NoProblemMarkers,

    /// A problem number was smaller than its predecessor's.
    #[error("problem {number} at byte {offset} follows problem {previous}; numbering kept as written")]
    OutOfOrderProblemNumber {
        offset: usize,
        number: u32,
        previous: u32,
    },

    /// A question with no answer (strict mode), or a segment with a question
    /// block but no answer blocks (flexible mode).
    #[error("question at byte {offset} has no answer; pair dropped")]
    IncompleteQaPair { offset: usize },

    /// Flexible extraction saw a segment with no content at all.
    #[error("empty block at byte {offset}; skipped")]
    EmptyBlock { offset: usize },

    /// A pair's question or answer was blank after trimming.
    #[error("pair at byte {offset} has a blank {field}; pair dropped")]
    BlankQaField { offset: usize, field: String },

    /// A question exactly duplicated an earlier one; the first was kept.
    #[error("duplicate question at byte {offset}; first occurrence kept")]
    DuplicateQuestion { offset: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_not_text_display() {
        let e = Tex2CardError::InputNotText { valid_up_to: 7 };
        let msg = e.to_string();
        assert!(msg.contains("byte 7"), "got: {msg}");
        assert!(msg.contains("not text"), "got: {msg}");
    }

    #[test]
    fn invalid_config_display() {
        let e = Tex2CardError::InvalidConfig("question_prefix is empty".into());
        assert!(e.to_string().contains("question_prefix is empty"));
    }

    #[test]
    fn malformed_table_row_display() {
        let d = Diagnostic::MalformedTableRow {
            row: 2,
            cells: 4,
            expected: 3,
        };
        let msg = d.to_string();
        assert!(msg.contains("row 2"), "got: {msg}");
        assert!(msg.contains("4 cell(s)"), "got: {msg}");
        assert!(msg.contains("declares 3"), "got: {msg}");
    }

    #[test]
    fn unmatched_delimiter_display() {
        let d = Diagnostic::UnmatchedMathDelimiter {
            offset: 12,
            delimiter: "$".into(),
        };
        assert!(d.to_string().contains("byte 12"));
        assert!(d.to_string().contains("\"$\""));
    }

    #[test]
    fn diagnostic_round_trips_through_json() {
        let d = Diagnostic::DuplicateQuestion { offset: 40 };
        let json = serde_json::to_string(&d).unwrap();
        let back: Diagnostic = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, Diagnostic::DuplicateQuestion { offset: 40 }));
    }
}
