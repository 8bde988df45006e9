//! Output types returned by the pipeline entry points.
//!
//! Every entry point returns a rich output struct rather than a bare
//! `String`: the normalized text plus the [`Diagnostic`]s tolerated along
//! the way, per-stage timing in [`PipelineStats`], and (opt-in) a
//! stage-by-stage [`TextFragment`] trace. Malformed input shows up *here*,
//! inside a successful output, never as an `Err` — callers that want
//! strictness can check [`NormalizeOutput::is_clean`] and escalate
//! themselves.

use crate::error::Diagnostic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which pipeline stage produced a [`TextFragment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    /// Math delimiter canonicalization.
    MathNormalizer,
    /// LaTeX structure (tables, headings, images, lists) conversion.
    StructureConverter,
    /// HTML sanitization.
    Sanitizer,
}

/// A stage-tagged snapshot of the working text.
///
/// Captured only when [`crate::PipelineConfig::capture_trace`] is set;
/// purely a debugging aid, never required for correctness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFragment {
    pub stage: PipelineStage,
    pub text: String,
}

/// The common return of each text→text stage: the rewritten text plus the
/// non-fatal conditions tolerated while producing it.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl StageOutput {
    /// A clean output carrying no diagnostics.
    pub fn clean(text: String) -> Self {
        Self {
            text,
            diagnostics: Vec::new(),
        }
    }
}

/// Timing and size accounting for one pipeline run.
///
/// Durations are wall-clock microseconds per stage. `diagnostics` is the
/// total count across stages (the diagnostics themselves ride on the output
/// struct).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub input_len: usize,
    pub output_len: usize,
    pub diagnostics: usize,
    pub math_us: u64,
    pub structure_us: u64,
    pub sanitize_us: u64,
    pub total_us: u64,
}

/// Result of the composed normalize pipeline (math → structure → sanitize).
#[derive(Debug, Clone)]
pub struct NormalizeOutput {
    /// The normalized, sanitized text.
    pub text: String,
    /// Diagnostics from all stages, in stage order.
    pub diagnostics: Vec<Diagnostic>,
    /// Post-stage snapshots; empty unless `capture_trace` was set.
    pub trace: Vec<TextFragment>,
    pub stats: PipelineStats,
}

impl NormalizeOutput {
    /// True when no stage recorded a diagnostic.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// One extracted problem statement.
///
/// `start` is the byte offset of the problem marker in the normalized text;
/// chapter assignment and the numbering checks key off it. `chapter == 0`
/// means no chapter boundary precedes the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemRecord {
    pub number: u32,
    pub chapter: u32,
    pub start: usize,
    pub statement: String,
}

/// One extracted question/answer pair.
///
/// Both fields are non-empty after trimming; pairs violating that are never
/// materialized (see [`Diagnostic::BlankQaField`]). `tags` is left empty by
/// extraction and filled by the caller. `chapter` is `None` until the
/// chapter pass stamps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QAPair {
    pub question: String,
    pub answer: String,
    pub tags: BTreeSet<String>,
    pub chapter: Option<u32>,
    /// Byte offset of the question's first line in the extracted-from text.
    pub start: usize,
}

/// A cloze-deletion card body: full text plus the byte range to blank.
///
/// `blanked_span` is always a valid char-boundary range into `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClozeRecord {
    pub text: String,
    pub blanked_span: (usize, usize),
}

impl ClozeRecord {
    /// The substring selected for blanking.
    pub fn blanked(&self) -> &str {
        &self.text[self.blanked_span.0..self.blanked_span.1]
    }

    /// Render the `{{cN::…}}` cloze syntax used by card renderers.
    ///
    /// `ordinal` is the 1-based cloze index (the `N` in `{{cN::…}}`).
    pub fn to_anki_text(&self, ordinal: u32) -> String {
        let (start, end) = self.blanked_span;
        format!(
            "{}{{{{c{}::{}}}}}{}",
            &self.text[..start],
            ordinal,
            &self.text[start..end],
            &self.text[end..]
        )
    }
}

/// Result of [`crate::extract_problems`].
#[derive(Debug, Clone)]
pub struct ProblemExtraction {
    /// The normalized text the records were cut from.
    pub text: String,
    pub records: Vec<ProblemRecord>,
    /// Byte offsets of chapter-boundary headings in `text`, ascending.
    pub boundaries: Vec<usize>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: PipelineStats,
}

impl ProblemExtraction {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Result of [`crate::extract_qa`].
#[derive(Debug, Clone)]
pub struct QaExtraction {
    /// The normalized text the pairs were cut from.
    pub text: String,
    pub pairs: Vec<QAPair>,
    /// Count of candidate pairs dropped during validation and deduplication.
    pub dropped: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: PipelineStats,
}

impl QaExtraction {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloze_renders_anki_syntax() {
        let record = ClozeRecord {
            text: "Capital of France? Paris".to_string(),
            blanked_span: (19, 24),
        };
        assert_eq!(record.blanked(), "Paris");
        assert_eq!(
            record.to_anki_text(1),
            "Capital of France? {{c1::Paris}}"
        );
        assert_eq!(
            record.to_anki_text(2),
            "Capital of France? {{c2::Paris}}"
        );
    }

    #[test]
    fn cloze_renders_mid_text_span() {
        let record = ClozeRecord {
            text: "The answer is 42 exactly".to_string(),
            blanked_span: (14, 16),
        };
        assert_eq!(record.to_anki_text(1), "The answer is {{c1::42}} exactly");
    }

    #[test]
    fn problem_record_serializes() {
        let record = ProblemRecord {
            number: 3,
            chapter: 1,
            start: 120,
            statement: "Compute the determinant.".to_string(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: ProblemRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
