//! Whole-text conversion entry points.
//!
//! ## Why one normalize core?
//!
//! Every entry point funnels through [`normalize`]: math → structure →
//! sanitize, in that fixed order. Problem and QA extraction are thin layers
//! on top of the same normalized text, so the three stages run exactly once
//! per call and every output reports the same diagnostics and stats for the
//! same input. Malformed constructs never abort a run; they surface as
//! [`Diagnostic`]s on the output while the fatal path is reserved for
//! unusable configuration or non-text input.

use crate::config::{ExtractionStrategy, PipelineConfig};
use crate::error::{Diagnostic, Tex2CardError};
use crate::output::{
    NormalizeOutput, PipelineStage, PipelineStats, ProblemExtraction, QaExtraction, TextFragment,
};
use crate::pipeline::{math, problems, qa, sanitize, structure};
use std::time::Instant;
use tracing::{debug, info};

/// Normalize LaTeX-flavored text into card-safe HTML-ish text.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `text` — Raw input text (LaTeX fragments, plain prose, or a mix)
/// * `config` — Pipeline configuration
///
/// # Returns
/// `Ok(NormalizeOutput)` on success, even if the input contained malformed
/// constructs (check `output.diagnostics` / `output.is_clean()`).
///
/// # Errors
/// Returns `Err(Tex2CardError)` only for fatal conditions, which for this
/// entry point means a configuration that fails validation.
pub fn normalize(
    text: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<NormalizeOutput, Tex2CardError> {
    let total_start = Instant::now();
    let text = text.as_ref();
    config.validate()?;
    info!(input_len = text.len(), "starting normalization");

    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let mut trace: Vec<TextFragment> = Vec::new();
    let mut snapshot = |stage: PipelineStage, text: &str| {
        if config.capture_trace {
            trace.push(TextFragment {
                stage,
                text: text.to_string(),
            });
        }
    };

    // ── Step 1: Canonicalize math delimiters ─────────────────────────────
    let stage_start = Instant::now();
    let stage = math::normalize_math(text, config);
    let math_us = stage_start.elapsed().as_micros() as u64;
    diagnostics.extend(stage.diagnostics);
    snapshot(PipelineStage::MathNormalizer, &stage.text);
    let after_math = stage.text;

    // ── Step 2: Convert LaTeX structure to HTML ──────────────────────────
    let stage_start = Instant::now();
    let stage = structure::convert_structure(&after_math, config);
    let structure_us = stage_start.elapsed().as_micros() as u64;
    diagnostics.extend(stage.diagnostics);
    snapshot(PipelineStage::StructureConverter, &stage.text);
    let after_structure = stage.text;

    // ── Step 3: Sanitize ─────────────────────────────────────────────────
    let stage_start = Instant::now();
    let stage = sanitize::clean_text(&after_structure, config);
    let sanitize_us = stage_start.elapsed().as_micros() as u64;
    diagnostics.extend(stage.diagnostics);
    snapshot(PipelineStage::Sanitizer, &stage.text);
    let output_text = stage.text;

    // ── Step 4: Compute stats ────────────────────────────────────────────
    let stats = PipelineStats {
        input_len: text.len(),
        output_len: output_text.len(),
        diagnostics: diagnostics.len(),
        math_us,
        structure_us,
        sanitize_us,
        total_us: total_start.elapsed().as_micros() as u64,
    };

    info!(
        output_len = stats.output_len,
        diagnostics = stats.diagnostics,
        total_us = stats.total_us,
        "normalization complete"
    );

    Ok(NormalizeOutput {
        text: output_text,
        diagnostics,
        trace,
        stats,
    })
}

/// Normalize raw bytes, validating them as UTF-8 first.
///
/// This is the front door for callers holding file contents or network
/// payloads. Invalid UTF-8 is fatal: partial decoding would silently move
/// every downstream byte offset.
///
/// # Errors
/// [`Tex2CardError::InputNotText`] with the offset of the first invalid
/// byte, or any error [`normalize`] returns.
pub fn normalize_bytes(
    bytes: &[u8],
    config: &PipelineConfig,
) -> Result<NormalizeOutput, Tex2CardError> {
    let text = std::str::from_utf8(bytes).map_err(|e| Tex2CardError::InputNotText {
        valid_up_to: e.valid_up_to(),
    })?;
    normalize(text, config)
}

/// Normalize `text`, then cut it into numbered problem records with
/// chapters stamped from heading positions.
///
/// Chapter boundaries are the converted headings of level
/// `config.chapter_level` and above (an `<h1>` heading is level 1). A
/// record's chapter is the count of boundaries strictly before it, so text
/// ahead of the first heading is chapter 0.
///
/// # Errors
/// Fatal conditions only; an input with no problem markers is a valid
/// result with zero records and a [`Diagnostic::NoProblemMarkers`].
pub fn extract_problems(
    text: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<ProblemExtraction, Tex2CardError> {
    let normalized = normalize(text, config)?;
    let mut diagnostics = normalized.diagnostics;

    let boundaries = structure::heading_offsets(&normalized.text, config.chapter_level);
    debug!(boundaries = boundaries.len(), "chapter boundaries located");

    let mut segmented = problems::segment(&normalized.text, config);
    problems::assign_chapters(&mut segmented.records, &boundaries);
    diagnostics.extend(segmented.diagnostics);

    let stats = restat(normalized.stats, diagnostics.len());
    info!(
        records = segmented.records.len(),
        diagnostics = stats.diagnostics,
        "problem extraction complete"
    );

    Ok(ProblemExtraction {
        text: normalized.text,
        records: segmented.records,
        boundaries,
        diagnostics,
        stats,
    })
}

/// Normalize `text`, then extract question/answer pairs with the given
/// strategy, validate, deduplicate, and stamp chapters.
///
/// # Errors
/// Fatal conditions only; blank, incomplete, and duplicate pairs are
/// reported through `diagnostics` and the `dropped` count.
pub fn extract_qa(
    text: impl AsRef<str>,
    config: &PipelineConfig,
    strategy: ExtractionStrategy,
) -> Result<QaExtraction, Tex2CardError> {
    let normalized = normalize(text, config)?;
    let mut diagnostics = normalized.diagnostics;

    let mut extraction = qa::extract_pairs(&normalized.text, config, strategy);
    let boundaries = structure::heading_offsets(&normalized.text, config.chapter_level);
    qa::assign_chapters(&mut extraction.pairs, &boundaries);
    diagnostics.extend(extraction.diagnostics);

    let stats = restat(normalized.stats, diagnostics.len());
    info!(
        pairs = extraction.pairs.len(),
        dropped = extraction.dropped,
        diagnostics = stats.diagnostics,
        "qa extraction complete"
    );

    Ok(QaExtraction {
        text: normalized.text,
        pairs: extraction.pairs,
        dropped: extraction.dropped,
        diagnostics,
        stats,
    })
}

/// Derive a filesystem-safe filename from a display string, capped at
/// `config.max_filename_len` characters.
///
/// The config-driven form of [`sanitize_filename`]: callers writing one
/// card file per chapter or problem feed the heading text through this.
///
/// [`sanitize_filename`]: crate::sanitize_filename
pub fn derive_filename(title: impl AsRef<str>, config: &PipelineConfig) -> String {
    sanitize::sanitize_filename(title.as_ref(), config.max_filename_len)
}

/// Refresh the diagnostic count after an extraction stage added its own.
fn restat(mut stats: PipelineStats, diagnostics: usize) -> PipelineStats {
    stats.diagnostics = diagnostics;
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn test_normalize_runs_all_stages() {
        let input = "\\section{Intro}\nInline $x+1$ math.\u{200B}";
        let out = normalize(input, &cfg()).unwrap();
        assert_eq!(out.text, "<h1>Intro</h1>\nInline \\(x+1\\) math.");
        assert!(out.is_clean());
        assert_eq!(out.stats.input_len, input.len());
        assert_eq!(out.stats.output_len, out.text.len());
    }

    #[test]
    fn test_normalize_rejects_invalid_config() {
        let mut config = cfg();
        config.question_prefix.clear();
        let err = normalize("x", &config).unwrap_err();
        assert!(matches!(err, Tex2CardError::InvalidConfig(_)));
    }

    #[test]
    fn test_trace_disabled_by_default() {
        let out = normalize("plain", &cfg()).unwrap();
        assert!(out.trace.is_empty());
    }

    #[test]
    fn test_trace_captures_each_stage() {
        let config = PipelineConfig::builder().capture_trace(true).build().unwrap();
        let out = normalize("$x$ and \\textbf{bold}", &config).unwrap();
        let stages: Vec<_> = out.trace.iter().map(|f| f.stage).collect();
        assert_eq!(
            stages,
            vec![
                PipelineStage::MathNormalizer,
                PipelineStage::StructureConverter,
                PipelineStage::Sanitizer,
            ]
        );
        assert_eq!(out.trace[2].text, out.text);
    }

    #[test]
    fn test_normalize_bytes_valid_utf8() {
        let out = normalize_bytes("caf\u{e9} $x$".as_bytes(), &cfg()).unwrap();
        assert_eq!(out.text, "caf\u{e9} \\(x\\)");
    }

    #[test]
    fn test_normalize_bytes_invalid_utf8() {
        let err = normalize_bytes(&[b'o', b'k', 0xFF, b'x'], &cfg()).unwrap_err();
        assert!(matches!(err, Tex2CardError::InputNotText { valid_up_to: 2 }));
    }

    #[test]
    fn test_extract_problems_end_to_end() {
        let input = "\\section{One}\n1. First problem.\n\\section{Two}\n1. Restarts here.";
        let out = extract_problems(input, &cfg()).unwrap();
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].chapter, 1);
        assert_eq!(out.records[1].chapter, 2);
        assert_eq!(out.boundaries.len(), 2);
    }

    #[test]
    fn test_extract_problems_without_markers() {
        let out = extract_problems("no numbering at all", &cfg()).unwrap();
        assert!(out.records.is_empty());
        assert!(matches!(out.diagnostics[0], Diagnostic::NoProblemMarkers));
        assert_eq!(out.stats.diagnostics, 1);
    }

    #[test]
    fn test_extract_qa_end_to_end() {
        let input = "Q: What is $e$?\nA: Euler's number.";
        let out = extract_qa(input, &cfg(), ExtractionStrategy::Strict).unwrap();
        assert_eq!(out.pairs.len(), 1);
        assert_eq!(out.pairs[0].question, "What is \\(e\\)?");
        assert_eq!(out.pairs[0].chapter, Some(0));
        assert_eq!(out.dropped, 0);
    }

    #[test]
    fn test_extract_qa_stamps_chapters_from_headings() {
        let input = "\\section{Algebra}\nQ: a?\nA: b.\n\\section{Calculus}\nQ: c?\nA: d.";
        let out = extract_qa(input, &cfg(), ExtractionStrategy::Strict).unwrap();
        assert_eq!(out.pairs.len(), 2);
        assert_eq!(out.pairs[0].chapter, Some(1));
        assert_eq!(out.pairs[1].chapter, Some(2));
    }

    #[test]
    fn test_derive_filename_honours_configured_cap() {
        let config = PipelineConfig::builder()
            .max_filename_len(10)
            .build()
            .unwrap();
        assert_eq!(
            derive_filename("A very long chapter title", &config),
            "A_very_lon"
        );
        assert_eq!(derive_filename("Bayes' rule", &cfg()), "Bayes_rule");
    }
}
