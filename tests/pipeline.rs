//! End-to-end integration tests for tex2card.
//!
//! Every test drives the crate through its public surface only — the
//! composed entry points in [`tex2card::convert`] plus the re-exported
//! stage functions — on in-memory documents. The pipeline is pure, so
//! nothing here is gated and the whole suite runs in milliseconds.
//!
//! Run with:
//!   cargo test --test pipeline
//!
//! To restrict to a specific test:
//!   cargo test --test pipeline test_strict_qa_two_pairs -- --nocapture
//!
//! To see the stage-level tracing output:
//!   RUST_LOG=tex2card=debug cargo test --test pipeline -- --nocapture

use std::sync::Once;
use tex2card::{
    derive_filename, extract_pairs, extract_problems, extract_qa, make_cloze, normalize,
    normalize_bytes, sanitize_filename, ClozePolicy, Diagnostic, ExtractionStrategy,
    PipelineConfig, ProblemRecord, QAPair, Tex2CardError,
};
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

static TRACING: Once = Once::new();

/// Install the log subscriber once per test binary. Filtering follows
/// `RUST_LOG`; without it only warnings surface.
fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

fn cfg() -> PipelineConfig {
    init_tracing();
    PipelineConfig::default()
}

/// Assert that normalized text honours the cleanup guarantees the pipeline
/// promises to card renderers.
fn assert_card_safe(text: &str, context: &str) {
    // No invisible Unicode junk
    let invisible = [
        '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
    ];
    for ch in invisible {
        assert!(
            !text.contains(ch),
            "[{context}] output contains invisible char U+{:04X}",
            ch as u32
        );
    }

    // Disallowed elements must be gone in any casing
    let lower = text.to_ascii_lowercase();
    for tag in ["<script", "<style", "<iframe"] {
        assert!(!lower.contains(tag), "[{context}] output contains {tag}");
    }

    // At most one blank line in a row
    assert!(
        !text.contains("\n\n\n"),
        "[{context}] output has more than one consecutive blank line"
    );

    // No trailing whitespace on any line
    for line in text.lines() {
        assert_eq!(
            line,
            line.trim_end(),
            "[{context}] line has trailing whitespace"
        );
    }

    println!("[{context}] ✓  {} bytes, card-safety checks passed", text.len());
}

// ── Normalization scenarios ──────────────────────────────────────────────────

/// Already-canonical input passes through untouched.
#[test]
fn test_canonical_math_is_untouched() {
    let input = "Here is math: \\(x^2+y^2=z^2\\)";
    let out = normalize(input, &cfg()).unwrap();

    assert_eq!(out.text, input);
    assert!(out.is_clean());
    assert_eq!(out.stats.input_len, out.stats.output_len);
}

/// Running the pipeline on its own output changes nothing, across every
/// delimiter style and the blank-line collapse.
#[test]
fn test_normalize_is_idempotent() {
    let inputs = [
        "Here is math: \\(x^2+y^2=z^2\\)",
        "Mixed $a < b$ and $$c\nd$$ styles",
        "\\section{Sets}\nA set is a collection.\n\n\n\nSpacing collapses.",
        "price is $5 with an unmatched dollar",
        "P(X<3) compares, <b>bold</b> stays, a<b gets escaped",
        // Removing the inner tail splices a fresh one out of this input.
        "\\end{docu\\end{document}ment}",
    ];
    for input in inputs {
        let once = normalize(input, &cfg()).unwrap();
        let twice = normalize(&once.text, &cfg()).unwrap();
        assert_eq!(twice.text, once.text, "second pass changed {input:?}");
        assert_card_safe(&once.text, "idempotence");
    }
}

#[test]
fn test_mixed_delimiters_canonicalized() {
    let out = normalize("Mixed $a < b$ and $$c\nd$$ styles", &cfg()).unwrap();

    // `$…$` and `$$…$$` both land on the canonical inline form; the display
    // span loses its interior newline and the comparison becomes an entity.
    assert_eq!(out.text, "Mixed \\(a &lt; b\\) and \\(cd\\) styles");
    assert!(out.is_clean());
}

/// An unmatched opener is tolerated: the text keeps the literal character
/// and the run reports a diagnostic instead of failing.
#[test]
fn test_unmatched_dollar_is_tolerated() {
    let input = "price is $5 with an unmatched dollar";
    let out = normalize(input, &cfg()).unwrap();

    assert_eq!(out.text, input);
    assert!(!out.is_clean());
    assert!(matches!(
        &out.diagnostics[0],
        Diagnostic::UnmatchedMathDelimiter { offset: 9, delimiter } if delimiter == "$"
    ));
    assert_eq!(out.stats.diagnostics, 1);
}

#[test]
fn test_non_utf8_bytes_are_fatal() {
    let ok = normalize_bytes("\\(x\\) ok".as_bytes(), &cfg()).unwrap();
    assert_eq!(ok.text, "\\(x\\) ok");

    let err = normalize_bytes(&[b'f', b'o', 0x80], &cfg()).unwrap_err();
    assert!(matches!(err, Tex2CardError::InputNotText { valid_up_to: 2 }));
}

// ── Table handling ───────────────────────────────────────────────────────────

#[test]
fn test_well_formed_table_keeps_column_count() {
    let input = "\\begin{tabular}{ccc}\na & b & c \\\\\n1 & 2 & 3 \\\\\n4 & 5 & 6\n\\end{tabular}";
    let out = normalize(input, &cfg()).unwrap();

    assert_eq!(out.text.matches("<th>").count(), 3);
    assert_eq!(out.text.matches("<td>").count(), 6);
    assert!(out.is_clean());
    assert_card_safe(&out.text, "table");
}

/// A short row is preserved literally in a full-width cell and reported,
/// never silently padded or dropped.
#[test]
fn test_malformed_table_row_preserved() {
    let input = "\\begin{tabular}{ccc}\na & b & c \\\\\n1 & 2\n\\end{tabular}";
    let out = normalize(input, &cfg()).unwrap();

    assert!(
        out.text.contains("<td colspan=\"3\">1 & 2</td>"),
        "short row must keep its cells verbatim, got: {}",
        out.text
    );
    assert!(matches!(
        out.diagnostics[0],
        Diagnostic::MalformedTableRow {
            row: 2,
            cells: 2,
            expected: 3
        }
    ));

    // Formatting commands in a short row survive as written; the unwrap
    // that cleans well-formed cells never touches the fallback text.
    let styled = "\\begin{tabular}{ccc}\na & b & c \\\\\n\\textbf{1} & 2\n\\end{tabular}";
    let out = normalize(styled, &cfg()).unwrap();
    assert!(
        out.text.contains("<td colspan=\"3\">\\textbf{1} & 2</td>"),
        "styled short row must keep every character, got: {}",
        out.text
    );
}

// ── Problem extraction ───────────────────────────────────────────────────────

#[test]
fn test_problem_numbering_and_chapters() {
    let input = "\\section{Counting}\n1. How many subsets?\n2. How many pairs?\n\\section{Graphs}\n1. Draw the complete graph on four vertices.";
    let out = extract_problems(input, &cfg()).unwrap();

    assert_eq!(out.records.len(), 3);
    let numbers: Vec<u32> = out.records.iter().map(|r| r.number).collect();
    assert_eq!(numbers, vec![1, 2, 1]);
    assert_eq!(out.records[0].statement, "How many subsets?");
    assert_eq!(
        out.records[2].statement,
        "Draw the complete graph on four vertices."
    );

    // Chapter = number of boundaries strictly before the record start,
    // so the numbering never runs backwards within one chapter.
    let chapters: Vec<u32> = out.records.iter().map(|r| r.chapter).collect();
    assert_eq!(chapters, vec![1, 1, 2]);
    for record in &out.records {
        let preceding = out.boundaries.iter().filter(|b| **b < record.start).count() as u32;
        assert_eq!(record.chapter, preceding);
    }

    // The restart at the chapter boundary is reported, not fatal.
    assert!(matches!(
        out.diagnostics[0],
        Diagnostic::OutOfOrderProblemNumber {
            number: 1,
            previous: 2,
            ..
        }
    ));
}

#[test]
fn test_keyword_markers_inside_headings() {
    init_tracing();
    let config = PipelineConfig::builder()
        .problem_keyword("Problem")
        .build()
        .unwrap();
    let input = "\\section{Problem 1}\nShow the base case.\n\\section{Problem 2}\nShow the step.";
    let out = extract_problems(input, &config).unwrap();

    assert_eq!(out.records.len(), 2);
    assert_eq!(out.records[0].number, 1);
    assert_eq!(out.records[0].statement, "Show the base case.");
    assert_eq!(out.records[1].statement, "Show the step.");

    // A heading at the record's own start is not a preceding boundary.
    let chapters: Vec<u32> = out.records.iter().map(|r| r.chapter).collect();
    assert_eq!(chapters, vec![0, 1]);
}

// ── Q/A extraction ───────────────────────────────────────────────────────────

#[test]
fn test_strict_qa_two_pairs() {
    let input = "Q: What is 2+2?\nA: 4\n\nQ: What is 3+3?\nA: 6";
    let out = extract_qa(input, &cfg(), ExtractionStrategy::Strict).unwrap();

    assert_eq!(out.pairs.len(), 2);
    assert_eq!(out.pairs[0].question, "What is 2+2?");
    assert_eq!(out.pairs[0].answer, "4");
    assert_eq!(out.pairs[1].question, "What is 3+3?");
    assert_eq!(out.pairs[1].answer, "6");
    assert_eq!(out.dropped, 0);
    assert!(out.is_clean());
}

/// A question with no answer yields no pair and a diagnostic at its offset.
#[test]
fn test_strict_qa_skips_unanswered_question() {
    let input = "Q: Unanswered question?\n\nQ: Next?\nA: Yes";
    let out = extract_qa(input, &cfg(), ExtractionStrategy::Strict).unwrap();

    assert_eq!(out.pairs.len(), 1);
    assert_eq!(out.pairs[0].question, "Next?");
    assert_eq!(out.pairs[0].answer, "Yes");
    assert!(matches!(
        out.diagnostics[0],
        Diagnostic::IncompleteQaPair { offset: 0 }
    ));
    // Incomplete candidates never existed as pairs, so nothing was dropped.
    assert_eq!(out.dropped, 0);
}

/// Whatever the input throws at the extractor, an emitted pair never has a
/// blank question or answer, and the dropped count explains the losses.
#[test]
fn test_qa_pairs_are_never_blank() {
    let input = "Q: Good?\nA: Yes.\nQ: Blank?\nA:\nQ:\nA: orphan answer\nQ: Good?\nA: Duplicate.";
    let out = extract_qa(input, &cfg(), ExtractionStrategy::Strict).unwrap();

    for pair in &out.pairs {
        assert!(!pair.question.trim().is_empty());
        assert!(!pair.answer.trim().is_empty());
    }
    // blank answer + blank question + duplicate question
    assert_eq!(out.pairs.len(), 1);
    assert_eq!(out.dropped, 3);
    assert_eq!(out.pairs[0].answer, "Yes.");
}

/// Through the composed entry point the sanitizer caps blank runs at one
/// line, so a flexible run turns one prose note into exactly one pair:
/// first block the question, the rest concatenated into the answer.
#[test]
fn test_flexible_note_becomes_one_pair() {
    let note = "State Bayes' rule.\n\nPosterior equals likelihood times prior over evidence.\n\nIt renormalizes the prior.";
    let out = extract_qa(note, &cfg(), ExtractionStrategy::Flexible).unwrap();

    assert_eq!(out.pairs.len(), 1);
    assert_eq!(out.pairs[0].question, "State Bayes' rule.");
    assert_eq!(
        out.pairs[0].answer,
        "Posterior equals likelihood times prior over evidence.\n\nIt renormalizes the prior."
    );
    assert_eq!(out.pairs[0].chapter, Some(0));
}

/// On raw text the flexible stage still splits at wide gaps; that path is
/// reached by calling the stage directly instead of the composed pipeline.
#[test]
fn test_flexible_raw_text_splits_on_wide_gaps() {
    let raw = "Why is the sky blue?\n\nRayleigh scattering.\n\n\n\nWhat causes tides?\n\nLunar gravity.";
    let out = extract_pairs(raw, &cfg(), ExtractionStrategy::Flexible);

    assert_eq!(out.pairs.len(), 2);
    assert_eq!(out.pairs[0].answer, "Rayleigh scattering.");
    assert_eq!(out.pairs[1].question, "What causes tides?");
}

#[test]
fn test_config_from_json_drives_extraction() {
    init_tracing();
    let config = PipelineConfig::from_json(
        r#"{"question_prefix": "Frage:", "answer_prefix": "Antwort:"}"#,
    )
    .unwrap();
    let out = extract_qa(
        "Frage: Wie heisst das?\nAntwort: So.",
        &config,
        ExtractionStrategy::Strict,
    )
    .unwrap();

    assert_eq!(out.pairs.len(), 1);
    assert_eq!(out.pairs[0].question, "Wie heisst das?");
    assert_eq!(out.pairs[0].answer, "So.");
}

// ── Cloze generation ─────────────────────────────────────────────────────────

#[test]
fn test_cloze_from_extracted_pair() {
    let input = "Q: Capital of France?\nA: The capital is [[Paris]].";
    let out = extract_qa(input, &cfg(), ExtractionStrategy::Strict).unwrap();

    let policy = ClozePolicy::Marker {
        open: "[[".to_string(),
        close: "]]".to_string(),
    };
    let first = make_cloze(&out.pairs[0], &policy).unwrap();
    let second = make_cloze(&out.pairs[0], &policy).unwrap();

    // Same pair and policy, same record
    assert_eq!(first.blanked_span, second.blanked_span);
    assert_eq!(first.blanked(), "Paris");
    assert_eq!(
        first.to_anki_text(1),
        "Capital of France? The capital is {{c1::Paris}}."
    );
}

#[test]
fn test_cloze_without_marker_yields_nothing() {
    let out = extract_qa("Q: Sky colour?\nA: Blue.", &cfg(), ExtractionStrategy::Strict).unwrap();
    let policy = ClozePolicy::Marker {
        open: "[[".to_string(),
        close: "]]".to_string(),
    };
    assert!(make_cloze(&out.pairs[0], &policy).is_none());
}

// ── Filenames and serialization ──────────────────────────────────────────────

#[test]
fn test_filename_sanitization_is_deterministic() {
    init_tracing();
    let first = sanitize_filename("Chapter 3: Intro/Review!!", 100);
    let second = sanitize_filename("Chapter 3: Intro/Review!!", 100);

    assert_eq!(first, "Chapter_3_Intro_Review");
    assert_eq!(first, second);
    assert!(!first.contains('/'));
    assert!(!first.contains('!'));

    // The composed form reads its cap from the config.
    let config = PipelineConfig::builder()
        .max_filename_len(9)
        .build()
        .unwrap();
    assert_eq!(
        derive_filename("Chapter 3: Intro/Review!!", &config),
        "Chapter_3"
    );
}

#[test]
fn test_records_round_trip_through_json() {
    let problems = extract_problems("1. Compute.\n2. Prove.", &cfg()).unwrap();
    let json = serde_json::to_string(&problems.records).unwrap();
    let back: Vec<ProblemRecord> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, problems.records);

    let qa = extract_qa("Q: a?\nA: b.", &cfg(), ExtractionStrategy::Strict).unwrap();
    let json = serde_json::to_string(&qa.pairs).unwrap();
    let back: Vec<QAPair> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, qa.pairs);
}

// ── Full documents ───────────────────────────────────────────────────────────

/// The kind of document this crate exists for: sectioned notes with inline
/// math, a probability comparison, a table, and invisible junk.
#[test]
fn test_study_notes_end_to_end() {
    let notes = "\\section{Probability}\n\nLet $X$ be a random variable.\u{200B}\n\nP(X<3) is a CDF value.\n\n\n\\begin{tabular}{cc}\nx & P \\\\\n1 & 0.5 \\\\\n\\end{tabular}\n";
    let out = normalize(notes, &cfg()).unwrap();

    assert!(out.text.starts_with("<h1>Probability</h1>"));
    assert!(out.text.contains("\\(X\\)"));
    assert!(out.text.contains("P(X &lt; 3)"));
    assert!(out.text.contains("<th>x</th><th>P</th>"));
    assert!(out.is_clean());
    assert_card_safe(&out.text, "study-notes");
}

/// Both extractors share one normalization core, so either entry point
/// publishes the identical cleaned text.
#[test]
fn test_extractors_share_normalized_text() {
    let doc = "\\section{Review}\n1. Define entropy.\n2. State Bayes' rule.";
    let problems = extract_problems(doc, &cfg()).unwrap();
    let qa = extract_qa(doc, &cfg(), ExtractionStrategy::Strict).unwrap();

    assert_eq!(problems.text, qa.text);
    assert_eq!(problems.records.len(), 2);
    assert!(qa.pairs.is_empty());
    assert_card_safe(&problems.text, "shared-normalization");
}
