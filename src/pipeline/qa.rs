//! Question/answer pair extraction, validation, and cloze selection.
//!
//! Two extraction strategies produce raw candidates; validation and
//! deduplication then run as separate passes over whichever strategy fed
//! them. The strategy is always chosen by the caller through
//! [`ExtractionStrategy`], never guessed from the input shape.
//!
//! ## Why two strategies?
//!
//! Prefixed sources (`Q:` / `A:` lines) carry their own structure and the
//! strict walk honors it exactly. Prose-shaped sources have no markers at
//! all, only paragraph rhythm; the flexible walk segments on blank-line
//! gaps instead. Neither degrades into the other, so the choice stays
//! explicit.

use std::collections::{BTreeSet, HashSet};

use crate::config::{ExtractionStrategy, PipelineConfig};
use crate::error::Diagnostic;
use crate::output::{ClozeRecord, QAPair};
use tracing::debug;

/// Pairs produced from one text, with the per-pair drops accounted for.
///
/// `dropped` counts validation and deduplication losses only; incomplete
/// candidates never materialized and appear as diagnostics alone.
#[derive(Debug, Clone, Default)]
pub struct PairExtraction {
    pub pairs: Vec<QAPair>,
    pub dropped: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// A pair still in flight: fields as read, untrimmed, unvalidated.
struct Candidate {
    question: String,
    answer: String,
    start: usize,
}

enum Field {
    Question,
    Answer,
}

/// Extract, validate, and deduplicate pairs from `text`.
pub fn extract_pairs(
    text: &str,
    config: &PipelineConfig,
    strategy: ExtractionStrategy,
) -> PairExtraction {
    let mut diagnostics = Vec::new();
    let candidates = match strategy {
        ExtractionStrategy::Strict => strict_candidates(text, config, &mut diagnostics),
        ExtractionStrategy::Flexible => flexible_candidates(text, config, &mut diagnostics),
    };

    let mut dropped = 0usize;
    let pairs = validate(candidates, &mut diagnostics, &mut dropped);
    let pairs = dedupe(pairs, &mut diagnostics, &mut dropped);

    PairExtraction {
        pairs,
        dropped,
        diagnostics,
    }
}

// ── Strict strategy ──────────────────────────────────────────────────────

/// Line walk over `question_prefix` / `answer_prefix` markers.
///
/// A question line closes any open candidate first. A question that closes
/// without ever seeing an answer line is incomplete and becomes a
/// diagnostic, not a candidate. A second answer marker inside a running
/// answer is kept verbatim; only the next question line ends the pair.
fn strict_candidates(
    text: &str,
    config: &PipelineConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut current: Option<(Candidate, Field)> = None;
    let mut offset = 0usize;

    for line in text.split('\n') {
        if let Some(rest) = line.strip_prefix(&config.question_prefix) {
            if let Some((candidate, field)) = current.take() {
                finish(candidate, field, &mut candidates, diagnostics);
            }
            current = Some((
                Candidate {
                    question: rest.trim_start().to_string(),
                    answer: String::new(),
                    start: offset,
                },
                Field::Question,
            ));
        } else if let Some(rest) = line.strip_prefix(&config.answer_prefix) {
            match &mut current {
                Some((candidate, field @ Field::Question)) => {
                    candidate.answer = rest.trim_start().to_string();
                    *field = Field::Answer;
                }
                Some((candidate, Field::Answer)) => {
                    push_line(&mut candidate.answer, line);
                }
                None => {
                    debug!(offset, "answer line with no open question; skipped");
                }
            }
        } else if let Some((candidate, field)) = &mut current {
            match field {
                Field::Question => push_line(&mut candidate.question, line),
                Field::Answer => push_line(&mut candidate.answer, line),
            }
        }
        offset += line.len() + 1;
    }

    if let Some((candidate, field)) = current.take() {
        finish(candidate, field, &mut candidates, diagnostics);
    }
    candidates
}

fn finish(
    candidate: Candidate,
    field: Field,
    candidates: &mut Vec<Candidate>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match field {
        Field::Answer => candidates.push(candidate),
        Field::Question => {
            debug!(offset = candidate.start, "question closed without an answer");
            diagnostics.push(Diagnostic::IncompleteQaPair {
                offset: candidate.start,
            });
        }
    }
}

fn push_line(field: &mut String, line: &str) {
    if !field.is_empty() {
        field.push('\n');
    }
    field.push_str(line);
}

// ── Flexible strategy ────────────────────────────────────────────────────

/// A maximal run of non-blank lines.
struct Block {
    text: String,
    start: usize,
    /// Blank lines immediately before this block.
    gap_before: usize,
}

/// Blank-line segmentation: a gap of `min_pair_gap` or more blank lines
/// (or the start of the text) opens a new segment. The segment's first
/// block is the question; the remaining blocks, joined with
/// `answer_joiner`, are the answer.
///
/// Sanitized text caps blank runs at one line, so after [`clean_text`] the
/// input always forms a single segment: prose note in, one pair out. Wide
/// gaps only split when this runs on raw text.
///
/// [`clean_text`]: crate::pipeline::sanitize::clean_text
fn flexible_candidates(
    text: &str,
    config: &PipelineConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Candidate> {
    let blocks = scan_blocks(text);
    if blocks.is_empty() {
        debug!("no non-blank content to segment");
        diagnostics.push(Diagnostic::EmptyBlock { offset: 0 });
        return Vec::new();
    }

    let mut segments: Vec<Vec<Block>> = Vec::new();
    for block in blocks {
        match segments.last_mut() {
            Some(segment) if block.gap_before < config.flexible.min_pair_gap => {
                segment.push(block);
            }
            _ => segments.push(vec![block]),
        }
    }

    let mut candidates = Vec::new();
    for segment in segments {
        let mut parts = segment.into_iter();
        let Some(question) = parts.next() else {
            continue;
        };
        let answer = parts
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join(&config.flexible.answer_joiner);
        if answer.is_empty() {
            debug!(offset = question.start, "segment has no answer blocks");
            diagnostics.push(Diagnostic::IncompleteQaPair {
                offset: question.start,
            });
            continue;
        }
        candidates.push(Candidate {
            question: question.text,
            answer,
            start: question.start,
        });
    }
    candidates
}

fn scan_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;
    let mut blank_run = 0usize;
    let mut offset = 0usize;

    for line in text.split('\n') {
        if line.trim().is_empty() {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            blank_run += 1;
        } else {
            match &mut current {
                Some(block) => push_line(&mut block.text, line),
                None => {
                    current = Some(Block {
                        text: line.to_string(),
                        start: offset,
                        gap_before: blank_run,
                    });
                    blank_run = 0;
                }
            }
        }
        offset += line.len() + 1;
    }
    if let Some(block) = current.take() {
        blocks.push(block);
    }
    blocks
}

// ── Validation & deduplication ───────────────────────────────────────────

/// Materialize candidates whose fields are non-empty after trimming.
fn validate(
    candidates: Vec<Candidate>,
    diagnostics: &mut Vec<Diagnostic>,
    dropped: &mut usize,
) -> Vec<QAPair> {
    let mut pairs = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let question = candidate.question.trim();
        let answer = candidate.answer.trim();
        let blank = if question.is_empty() {
            Some("question")
        } else if answer.is_empty() {
            Some("answer")
        } else {
            None
        };
        if let Some(field) = blank {
            debug!(offset = candidate.start, field, "pair with blank field dropped");
            diagnostics.push(Diagnostic::BlankQaField {
                offset: candidate.start,
                field: field.to_string(),
            });
            *dropped += 1;
            continue;
        }
        pairs.push(QAPair {
            question: question.to_string(),
            answer: answer.to_string(),
            tags: BTreeSet::new(),
            chapter: None,
            start: candidate.start,
        });
    }
    pairs
}

/// Drop repeated questions, keeping the first occurrence in source order.
/// Pair questions are already trimmed, so equality here is the trimmed
/// equality the caller sees.
fn dedupe(
    pairs: Vec<QAPair>,
    diagnostics: &mut Vec<Diagnostic>,
    dropped: &mut usize,
) -> Vec<QAPair> {
    let mut seen: HashSet<String> = HashSet::with_capacity(pairs.len());
    let mut kept = Vec::with_capacity(pairs.len());
    for pair in pairs {
        if seen.contains(pair.question.as_str()) {
            debug!(offset = pair.start, "duplicate question dropped");
            diagnostics.push(Diagnostic::DuplicateQuestion { offset: pair.start });
            *dropped += 1;
            continue;
        }
        seen.insert(pair.question.clone());
        kept.push(pair);
    }
    kept
}

// ── Chapter stamping ─────────────────────────────────────────────────────

/// Stamp each pair with the count of boundaries strictly before its start.
///
/// Mirrors [`crate::pipeline::problems::assign_chapters`]; pairs that never
/// pass through here keep `chapter = None`.
pub fn assign_chapters(pairs: &mut [QAPair], boundaries: &[usize]) {
    for pair in pairs {
        pair.chapter = Some(boundaries.partition_point(|b| *b < pair.start) as u32);
    }
}

// ── Cloze selection ──────────────────────────────────────────────────────

/// How [`make_cloze`] picks the span to blank out of a pair's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClozePolicy {
    /// First `open…close` span in the answer; the markers themselves are
    /// removed from the rendered text.
    Marker { open: String, close: String },
    /// First exact occurrence of `word` in the answer. Case-sensitive.
    Keyword { word: String },
    /// Blank the entire answer.
    WholeAnswer,
}

/// Build a cloze card body from a pair, or `None` when the policy selects
/// nothing: absent markers or keyword, an empty marker or keyword string,
/// or an empty answer under [`ClozePolicy::WholeAnswer`].
///
/// The card text is the question and answer joined with a single space;
/// `blanked_span` indexes into that joined text.
pub fn make_cloze(pair: &QAPair, policy: &ClozePolicy) -> Option<ClozeRecord> {
    let (answer, span) = match policy {
        ClozePolicy::Marker { open, close } => {
            if open.is_empty() || close.is_empty() {
                return None;
            }
            let open_at = pair.answer.find(open.as_str())?;
            let content_at = open_at + open.len();
            let close_at = content_at + pair.answer[content_at..].find(close.as_str())?;
            let mut cleaned =
                String::with_capacity(pair.answer.len() - open.len() - close.len());
            cleaned.push_str(&pair.answer[..open_at]);
            cleaned.push_str(&pair.answer[content_at..close_at]);
            cleaned.push_str(&pair.answer[close_at + close.len()..]);
            (cleaned, (open_at, close_at - open.len()))
        }
        ClozePolicy::Keyword { word } => {
            if word.is_empty() {
                return None;
            }
            let at = pair.answer.find(word.as_str())?;
            (pair.answer.clone(), (at, at + word.len()))
        }
        ClozePolicy::WholeAnswer => {
            if pair.answer.is_empty() {
                return None;
            }
            (pair.answer.clone(), (0, pair.answer.len()))
        }
    };

    let base = pair.question.len() + 1;
    Some(ClozeRecord {
        text: format!("{} {}", pair.question, answer),
        blanked_span: (base + span.0, base + span.1),
    })
}

// ── Tests ────────────────────────────────────────────────────────────────
