//! Math delimiter canonicalization.
//!
//! ## Why an explicit scan?
//!
//! The input mixes four delimiter styles (`\( \)`, `\[ \]`, `$ $`, `$$ $$`)
//! and `$` is its own closer, so delimiter recognition is context-sensitive:
//! a `$` inside an already-open `\( … \)` span is content, not a delimiter,
//! and `$$` must win over `$` at the same position. A pile of regex passes
//! gets the adjacent-span and nested-duel cases wrong, so this module runs a
//! single left-to-right scan with an explicit inside/outside state instead.
//! Delimiters are only recognized at depth 0; spans never nest.
//!
//! ## Span rules
//!
//! - Openers, earliest match first (`$$` beats `$` on ties): `\(`, `\[`,
//!   `$$`, `$`.
//! - A single-`$` span must close before the next newline; the other three
//!   may cross lines.
//! - An unmatched opener stays in the text as-is and the scan resumes right
//!   after it; a [`Diagnostic::UnmatchedMathDelimiter`] records the offset.
//! - Completed spans get the configured substitutions applied to their
//!   content; display spans additionally lose interior newlines (card
//!   renderers cannot reflow block math), then the span is emitted with the
//!   canonical delimiters from the config.
//!
//! The whole stage is idempotent: the canonical delimiters re-parse to the
//! same spans and the substitutions never re-match their own output.

use crate::config::PipelineConfig;
use crate::error::Diagnostic;
use crate::output::StageOutput;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Whether a span was written in an inline or a display form.
///
/// The distinction matters even when both canonicalize to the same
/// delimiters: only display spans get their interior newlines removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathKind {
    Inline,
    Display,
}

/// One math span cut from the input at nesting depth 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathSpan {
    pub kind: MathKind,
    /// Content between the original delimiters, before substitutions.
    pub content: String,
}

struct Opener {
    token: &'static str,
    closer: &'static str,
    kind: MathKind,
    /// Closer must appear before the next newline.
    same_line: bool,
}

const OPENERS: [Opener; 4] = [
    Opener {
        token: "\\(",
        closer: "\\)",
        kind: MathKind::Inline,
        same_line: false,
    },
    Opener {
        token: "\\[",
        closer: "\\]",
        kind: MathKind::Display,
        same_line: false,
    },
    Opener {
        token: "$$",
        closer: "$$",
        kind: MathKind::Display,
        same_line: false,
    },
    Opener {
        token: "$",
        closer: "$",
        kind: MathKind::Inline,
        same_line: true,
    },
];

/// Rewrite every math span to the canonical delimiters from `config`,
/// applying the configured in-span substitutions along the way.
///
/// Malformed input never fails: unmatched openers are left as literal text
/// and reported through the returned diagnostics.
pub fn normalize_math(input: &str, config: &PipelineConfig) -> StageOutput {
    let mut out = String::with_capacity(input.len() + 16);
    let mut diagnostics = Vec::new();
    let mut rest = input;
    // Byte offset of `rest` within `input`, for diagnostic positions.
    let mut offset = 0usize;

    while !rest.is_empty() {
        let next = OPENERS
            .iter()
            .filter_map(|op| rest.find(op.token).map(|at| (at, op)))
            .min_by_key(|(at, op)| (*at, std::cmp::Reverse(op.token.len())));

        let Some((at, op)) = next else {
            out.push_str(rest);
            break;
        };

        out.push_str(&rest[..at]);
        let opener_offset = offset + at;
        let after_open = &rest[at + op.token.len()..];

        let window = if op.same_line {
            match after_open.find('\n') {
                Some(newline) => &after_open[..newline],
                None => after_open,
            }
        } else {
            after_open
        };

        match window.find(op.closer) {
            Some(close_at) => {
                let span = MathSpan {
                    kind: op.kind,
                    content: after_open[..close_at].to_string(),
                };
                out.push_str(&render_span(&span, config));
                let consumed = at + op.token.len() + close_at + op.closer.len();
                offset += consumed;
                rest = &rest[consumed..];
            }
            None => {
                debug!(
                    offset = opener_offset,
                    token = op.token,
                    "unmatched math delimiter left as literal text"
                );
                diagnostics.push(Diagnostic::UnmatchedMathDelimiter {
                    offset: opener_offset,
                    delimiter: op.token.to_string(),
                });
                out.push_str(op.token);
                let consumed = at + op.token.len();
                offset += consumed;
                rest = &rest[consumed..];
            }
        }
    }

    StageOutput {
        text: pad_probability_comparisons(&out),
        diagnostics,
    }
}

fn render_span(span: &MathSpan, config: &PipelineConfig) -> String {
    let mut body = match span.kind {
        MathKind::Inline => span.content.clone(),
        MathKind::Display => span.content.replace('\n', ""),
    };
    for (pattern, replacement) in &config.math_substitutions {
        body = body.replace(pattern.as_str(), replacement.as_str());
    }
    let (open, close) = match span.kind {
        MathKind::Inline => &config.canonical_inline_math,
        MathKind::Display => &config.canonical_display_math,
    };
    format!("{open}{body}{close}")
}

// ── Probability-expression guard ─────────────────────────────────────────
//
// Bare comparisons inside probability expressions (`P(X<5)`) read as an
// opening tag to anything HTML-flavoured downstream. Padding the `<` with
// spaces keeps it textual. The space-run collapse inside the match makes
// the rule a fixed point: an already-padded ` < ` pads to `  <  ` and
// collapses straight back.

static RE_PROBABILITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"P\([^)]*\)").unwrap());
static RE_SPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());

fn pad_probability_comparisons(input: &str) -> String {
    RE_PROBABILITY
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let padded = caps[0].replace('<', " < ");
            RE_SPACE_RUN.replace_all(&padded, " ").to_string()
        })
        .to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────
