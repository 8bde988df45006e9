//! Sanitization: deterministic cleanup of converted HTML-flavoured text.
//!
//! ## Why a sanitize stage?
//!
//! The upstream stages translate markup but do not police it. Real source
//! documents arrive with Windows line endings, zero-width characters pasted
//! from PDFs, leftover `\end{document}` tails, embedded `<script>` blocks,
//! and bare `<` / `>` that card renderers will happily parse as broken tags.
//! This module applies cheap, deterministic string rules that fix all of
//! that without touching content. Each rule is independently testable.
//!
//! ## Rule order
//!
//! Line endings are normalised before any line-based rule; disallowed tags
//! are removed before angle-bracket escaping so their remnants cannot be
//! escaped into visible text; blank-line collapsing runs after per-line
//! trimming so whitespace-only lines count as blank.
//!
//! The whole of [`clean_text`] is idempotent.

use crate::config::PipelineConfig;
use crate::output::StageOutput;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Apply every sanitization rule in order.
///
/// Rules:
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 3. Remove disallowed elements together with their content
/// 4. Remove stray `\end{document}` / `\end{enumerate}` leftovers
/// 5. Trim trailing whitespace per line
/// 6. Collapse runs of blank lines down to one
/// 7. Escape `<` / `>` not part of a recognised tag
/// 8. Trim the result
pub fn clean_text(input: &str, config: &PipelineConfig) -> StageOutput {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = remove_disallowed_tags(&s, &config.disallowed_tags);
    let s = remove_stray_latex_ends(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = escape_stray_angle_brackets(&s);
    StageOutput::clean(s.trim().to_string())
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip invisible Unicode characters ───────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Remove disallowed elements with their content ────────────────

fn remove_disallowed_tags(input: &str, tags: &BTreeSet<String>) -> String {
    let mut text = input.to_string();
    for tag in tags {
        text = remove_tag_blocks(&text, tag);
    }
    text
}

/// Drop every `<tag …>…</tag>` block, case-insensitively. An opening tag
/// with no closing tag drops the remainder of the text: a half-open
/// disallowed element must never survive sanitization.
fn remove_tag_blocks(input: &str, tag: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `input`.
    let haystack = input.to_ascii_lowercase();
    let open_token = format!("<{}", tag.to_ascii_lowercase());
    let close_token = format!("</{}>", tag.to_ascii_lowercase());

    let mut out = String::with_capacity(input.len());
    let mut pos = 0usize;
    while let Some(rel) = haystack[pos..].find(&open_token) {
        let start = pos + rel;
        let after_name = start + open_token.len();
        let terminates_name = matches!(
            haystack[after_name..].chars().next(),
            None | Some('>') | Some(' ') | Some('\t') | Some('\n') | Some('/')
        );
        if !terminates_name {
            // Longer tag name, e.g. `<scriptural>` while removing `script`.
            out.push_str(&input[pos..after_name]);
            pos = after_name;
            continue;
        }
        out.push_str(&input[pos..start]);
        match haystack[after_name..].find(&close_token) {
            Some(rel_close) => {
                pos = after_name + rel_close + close_token.len();
            }
            None => {
                pos = input.len();
                break;
            }
        }
    }
    out.push_str(&input[pos..]);
    out
}

// ── Rule 4: Remove stray LaTeX environment tails ─────────────────────────
//
// Removing a tail can splice a new one out of the text around it
// (`\end{docu\end{document}ment}`), so removal repeats until stable.

fn remove_stray_latex_ends(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = current
            .replace("\\end{document}", "")
            .replace("\\end{enumerate}", "");
        if next == current {
            return next;
        }
        current = next;
    }
}

// ── Rule 5: Trim trailing whitespace per line ────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 6: Collapse blank lines ─────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 7: Escape stray angle brackets ──────────────────────────────────
//
// Only the tags this pipeline emits (plus basic inline formatting) may keep
// their brackets; every other `<` / `>` is content and becomes an entity.
// Escaping produces no new brackets, so the rule is a fixed point.

static RE_ALLOWED_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)</?(?:table|tr|th|td|h[1-6]|img|figcaption|ol|ul|li|div|p|br|b|i|em|strong|u|code|sub|sup|span)(\s[^<>]*)?/?>",
    )
    .unwrap()
});

fn escape_stray_angle_brackets(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 16);
    let mut pos = 0usize;
    for m in RE_ALLOWED_TAG.find_iter(input) {
        escape_fragment(&input[pos..m.start()], &mut out);
        out.push_str(m.as_str());
        pos = m.end();
    }
    escape_fragment(&input[pos..], &mut out);
    out
}

fn escape_fragment(fragment: &str, out: &mut String) {
    for c in fragment.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

// ── Filename sanitization ────────────────────────────────────────────────

static RE_UNDERSCORE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").unwrap());

/// Map a free-form title to a safe filename.
///
/// Characters other than ASCII alphanumerics, `_` and `-` (whitespace
/// included) become `_`; underscore runs collapse; the result is trimmed of
/// underscores, truncated to `max_len` characters, and trimmed again in
/// case the cut ended on an underscore. Same input, same output, always.
pub fn sanitize_filename(name: &str, max_len: usize) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let collapsed = RE_UNDERSCORE_RUN.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches('_');
    let truncated: String = trimmed.chars().take(max_len).collect();
    truncated.trim_matches('_').to_string()
}

// ── Card-rendering helpers ───────────────────────────────────────────────

/// Replace newlines with `<br/>` for single-field card rendering.
pub fn line_breaks_to_html(input: &str) -> String {
    input.replace('\n', "<br/>")
}

/// Wrap blank-line-separated paragraphs in `<p>` tags inside one `<div>`.
///
/// A single-shot formatter for callers building card fronts/backs; not part
/// of [`clean_text`] and not meant to be re-applied to its own output.
pub fn wrap_paragraphs(input: &str) -> String {
    let mut html = String::from("<div>");
    for paragraph in input.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        html.push_str(&format!("<p>{paragraph}</p>"));
    }
    html.push_str("</div>");
    html
}

// ── Tests ────────────────────────────────────────────────────────────────
