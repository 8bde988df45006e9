//! LaTeX structure conversion: tables, headings, images, lists, centering.
//!
//! ## Construct families
//!
//! Each family is one pure `&str → String` pass, independently invocable:
//!
//! - tables (`\begin{tabular}` / `\begin{array}` per config) → `<table>`
//! - sectioning commands (per config) → `<h1>`…`<h6>`
//! - image commands (per config) → `<img>` with an optional `<figcaption>`
//! - `enumerate` / `itemize` → `<ol>` / `<ul>`
//! - `center` → a centred `<div>`
//!
//! ## Family order
//!
//! [`convert_structure`] runs images → tables → centers → lists → headings.
//! Images must precede centers so a centred figure becomes an `<img>` inside
//! the centred `<div>`; tables must precede lists so a tabular inside a list
//! item is already HTML when the item is sliced out.
//!
//! Environment bodies run to the *first* matching `\end{…}`; a `\begin`
//! without its `\end` is left as literal text. Brace arguments are read with
//! nesting honoured, so `\section{The \emph{Big} One}` keeps its inner
//! braces.

use crate::config::PipelineConfig;
use crate::error::Diagnostic;
use crate::output::StageOutput;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::debug;

/// A parsed table. The first row is the declared header; its cell count is
/// the canonical column count used to validate the body rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBlock {
    pub rows: Vec<TableRow>,
}

/// One table row: the processed cells plus the text they were cut from.
///
/// `raw` is the row as written, minus `\hline` rules and outer whitespace.
/// A row that fails the column check is re-emitted from `raw`, so cell
/// splitting and formatting unwrap never cost it a character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub cells: Vec<String>,
    pub raw: String,
}

impl TableBlock {
    /// Cell count of the header row (0 for an empty table).
    pub fn column_count(&self) -> usize {
        self.rows.first().map_or(0, |row| row.cells.len())
    }
}

/// One image inclusion cut from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub path: String,
    pub caption: Option<String>,
}

/// Run every conversion family over `input` in the documented order.
pub fn convert_structure(input: &str, config: &PipelineConfig) -> StageOutput {
    let s = convert_images(input, config);
    let tables = convert_tables(&s, config);
    let s = convert_centers(&tables.text);
    let s = convert_lists(&s);
    let s = convert_headers(&s, config);
    StageOutput {
        text: s,
        diagnostics: tables.diagnostics,
    }
}

// ── Brace / bracket readers ──────────────────────────────────────────────

/// Read a `{…}` group starting at the first byte of `s`, honouring nested
/// braces. Returns the inner content and the total consumed length.
fn read_braced(s: &str) -> Option<(&str, usize)> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&s[1..i], i + 1));
                }
            }
            _ => {}
        }
    }
    None
}

/// Read a `[…]` group starting at the first byte of `s`.
fn read_bracketed(s: &str) -> Option<(&str, usize)> {
    if !s.starts_with('[') {
        return None;
    }
    s.find(']').map(|i| (&s[1..i], i + 1))
}

/// Replace every `prefix{…}` call form with `render(inner)`. Occurrences of
/// `prefix` not followed by a brace group are copied through untouched.
fn replace_command(text: &str, prefix: &str, render: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find(prefix) {
        let after = &rest[at + prefix.len()..];
        match read_braced(after) {
            Some((inner, used)) => {
                out.push_str(&rest[..at]);
                out.push_str(&render(inner));
                rest = &after[used..];
            }
            None => {
                out.push_str(&rest[..at + prefix.len()]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

// ── Tables ───────────────────────────────────────────────────────────────

/// Convert every configured table environment to a `<table>`.
///
/// Rows split on the `\\` terminator, cells on `&`, `\hline` rules are
/// dropped and a fixed set of formatting commands is unwrapped per cell. A
/// body row whose cell count differs from the header's is kept verbatim in
/// one full-width cell and flagged; nothing is ever discarded.
pub fn convert_tables(input: &str, config: &PipelineConfig) -> StageOutput {
    let mut out = String::with_capacity(input.len());
    let mut diagnostics = Vec::new();
    let mut rest = input;

    loop {
        let next = config
            .table_env_names
            .iter()
            .filter_map(|env| {
                let token = format!("\\begin{{{env}}}");
                rest.find(&token).map(|at| (at, env.clone(), token.len()))
            })
            .min_by_key(|(at, _, _)| *at);

        let Some((at, env, token_len)) = next else {
            out.push_str(rest);
            break;
        };

        out.push_str(&rest[..at]);
        let after = &rest[at + token_len..];

        // Optional [pos] and {colspec} arguments before the body.
        let mut cursor = 0usize;
        if let Some((_, used)) = read_bracketed(&after[cursor..]) {
            cursor += used;
        }
        if let Some((_, used)) = read_braced(&after[cursor..]) {
            cursor += used;
        }

        let end_token = format!("\\end{{{env}}}");
        match after[cursor..].find(&end_token) {
            Some(body_len) => {
                let block = parse_table(&after[cursor..cursor + body_len]);
                let (html, mut diags) = render_table(&block);
                out.push_str(&html);
                diagnostics.append(&mut diags);
                rest = &after[cursor + body_len + end_token.len()..];
            }
            None => {
                debug!(env = env.as_str(), "table environment never closed; left as literal text");
                out.push_str(&rest[at..at + token_len]);
                rest = after;
            }
        }
    }

    StageOutput {
        text: out,
        diagnostics,
    }
}

static RE_FORMATTING_CMD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?:textbf|textit|emph|texttt|underline|mathbf|mathrm)\{([^{}]*)\}").unwrap()
});

/// Unwrap formatting commands to their bare content, innermost first.
fn unwrap_formatting(cell: &str) -> String {
    let mut current = cell.to_string();
    loop {
        let next = RE_FORMATTING_CMD.replace_all(&current, "$1").to_string();
        if next == current {
            return next;
        }
        current = next;
    }
}

fn parse_table(body: &str) -> TableBlock {
    let mut rows = Vec::new();
    for raw_row in body.split("\\\\") {
        let cleaned = raw_row.replace("\\hline", "");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            continue;
        }
        let cells = cleaned
            .split('&')
            .map(|cell| unwrap_formatting(cell).trim().to_string())
            .collect();
        rows.push(TableRow {
            cells,
            raw: cleaned.to_string(),
        });
    }
    TableBlock { rows }
}

fn render_table(block: &TableBlock) -> (String, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let Some(header) = block.rows.first() else {
        return ("<table></table>".to_string(), diagnostics);
    };
    let columns = header.cells.len();

    let mut html = String::from("<table>\n  <tr>");
    for cell in &header.cells {
        html.push_str(&format!("<th>{cell}</th>"));
    }
    html.push_str("</tr>\n");

    for (index, row) in block.rows.iter().enumerate().skip(1) {
        html.push_str("  <tr>");
        if row.cells.len() == columns {
            for cell in &row.cells {
                html.push_str(&format!("<td>{cell}</td>"));
            }
        } else {
            // Row 1 is the header; body rows count from 2.
            diagnostics.push(Diagnostic::MalformedTableRow {
                row: index + 1,
                cells: row.cells.len(),
                expected: columns,
            });
            html.push_str(&format!("<td colspan=\"{columns}\">{}</td>", row.raw));
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</table>");
    (html, diagnostics)
}

// ── Headings ─────────────────────────────────────────────────────────────

/// Map every configured sectioning command (starred or not) to its heading.
pub fn convert_headers(input: &str, config: &PipelineConfig) -> String {
    let mut text = input.to_string();
    for (command, level) in &config.header_command_levels {
        // Starred form first so `\section*{` never parses as plain `\section`.
        for variant in [format!("\\{command}*"), format!("\\{command}")] {
            text = replace_command(&text, &variant, |title| {
                format!("<h{level}>{title}</h{level}>")
            });
        }
    }
    text
}

// ── Images ───────────────────────────────────────────────────────────────

/// Convert every configured image command to an `<img>` tag.
///
/// The caption comes from a `caption=` key in the bracket options or, failing
/// that, from a `\caption{…}` directly following the command (which is then
/// consumed). Paths without an extension get `default_image_ext`.
pub fn convert_images(input: &str, config: &PipelineConfig) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    loop {
        let next = config
            .image_command_names
            .iter()
            .filter_map(|name| {
                let token = format!("\\{name}");
                rest.find(&token).map(|at| (at, token.len()))
            })
            .min_by_key(|(at, _)| *at);

        let Some((at, token_len)) = next else {
            out.push_str(rest);
            break;
        };

        let after = &rest[at + token_len..];
        let mut cursor = 0usize;
        let options = read_bracketed(after).map(|(opts, used)| {
            cursor += used;
            opts
        });

        let Some((path, used)) = read_braced(&after[cursor..]) else {
            // No braced path: not a call form, copy the token through.
            out.push_str(&rest[..at + token_len]);
            rest = after;
            continue;
        };
        cursor += used;
        out.push_str(&rest[..at]);

        let mut caption = options.and_then(caption_from_options);
        if caption.is_none() {
            if let Some((text, consumed)) = adjacent_caption(&after[cursor..]) {
                caption = Some(text);
                cursor += consumed;
            }
        }

        let image = ImageRef {
            path: with_default_ext(path, config),
            caption,
        };
        out.push_str(&render_image(&image));
        rest = &after[cursor..];
    }

    out
}

fn caption_from_options(options: &str) -> Option<String> {
    options.split(',').find_map(|entry| {
        let (key, value) = entry.split_once('=')?;
        (key.trim() == "caption").then(|| value.trim().to_string())
    })
}

/// A `\caption{…}` separated from the cursor by whitespace only.
fn adjacent_caption(rest: &str) -> Option<(String, usize)> {
    let trimmed = rest.trim_start();
    let gap = rest.len() - trimmed.len();
    let after = trimmed.strip_prefix("\\caption")?;
    let (inner, used) = read_braced(after)?;
    Some((inner.trim().to_string(), gap + "\\caption".len() + used))
}

fn with_default_ext(path: &str, config: &PipelineConfig) -> String {
    let path = path.trim();
    match &config.default_image_ext {
        Some(ext) if Path::new(path).extension().is_none() => format!("{path}.{ext}"),
        _ => path.to_string(),
    }
}

fn render_image(image: &ImageRef) -> String {
    match &image.caption {
        Some(caption) => format!(
            "<img src=\"{}\"><figcaption>{}</figcaption>",
            image.path, caption
        ),
        None => format!("<img src=\"{}\">", image.path),
    }
}

// ── Lists ────────────────────────────────────────────────────────────────

/// `enumerate` → `<ol>`, `itemize` → `<ul>`; items split on `\item`.
pub fn convert_lists(input: &str) -> String {
    let text = convert_list_env(input, "enumerate", "ol");
    convert_list_env(&text, "itemize", "ul")
}

fn convert_list_env(input: &str, env: &str, tag: &str) -> String {
    convert_env(input, env, |body| {
        let mut html = format!("<{tag}>\n");
        // Content before the first \item is preamble, not an item.
        for item in body.split("\\item").skip(1) {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            html.push_str(&format!("  <li>{item}</li>\n"));
        }
        html.push_str(&format!("</{tag}>"));
        html
    })
}

// ── Centering ────────────────────────────────────────────────────────────

/// `\begin{center}…\end{center}` → a centred `<div>`, body untouched.
pub fn convert_centers(input: &str) -> String {
    convert_env(input, "center", |body| {
        format!("<div style=\"text-align: center;\">{body}</div>")
    })
}

/// Replace every `\begin{env}…\end{env}` with `render(body)`. The body runs
/// to the first matching `\end`; an unclosed `\begin` stays literal.
fn convert_env(input: &str, env: &str, render: impl Fn(&str) -> String) -> String {
    let begin_token = format!("\\begin{{{env}}}");
    let end_token = format!("\\end{{{env}}}");
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(at) = rest.find(&begin_token) {
        let after = &rest[at + begin_token.len()..];
        match after.find(&end_token) {
            Some(body_len) => {
                out.push_str(&rest[..at]);
                out.push_str(&render(&after[..body_len]));
                rest = &after[body_len + end_token.len()..];
            }
            None => {
                debug!(env, "environment never closed; left as literal text");
                out.push_str(&rest[..at + begin_token.len()]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

// ── Heading offsets ──────────────────────────────────────────────────────

static RE_HEADING_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<h([1-6])>").unwrap());

/// Byte offsets of every `<hN>` with `N ≤ max_level`, ascending.
///
/// Runs over *converted* text; the offsets feed chapter assignment.
pub fn heading_offsets(text: &str, max_level: u8) -> Vec<usize> {
    RE_HEADING_TAG
        .captures_iter(text)
        .filter_map(|caps| {
            let level: u8 = caps[1].parse().ok()?;
            let whole = caps.get(0)?;
            (level <= max_level).then(|| whole.start())
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────
