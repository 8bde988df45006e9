//! Problem segmentation and chapter assignment.
//!
//! Cuts normalized text into [`ProblemRecord`]s at problem-start markers and
//! stamps each record with a chapter derived from heading positions. The two
//! passes are deliberately separate: segmentation needs only the text, the
//! chapter pass needs only marker offsets and boundary offsets, and keeping
//! them apart lets callers re-stamp records against different boundary sets
//! without re-segmenting.
//!
//! ## Marker shapes
//!
//! With `problem_keyword: None` a marker is a bare `N.` at line start (the
//! delimiter comes from the config) followed by whitespace or the end of the
//! line — `3.14 is pi` does not start problem 3. With a keyword configured,
//! a marker is `Keyword N` with an optional trailing delimiter, at line
//! start or wrapped in one converted heading tag (`<h1>Problem 3</h1>`).

use crate::config::PipelineConfig;
use crate::error::Diagnostic;
use crate::output::ProblemRecord;
use tracing::{debug, warn};

/// Records cut from one text, plus the conditions tolerated while cutting.
#[derive(Debug, Clone, Default)]
pub struct Segmentation {
    pub records: Vec<ProblemRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

struct Marker {
    /// Byte offset of the marker's line in the text.
    start: usize,
    number: u32,
    /// Byte offset just past the marker token, where the statement begins.
    content_start: usize,
}

/// Cut `text` into problem records at the configured markers.
///
/// Each record runs from its marker to the next marker or the end of input.
/// No markers is valid input: the result carries zero records and a
/// [`Diagnostic::NoProblemMarkers`]. Decreasing numbers are kept as written
/// and flagged per occurrence.
pub fn segment(text: &str, config: &PipelineConfig) -> Segmentation {
    let markers = find_markers(text, config);
    let mut diagnostics = Vec::new();

    if markers.is_empty() {
        warn!("no problem markers found; returning zero records");
        diagnostics.push(Diagnostic::NoProblemMarkers);
        return Segmentation {
            records: Vec::new(),
            diagnostics,
        };
    }

    let mut records: Vec<ProblemRecord> = Vec::with_capacity(markers.len());
    for (i, marker) in markers.iter().enumerate() {
        let statement_end = markers.get(i + 1).map_or(text.len(), |next| next.start);
        let statement = text[marker.content_start..statement_end].trim().to_string();

        if let Some(previous) = records.last() {
            if marker.number < previous.number {
                debug!(
                    number = marker.number,
                    previous = previous.number,
                    offset = marker.start,
                    "problem numbering decreased"
                );
                diagnostics.push(Diagnostic::OutOfOrderProblemNumber {
                    offset: marker.start,
                    number: marker.number,
                    previous: previous.number,
                });
            }
        }

        records.push(ProblemRecord {
            number: marker.number,
            chapter: 0,
            start: marker.start,
            statement,
        });
    }

    Segmentation {
        records,
        diagnostics,
    }
}

fn find_markers(text: &str, config: &PipelineConfig) -> Vec<Marker> {
    let mut markers = Vec::new();
    let mut offset = 0usize;
    for line in text.split('\n') {
        if let Some((number_text, consumed)) = match_marker_line(line, config) {
            match number_text.parse::<u32>() {
                Ok(number) => markers.push(Marker {
                    start: offset,
                    number,
                    content_start: offset + consumed,
                }),
                Err(_) => {
                    debug!(offset, digits = number_text, "marker number does not fit; skipped");
                }
            }
        }
        offset += line.len() + 1;
    }
    markers
}

/// Match one line against the configured marker shape. Returns the digit run
/// and the byte length of the marker token within the line.
fn match_marker_line<'a>(line: &'a str, config: &PipelineConfig) -> Option<(&'a str, usize)> {
    match &config.problem_keyword {
        Some(keyword) => match_keyword_marker(line, keyword, &config.problem_delimiter),
        None => match_bare_marker(line, &config.problem_delimiter),
    }
}

fn match_bare_marker<'a>(line: &'a str, delimiter: &str) -> Option<(&'a str, usize)> {
    let digits_len = leading_digits(line);
    if digits_len == 0 {
        return None;
    }
    let rest = &line[digits_len..];
    let rest = rest.strip_prefix(delimiter)?;
    // `3.14 is pi` must not read as problem 3.
    match rest.chars().next() {
        None => {}
        Some(c) if c.is_whitespace() => {}
        Some(_) => return None,
    }
    Some((&line[..digits_len], line.len() - rest.len()))
}

fn match_keyword_marker<'a>(
    line: &'a str,
    keyword: &str,
    delimiter: &str,
) -> Option<(&'a str, usize)> {
    let mut rest = line;

    let opened_heading = match strip_heading_open(rest) {
        Some(after) => {
            rest = after.trim_start();
            true
        }
        None => false,
    };

    rest = rest.strip_prefix(keyword)?;
    let after_spaces = rest.trim_start();
    if after_spaces.len() == rest.len() {
        // The keyword must be its own word.
        return None;
    }
    rest = after_spaces;

    let digits_len = leading_digits(rest);
    if digits_len == 0 {
        return None;
    }
    let digits_at = line.len() - rest.len();
    rest = &rest[digits_len..];

    if let Some(after) = rest.strip_prefix(delimiter) {
        rest = after;
    }
    if opened_heading {
        if let Some(after) = strip_heading_close(rest.trim_start()) {
            rest = after;
        }
    }

    Some((&line[digits_at..digits_at + digits_len], line.len() - rest.len()))
}

fn leading_digits(s: &str) -> usize {
    s.bytes().take_while(|b| b.is_ascii_digit()).count()
}

/// Strip a leading `<hN>` for N in 1..=6.
fn strip_heading_open(s: &str) -> Option<&str> {
    let rest = s.strip_prefix("<h")?;
    let mut chars = rest.chars();
    match (chars.next(), chars.next()) {
        (Some(level), Some('>')) if ('1'..='6').contains(&level) => Some(&rest[2..]),
        _ => None,
    }
}

/// Strip a leading `</hN>` for N in 1..=6.
fn strip_heading_close(s: &str) -> Option<&str> {
    let rest = s.strip_prefix("</h")?;
    let mut chars = rest.chars();
    match (chars.next(), chars.next()) {
        (Some(level), Some('>')) if ('1'..='6').contains(&level) => Some(&rest[2..]),
        _ => None,
    }
}

/// Stamp each record with the count of boundaries strictly before its start.
///
/// `boundaries` must be ascending (as [`crate::pipeline::structure::heading_offsets`]
/// returns them). Records before the first boundary keep chapter 0.
pub fn assign_chapters(records: &mut [ProblemRecord], boundaries: &[usize]) {
    for record in records {
        record.chapter = boundaries.partition_point(|b| *b < record.start) as u32;
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PipelineConfig {
        PipelineConfig::default()
    }

    fn keyword_cfg() -> PipelineConfig {
        PipelineConfig::builder()
            .problem_keyword("Problem")
            .build()
            .unwrap()
    }

    #[test]
    fn test_bare_markers_segment() {
        let text = "1. Compute x.\nSome detail.\n2. Prove y.";
        let seg = segment(text, &cfg());
        assert_eq!(seg.records.len(), 2);
        assert_eq!(seg.records[0].number, 1);
        assert_eq!(seg.records[0].start, 0);
        assert_eq!(seg.records[0].statement, "Compute x.\nSome detail.");
        assert_eq!(seg.records[1].number, 2);
        assert_eq!(seg.records[1].start, 27);
        assert_eq!(seg.records[1].statement, "Prove y.");
        assert!(seg.diagnostics.is_empty());
    }

    #[test]
    fn test_decimal_number_is_not_a_marker() {
        let text = "1. Real problem.\n3.14 is pi, not a problem.";
        let seg = segment(text, &cfg());
        assert_eq!(seg.records.len(), 1);
        assert!(seg.records[0].statement.contains("3.14 is pi"));
    }

    #[test]
    fn test_no_markers_is_valid_input() {
        let seg = segment("just prose, nothing numbered", &cfg());
        assert!(seg.records.is_empty());
        assert!(matches!(seg.diagnostics[0], Diagnostic::NoProblemMarkers));
    }

    #[test]
    fn test_decreasing_numbers_tolerated_and_flagged() {
        let text = "5. Fifth.\n2. Second again.";
        let seg = segment(text, &cfg());
        assert_eq!(seg.records.len(), 2);
        assert_eq!(seg.records[1].number, 2);
        assert!(matches!(
            seg.diagnostics[0],
            Diagnostic::OutOfOrderProblemNumber {
                number: 2,
                previous: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_equal_numbers_not_flagged() {
        let seg = segment("2. One.\n2. Other.", &cfg());
        assert_eq!(seg.records.len(), 2);
        assert!(seg.diagnostics.is_empty());
    }

    #[test]
    fn test_oversized_digit_run_skipped() {
        let text = "1. Fine.\n99999999999999999999. Overflow line.";
        let seg = segment(text, &cfg());
        assert_eq!(seg.records.len(), 1);
        assert!(seg.records[0].statement.contains("Overflow line."));
    }

    #[test]
    fn test_keyword_marker_plain_line() {
        let text = "Problem 7. State the theorem.\nProof left out.";
        let seg = segment(text, &keyword_cfg());
        assert_eq!(seg.records.len(), 1);
        assert_eq!(seg.records[0].number, 7);
        assert_eq!(
            seg.records[0].statement,
            "State the theorem.\nProof left out."
        );
    }

    #[test]
    fn test_keyword_marker_inside_heading() {
        let text = "<h1>Problem 3</h1>\nShow that x holds.";
        let seg = segment(text, &keyword_cfg());
        assert_eq!(seg.records.len(), 1);
        assert_eq!(seg.records[0].number, 3);
        assert_eq!(seg.records[0].start, 0);
        assert_eq!(seg.records[0].statement, "Show that x holds.");
    }

    #[test]
    fn test_keyword_requires_word_break() {
        let seg = segment("Problems 3 discussed here.", &keyword_cfg());
        assert!(seg.records.is_empty());
    }

    #[test]
    fn test_bare_marker_ignored_in_keyword_mode() {
        let seg = segment("1. Not a keyword marker.", &keyword_cfg());
        assert!(seg.records.is_empty());
    }

    #[test]
    fn test_assign_chapters_counts_preceding_boundaries() {
        let mut records = vec![
            ProblemRecord {
                number: 1,
                chapter: 0,
                start: 5,
                statement: String::new(),
            },
            ProblemRecord {
                number: 2,
                chapter: 0,
                start: 40,
                statement: String::new(),
            },
            ProblemRecord {
                number: 1,
                chapter: 0,
                start: 90,
                statement: String::new(),
            },
        ];
        assign_chapters(&mut records, &[10, 50]);
        assert_eq!(records[0].chapter, 0);
        assert_eq!(records[1].chapter, 1);
        assert_eq!(records[2].chapter, 2);
    }

    #[test]
    fn test_boundary_at_record_start_does_not_count() {
        let mut records = vec![ProblemRecord {
            number: 1,
            chapter: 0,
            start: 10,
            statement: String::new(),
        }];
        assign_chapters(&mut records, &[10]);
        assert_eq!(records[0].chapter, 0);
    }
}
