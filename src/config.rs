//! Configuration types for the normalization and extraction pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across threads, serialise them for logging, and
//! diff two runs to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A fifteen-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely on
//! well-documented defaults for the rest. `build()` validates the combination,
//! so an invalid config is unrepresentable past that point.

use crate::error::Tex2CardError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Configuration for one normalization/extraction run.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`];
/// loaded from disk by callers via [`PipelineConfig::from_json`].
///
/// # Example
/// ```rust
/// use tex2card::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .question_prefix("Question:")
///     .answer_prefix("Answer:")
///     .capture_trace(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Line prefix that opens a question in strict extraction. Default: `"Q:"`.
    ///
    /// Must be non-empty and must not collide with [`answer_prefix`]
    /// (equal, or one a prefix of the other) — collisions make the
    /// line-by-line scan ambiguous, so `build()` rejects them.
    ///
    /// [`answer_prefix`]: PipelineConfig::answer_prefix
    pub question_prefix: String,

    /// Line prefix that opens an answer in strict extraction. Default: `"A:"`.
    pub answer_prefix: String,

    /// LaTeX environment names recognised as tables. Default: `{"tabular", "array"}`.
    ///
    /// The set is exact: `\begin{tabular}` matches, `\begin{tabularx}` does
    /// not. Environments are never inferred from content.
    pub table_env_names: BTreeSet<String>,

    /// LaTeX command names recognised as image inclusions. Default: `{"includegraphics"}`.
    pub image_command_names: BTreeSet<String>,

    /// Map from LaTeX sectioning command to HTML heading level.
    /// Default: `section→1, subsection→2, subsubsection→3`.
    ///
    /// A fixed table, never inferred: `\section{T}` becomes `<h1>T</h1>`,
    /// and the starred form `\section*{T}` maps to the same level. Levels
    /// outside 1..=6 are rejected by `build()`.
    pub header_command_levels: BTreeMap<String, u8>,

    /// Headings at this level or shallower are chapter boundaries. Default: 1.
    ///
    /// Chapter assignment counts how many such headings precede a record.
    /// Raise to 2 if your material uses `\subsection` per chapter.
    pub chapter_level: u8,

    /// Canonical delimiters for inline math spans. Default: `("\(", "\)")`.
    pub canonical_inline_math: (String, String),

    /// Canonical delimiters for display math spans. Default: `("\(", "\)")`.
    ///
    /// The default deliberately *flattens* display math to the inline form
    /// (and the math stage removes interior newlines from display spans):
    /// card renderers reflow text into small boxes where block math breaks
    /// the layout. Set to `("\[", "\]")` to keep display spans displayed.
    pub canonical_display_math: (String, String),

    /// Substitutions applied inside math spans only. Default:
    /// `[("<", "&lt;"), (">", "&gt;")]`.
    ///
    /// Each `(pattern, replacement)` is applied in order to span contents.
    /// A replacement re-containing its own pattern would grow on every pass
    /// and break idempotence, so `build()` rejects it.
    pub math_substitutions: Vec<(String, String)>,

    /// HTML elements removed together with their content by the sanitizer.
    /// Default: `{"script", "style", "iframe"}`.
    pub disallowed_tags: BTreeSet<String>,

    /// Maximum length of a sanitised filename, in characters. Default: 100.
    ///
    /// Applied by [`derive_filename`]; the stage-level [`sanitize_filename`]
    /// takes the cap as an explicit argument instead.
    ///
    /// [`derive_filename`]: crate::derive_filename
    /// [`sanitize_filename`]: crate::sanitize_filename
    pub max_filename_len: usize,

    /// Keyword form of problem markers. Default: `None`.
    ///
    /// `None`: markers are bare `N.` at line start (`.` being
    /// [`problem_delimiter`]). `Some("Problem")`: markers are `Problem N`
    /// with an optional trailing delimiter, also recognised inside a
    /// converted heading tag (`<h1>Problem 3</h1>` starts problem 3).
    ///
    /// [`problem_delimiter`]: PipelineConfig::problem_delimiter
    pub problem_keyword: Option<String>,

    /// Delimiter after the problem number. Default: `"."`.
    pub problem_delimiter: String,

    /// Block-boundary rules for flexible Q/A extraction.
    pub flexible: FlexibleRules,

    /// Capture a stage-tagged snapshot of the text after every pipeline
    /// stage. Default: false.
    ///
    /// Off by default because each snapshot clones the full working text.
    /// Turn on when debugging which stage mangled a document.
    pub capture_trace: bool,

    /// Extension appended to image paths that have none. Default: `Some("jpg")`.
    ///
    /// Applied only when the path lacks any extension; `figure.png` is
    /// never rewritten. `None` leaves extensionless paths untouched.
    pub default_image_ext: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            question_prefix: "Q:".to_string(),
            answer_prefix: "A:".to_string(),
            table_env_names: ["tabular", "array"]
                .into_iter()
                .map(String::from)
                .collect(),
            image_command_names: ["includegraphics"].into_iter().map(String::from).collect(),
            header_command_levels: [("section", 1), ("subsection", 2), ("subsubsection", 3)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            chapter_level: 1,
            canonical_inline_math: ("\\(".to_string(), "\\)".to_string()),
            canonical_display_math: ("\\(".to_string(), "\\)".to_string()),
            math_substitutions: vec![
                ("<".to_string(), "&lt;".to_string()),
                (">".to_string(), "&gt;".to_string()),
            ],
            disallowed_tags: ["script", "style", "iframe"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_filename_len: 100,
            problem_keyword: None,
            problem_delimiter: ".".to_string(),
            flexible: FlexibleRules::default(),
            capture_trace: false,
            default_image_ext: Some("jpg".to_string()),
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Parse a configuration from JSON, validating the result.
    ///
    /// Missing fields take their defaults, so a partial document like
    /// `{"question_prefix": "Frage:"}` is a complete config.
    pub fn from_json(json: &str) -> Result<Self, Tex2CardError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Tex2CardError::InvalidConfig(format!("JSON parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field combinations. Called by `build()` and `from_json`.
    pub(crate) fn validate(&self) -> Result<(), Tex2CardError> {
        if self.question_prefix.is_empty() {
            return Err(Tex2CardError::InvalidConfig(
                "question_prefix must not be empty".into(),
            ));
        }
        if self.answer_prefix.is_empty() {
            return Err(Tex2CardError::InvalidConfig(
                "answer_prefix must not be empty".into(),
            ));
        }
        if self.question_prefix.starts_with(&self.answer_prefix)
            || self.answer_prefix.starts_with(&self.question_prefix)
        {
            return Err(Tex2CardError::InvalidConfig(format!(
                "question_prefix {:?} and answer_prefix {:?} collide",
                self.question_prefix, self.answer_prefix
            )));
        }
        for (command, level) in &self.header_command_levels {
            if !(1..=6).contains(level) {
                return Err(Tex2CardError::InvalidConfig(format!(
                    "heading level for \\{command} must be 1–6, got {level}"
                )));
            }
        }
        if !(1..=6).contains(&self.chapter_level) {
            return Err(Tex2CardError::InvalidConfig(format!(
                "chapter_level must be 1–6, got {}",
                self.chapter_level
            )));
        }
        for pair in [&self.canonical_inline_math, &self.canonical_display_math] {
            if pair.0.is_empty() || pair.1.is_empty() {
                return Err(Tex2CardError::InvalidConfig(
                    "canonical math delimiters must not be empty".into(),
                ));
            }
        }
        for (pattern, replacement) in &self.math_substitutions {
            if pattern.is_empty() {
                return Err(Tex2CardError::InvalidConfig(
                    "math substitution pattern must not be empty".into(),
                ));
            }
            if replacement.contains(pattern.as_str()) {
                return Err(Tex2CardError::InvalidConfig(format!(
                    "math substitution {pattern:?} → {replacement:?} re-contains its pattern and would never converge"
                )));
            }
        }
        if self.max_filename_len == 0 {
            return Err(Tex2CardError::InvalidConfig(
                "max_filename_len must be ≥ 1".into(),
            ));
        }
        if self.flexible.min_pair_gap == 0 {
            return Err(Tex2CardError::InvalidConfig(
                "flexible.min_pair_gap must be ≥ 1".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn question_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.question_prefix = prefix.into();
        self
    }

    pub fn answer_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.answer_prefix = prefix.into();
        self
    }

    /// Add one table environment name to the recognised set.
    pub fn table_env(mut self, name: impl Into<String>) -> Self {
        self.config.table_env_names.insert(name.into());
        self
    }

    /// Add one image command name to the recognised set.
    pub fn image_command(mut self, name: impl Into<String>) -> Self {
        self.config.image_command_names.insert(name.into());
        self
    }

    /// Map one sectioning command to a heading level (clamped to 1–6).
    pub fn header_command(mut self, command: impl Into<String>, level: u8) -> Self {
        self.config
            .header_command_levels
            .insert(command.into(), level.clamp(1, 6));
        self
    }

    pub fn chapter_level(mut self, level: u8) -> Self {
        self.config.chapter_level = level.clamp(1, 6);
        self
    }

    pub fn inline_math(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.config.canonical_inline_math = (open.into(), close.into());
        self
    }

    pub fn display_math(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.config.canonical_display_math = (open.into(), close.into());
        self
    }

    /// Append one in-math substitution, applied after the defaults.
    pub fn math_substitution(
        mut self,
        pattern: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        self.config
            .math_substitutions
            .push((pattern.into(), replacement.into()));
        self
    }

    /// Add one element name to the disallowed set.
    pub fn disallow_tag(mut self, name: impl Into<String>) -> Self {
        self.config.disallowed_tags.insert(name.into());
        self
    }

    pub fn max_filename_len(mut self, len: usize) -> Self {
        self.config.max_filename_len = len.max(1);
        self
    }

    pub fn problem_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.config.problem_keyword = Some(keyword.into());
        self
    }

    pub fn problem_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.config.problem_delimiter = delimiter.into();
        self
    }

    pub fn min_pair_gap(mut self, blank_lines: usize) -> Self {
        self.config.flexible.min_pair_gap = blank_lines.max(1);
        self
    }

    pub fn answer_joiner(mut self, joiner: impl Into<String>) -> Self {
        self.config.flexible.answer_joiner = joiner.into();
        self
    }

    pub fn capture_trace(mut self, v: bool) -> Self {
        self.config.capture_trace = v;
        self
    }

    /// Set the extension appended to extensionless image paths
    /// (`None` disables the rewrite).
    pub fn default_image_ext(mut self, ext: Option<String>) -> Self {
        self.config.default_image_ext = ext;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Tex2CardError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Enums & rule groups ──────────────────────────────────────────────────

/// How Q/A pairs are recognised in the input.
///
/// Chosen explicitly by the caller of [`crate::extract_qa`], never inferred
/// from input shape. Two strategies exist because the two input families are
/// structurally incompatible: prefixed transcripts mark fields exactly, while
/// loosely formatted notes only separate them with vertical whitespace. A
/// heuristic picking between them silently mis-pairs text; an explicit enum
/// makes the choice visible at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtractionStrategy {
    /// Lines prefixed with `question_prefix` / `answer_prefix`. (default)
    #[default]
    Strict,
    /// Blank-line-separated blocks grouped by [`FlexibleRules`].
    Flexible,
}

/// Block-boundary rules for [`ExtractionStrategy::Flexible`].
///
/// A fixed, configurable rule rather than anything adaptive: within a
/// segment, blocks are separated by single blank lines; a run of
/// `min_pair_gap` or more blank lines (or the start of the text) starts a
/// new segment. The first block of a segment is the question; the remaining
/// blocks, joined with `answer_joiner`, are the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlexibleRules {
    /// Minimum run of blank lines separating two Q/A pairs. Default: 2.
    pub min_pair_gap: usize,
    /// Joiner between answer blocks of one pair. Default: `"\n\n"`.
    pub answer_joiner: String,
}

impl Default for FlexibleRules {
    fn default() -> Self {
        Self {
            min_pair_gap: 2,
            answer_joiner: "\n\n".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn builder_rejects_colliding_prefixes() {
        let err = PipelineConfig::builder()
            .question_prefix("Q:")
            .answer_prefix("Q: A")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("collide"), "got: {err}");
    }

    #[test]
    fn builder_rejects_empty_prefix() {
        let err = PipelineConfig::builder()
            .question_prefix("")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("question_prefix"));
    }

    #[test]
    fn builder_rejects_growing_substitution() {
        let err = PipelineConfig::builder()
            .math_substitution("<", "<<")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("never converge"), "got: {err}");
    }

    #[test]
    fn header_levels_clamp_to_valid_range() {
        let config = PipelineConfig::builder()
            .header_command("part", 0)
            .header_command("paragraph", 9)
            .build()
            .unwrap();
        assert_eq!(config.header_command_levels["part"], 1);
        assert_eq!(config.header_command_levels["paragraph"], 6);
    }

    #[test]
    fn from_json_fills_missing_fields_with_defaults() {
        let config = PipelineConfig::from_json(r#"{"question_prefix": "Frage:"}"#).unwrap();
        assert_eq!(config.question_prefix, "Frage:");
        assert_eq!(config.answer_prefix, "A:");
        assert_eq!(config.max_filename_len, 100);
    }

    #[test]
    fn from_json_rejects_invalid_combination() {
        let err =
            PipelineConfig::from_json(r#"{"question_prefix": "X:", "answer_prefix": "X:"}"#)
                .unwrap_err();
        assert!(matches!(err, Tex2CardError::InvalidConfig(_)));
    }
}
