//! # tex2card
//!
//! Turn LaTeX-flavored study notes into flashcard-ready text, numbered
//! problem records, and question/answer pairs.
//!
//! ## Why this crate?
//!
//! Notes exported from LaTeX sources arrive full of constructs card
//! renderers cannot display: four competing math delimiter styles, tabular
//! environments, formatting commands, invisible Unicode, the occasional
//! pasted `<script>` tag. Ad-hoc regex cleanup mangles some inputs and
//! silently drops others. This crate instead runs a fixed three-stage text
//! pipeline with two extractors on top, and reports every questionable
//! construct as a [`Diagnostic`] on a successful output rather than
//! guessing or aborting.
//!
//! ## Pipeline Overview
//!
//! ```text
//! raw text
//!  │
//!  ├─ 1. Math       one canonical delimiter pair, in-span substitutions
//!  ├─ 2. Structure  tables / images / lists / headers → card-safe HTML
//!  ├─ 3. Sanitize   drop disallowed tags + invisibles, escape stray < >
//!  ├─ 4a. Problems  numbered problem records + chapter stamping
//!  └─ 4b. QA        Q:/A: or blank-line pairs → validate → dedupe → cloze
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tex2card::{extract_qa, ExtractionStrategy, PipelineConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let notes = "Q: What is $e$?\nA: Euler's number, $\\approx 2.718$.";
//!     let config = PipelineConfig::default();
//!     let output = extract_qa(notes, &config, ExtractionStrategy::Strict)?;
//!     assert_eq!(output.pairs[0].question, "What is \\(e\\)?");
//!     for pair in &output.pairs {
//!         println!("{} => {}", pair.question, pair.answer);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Fatal vs. tolerated
//!
//! Only two things abort a run: a configuration that fails validation and
//! non-UTF-8 bytes at the [`normalize_bytes`] front door. Everything else
//! (unmatched delimiters, ragged table rows, incomplete pairs, duplicate
//! questions) is tolerated, reported, and countable via
//! [`PipelineStats::diagnostics`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionStrategy, FlexibleRules, PipelineConfig, PipelineConfigBuilder};
pub use convert::{derive_filename, extract_problems, extract_qa, normalize, normalize_bytes};
pub use error::{Diagnostic, Tex2CardError};
pub use output::{
    ClozeRecord, NormalizeOutput, PipelineStage, PipelineStats, ProblemExtraction, ProblemRecord,
    QAPair, QaExtraction, StageOutput, TextFragment,
};
pub use pipeline::math::normalize_math;
pub use pipeline::problems::{segment, Segmentation};
pub use pipeline::qa::{extract_pairs, make_cloze, ClozePolicy, PairExtraction};
pub use pipeline::sanitize::{clean_text, sanitize_filename};
pub use pipeline::structure::{convert_structure, heading_offsets};
