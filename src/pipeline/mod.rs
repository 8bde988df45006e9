//! Pipeline stages for LaTeX-to-flashcard conversion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets
//! callers run any prefix of the pipeline (e.g. normalization only)
//! without touching the extraction stages.
//!
//! ## Data Flow
//!
//! ```text
//! raw text ──▶ math ──▶ structure ──▶ sanitize ──┬─▶ problems
//! (LaTeX)   (delimiters) (env→HTML)   (cleanup)  └─▶ qa
//! ```
//!
//! 1. [`math`]      — rewrite math delimiters to one canonical inline/display
//!    pair and apply in-span substitutions
//! 2. [`structure`] — convert LaTeX environments and commands (tables,
//!    images, lists, headers, centering) to card-safe HTML
//! 3. [`sanitize`]  — strip disallowed tags and invisible characters,
//!    normalize whitespace, escape stray angle brackets
//! 4. [`problems`]  — cut the normalized text into numbered problem records
//!    and stamp chapters from heading positions
//! 5. [`qa`]        — extract question/answer pairs (strict markers or
//!    blank-line blocks), validate, deduplicate, and select cloze spans
//!
//! Stages 1–3 are pure `&str → StageOutput` functions and always run in
//! that order; stages 4 and 5 are alternatives over the same normalized
//! text.

pub mod math;
pub mod problems;
pub mod qa;
pub mod sanitize;
pub mod structure;
