//! Error types for the doc2index library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`IndexError`] — **Fatal**: the document cannot be indexed at all
//!   (unsupported format, corrupt bytes, zero pages, a contract violation
//!   inside the pipeline). Returned as `Err(IndexError)` from the top-level
//!   `ingest*` functions.
//!
//! * [`UnitError`] — **Non-fatal**: a single unit failed (embedding call
//!   exhausted its retries, raster missing, cancelled mid-flight) but all
//!   other units are fine. Stored inside [`crate::output::FailedUnit`] so
//!   callers can inspect partial success rather than losing the whole
//!   document to one bad unit.
//!
//! Unit-level failures never escalate to a document-level failure; only
//! document-level preconditions (normalization failure, zero pages) and
//! ordering-contract violations abort a document.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the doc2index library.
///
/// Unit-level failures use [`UnitError`] and are reported in the per-document
/// failure list rather than propagated here.
#[derive(Debug, Error)]
pub enum IndexError {
    // ── Normalization errors ──────────────────────────────────────────────
    /// The normalizer does not support this file format.
    #[error("Unsupported document format '{mime_type}'")]
    FormatUnsupported { mime_type: String },

    /// The document bytes could not be normalised into pages.
    #[error("Corrupt document: {detail}")]
    CorruptDocument { detail: String },

    /// Normalization succeeded but produced zero pages; there is nothing to
    /// index and emitting an empty batch would be indistinguishable from a
    /// fully-indexed empty document.
    #[error("Document '{file_name}' normalised to zero pages")]
    EmptyDocument { file_name: String },

    // ── Contract errors ───────────────────────────────────────────────────
    /// The embedder was invoked on an image unit whose summary was never
    /// populated. This is a programming error in the calling code, not a
    /// data problem, and is never silently recovered.
    #[error("Ordering violation: embedder invoked before summarizer for unit {unit}")]
    OrderingViolation { unit: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Persistence errors ────────────────────────────────────────────────
    /// The index sink could not write a batch.
    #[error("Failed to write index file '{path}': {source}")]
    SinkWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single unit.
///
/// Stored in [`crate::output::FailedUnit`]; the unit is excluded from both
/// index collections and the document finishes as `PartiallyCompleted`.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitError {
    /// The embedding call failed permanently or exhausted its retries.
    #[error("Unit {unit}: embedding failed after {retries} retries: {detail}")]
    EmbeddingFailed {
        unit: String,
        retries: u32,
        detail: String,
    },

    /// The embedding capability returned a vector of unexpected length.
    /// Dimensionality is pinned by the first successful call of a run; a
    /// mismatched vector cannot live in the same index.
    #[error("Unit {unit}: embedding dimension {got} does not match pinned dimension {expected}")]
    DimensionMismatch {
        unit: String,
        expected: usize,
        got: usize,
    },

    /// A complex page arrived without a full-page rasterisation, so no
    /// whole-page unit could be produced.
    #[error("Page {page}: classified complex but no rasterisation is available")]
    MissingRaster { page: u32 },

    /// The document was cancelled before this unit issued its external calls.
    /// Cancelled units are discarded, never indexed with default values.
    #[error("Unit {unit}: cancelled before completion")]
    Cancelled { unit: String },
}
