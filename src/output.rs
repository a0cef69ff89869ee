//! Output types: embeddings, index entries, stats, and per-document outcome.
//!
//! Everything here serialises to JSON so batches can be handed to any
//! persistence collaborator and outcomes can be logged or returned over the
//! wire. Index entries are immutable once created — corrections require a new
//! document version with a new document id.

use crate::document::{ImageUnitKind, TextProvenance, UnitId};
use crate::error::UnitError;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Which capability an embedding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Modality {
    /// Embedded from a text unit's raw text.
    Text,
    /// Embedded from an image unit's textual summary — never from raw pixels.
    ImageSummary,
}

/// A fixed-length vector tied to the unit it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub unit_id: UnitId,
    pub modality: Modality,
    pub vector: Vec<f32>,
}

/// Source metadata carried into every index entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMeta {
    pub file_name: String,
    pub mime_type: String,
    pub page_count: usize,
}

/// One persisted record in the text index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextIndexEntry {
    pub document_id: String,
    pub page_no: u32,
    pub unit_no: u32,
    pub text: String,
    pub provenance: TextProvenance,
    pub embedding: Vec<f32>,
    pub source: SourceMeta,
}

impl TextIndexEntry {
    /// Stable persistence key: `text_{document_id}_{page}_{unit}`.
    pub fn key(&self) -> String {
        format!(
            "text_{}_{}_{}",
            self.document_id, self.page_no, self.unit_no
        )
    }
}

/// One persisted record in the image index.
///
/// The embedding is computed from `summary`, not from the image payload;
/// `summarized` is false when the summary is the deterministic fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageIndexEntry {
    pub document_id: String,
    pub page_no: u32,
    pub unit_no: u32,
    pub kind: ImageUnitKind,
    pub summary: String,
    pub summarized: bool,
    pub embedding: Vec<f32>,
    pub source: SourceMeta,
}

impl ImageIndexEntry {
    /// Stable persistence key: `image_{document_id}_{page}_{unit}`.
    pub fn key(&self) -> String {
        format!(
            "image_{}_{}_{}",
            self.document_id, self.page_no, self.unit_no
        )
    }
}

/// A unit that failed upstream and was excluded from both indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedUnit {
    pub unit_id: UnitId,
    pub modality: Modality,
    pub error: UnitError,
}

/// The two aligned index collections for one document, plus the failures.
///
/// Both collections key entries by the shared `(document_id, page_no,
/// unit_no)` scheme so retrieval can stitch text and image evidence back
/// together. Failed units appear here and nowhere else — never as partial
/// entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexBatch {
    pub document_id: String,
    pub text_entries: Vec<TextIndexEntry>,
    pub image_entries: Vec<ImageIndexEntry>,
    pub failed: Vec<FailedUnit>,
}

impl IndexBatch {
    pub fn entry_count(&self) -> usize {
        self.text_entries.len() + self.image_entries.len()
    }
}

/// Final status of a document run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Every unit was indexed.
    Completed,
    /// At least one unit failed irrecoverably; entries for the successful
    /// units were still emitted and the failures are listed.
    PartiallyCompleted,
    /// A document-level precondition failed (normalization error, zero
    /// pages). Surfaced as `Err(IndexError)` from `ingest`; this variant
    /// exists so callers can record the outcome uniformly.
    Failed,
}

/// Counters for one document run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    pub total_pages: usize,
    pub simple_pages: usize,
    pub complex_pages: usize,
    pub text_units: usize,
    pub image_units: usize,
    pub indexed_entries: usize,
    pub failed_units: usize,
    /// Caption calls that fell back to the placeholder summary.
    pub caption_fallbacks: usize,
    pub total_duration_ms: u64,
    /// Wall-clock spent inside external caption/embedding calls.
    pub external_duration_ms: u64,
}

/// Everything a caller gets back for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutput {
    pub document_id: String,
    pub status: DocumentStatus,
    pub batch: IndexBatch,
    pub stats: IngestStats,
}

/// 2×2 page-shape matrix: pages grouped by whether they carry text and/or
/// images. Logged once per document after classification as a quick sanity
/// signal on what the normalizer saw.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageShapeStats {
    pub text_yes_image_yes: usize,
    pub text_yes_image_no: usize,
    pub text_no_image_yes: usize,
    pub text_no_image_no: usize,
}

impl PageShapeStats {
    pub fn update(&mut self, has_text: bool, has_images: bool) {
        match (has_text, has_images) {
            (true, true) => self.text_yes_image_yes += 1,
            (true, false) => self.text_yes_image_no += 1,
            (false, true) => self.text_no_image_yes += 1,
            (false, false) => self.text_no_image_no += 1,
        }
    }

    pub fn log_summary(&self, document_id: &str) {
        info!(
            document_id,
            "page shapes: text+image={} text-only={} image-only={} empty={}",
            self.text_yes_image_yes,
            self.text_yes_image_no,
            self.text_no_image_yes,
            self.text_no_image_no,
        );
    }
}
