//! Dual index assembly.
//!
//! Pure assembly, no external calls: collect the per-unit outcomes of a
//! document run into the two aligned index collections. Every successfully
//! embedded text unit becomes exactly one [`TextIndexEntry`]; every
//! successfully embedded image unit becomes exactly one [`ImageIndexEntry`];
//! units that failed upstream go into the batch's failure list and are never
//! emitted as partial entries.
//!
//! Entries are sorted by `(page_no, unit_no)` so batches are byte-stable
//! across runs regardless of the order units completed in.

use crate::document::{Document, ImageUnit, TextUnit};
use crate::output::{
    Embedding, FailedUnit, ImageIndexEntry, IndexBatch, SourceMeta, TextIndexEntry,
};
use tracing::debug;

/// One unit's fate after the summarize/embed stages.
#[derive(Debug, Clone)]
pub enum UnitOutcome {
    Text {
        unit: TextUnit,
        embedding: Embedding,
    },
    Image {
        unit: ImageUnit,
        embedding: Embedding,
        /// True when the summary is the deterministic fallback.
        fallback: bool,
    },
    Failed(FailedUnit),
}

/// Assemble the dual index for one document.
pub fn build(document: &Document, outcomes: Vec<UnitOutcome>) -> IndexBatch {
    let source = SourceMeta {
        file_name: document.file_name.clone(),
        mime_type: document.mime_type.clone(),
        page_count: document.page_count(),
    };

    let mut batch = IndexBatch {
        document_id: document.document_id.clone(),
        ..Default::default()
    };

    for outcome in outcomes {
        match outcome {
            UnitOutcome::Text { unit, embedding } => {
                batch.text_entries.push(TextIndexEntry {
                    document_id: unit.id.document_id,
                    page_no: unit.id.page_no,
                    unit_no: unit.id.unit_no,
                    text: unit.text,
                    provenance: unit.provenance,
                    embedding: embedding.vector,
                    source: source.clone(),
                });
            }
            UnitOutcome::Image {
                unit,
                embedding,
                fallback,
            } => {
                // The summary is always present by the time a unit reaches
                // this stage; the embedder refused it otherwise.
                let summary = unit.summary.unwrap_or_default();
                batch.image_entries.push(ImageIndexEntry {
                    document_id: unit.id.document_id,
                    page_no: unit.id.page_no,
                    unit_no: unit.id.unit_no,
                    kind: unit.kind,
                    summary,
                    summarized: !fallback,
                    embedding: embedding.vector,
                    source: source.clone(),
                });
            }
            UnitOutcome::Failed(failed) => batch.failed.push(failed),
        }
    }

    batch
        .text_entries
        .sort_by_key(|e| (e.page_no, e.unit_no));
    batch
        .image_entries
        .sort_by_key(|e| (e.page_no, e.unit_no));
    batch
        .failed
        .sort_by_key(|f| (f.unit_id.page_no, f.unit_id.unit_no));

    debug!(
        document_id = %batch.document_id,
        text = batch.text_entries.len(),
        image = batch.image_entries.len(),
        failed = batch.failed.len(),
        "index batch assembled"
    );

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ImageUnitKind, TextProvenance, UnitId};
    use crate::error::UnitError;
    use crate::output::Modality;

    fn document() -> Document {
        Document {
            document_id: "doc".into(),
            file_name: "deck.pdf".into(),
            mime_type: "application/pdf".into(),
            pages: vec![],
        }
    }

    fn embedding(id: &UnitId, modality: Modality) -> Embedding {
        Embedding {
            unit_id: id.clone(),
            modality,
            vector: vec![0.5; 4],
        }
    }

    fn text_outcome(page: u32, unit: u32) -> UnitOutcome {
        let id = UnitId::new("doc", page, unit);
        UnitOutcome::Text {
            embedding: embedding(&id, Modality::Text),
            unit: TextUnit {
                id,
                text: "chunk".into(),
                provenance: TextProvenance::CharRange { start: 0, end: 5 },
            },
        }
    }

    fn image_outcome(page: u32, unit: u32, fallback: bool) -> UnitOutcome {
        let id = UnitId::new("doc", page, unit);
        UnitOutcome::Image {
            embedding: embedding(&id, Modality::ImageSummary),
            unit: ImageUnit {
                id,
                kind: ImageUnitKind::Discrete,
                payload: vec![1],
                mime_type: "image/png".into(),
                summary: Some("a figure".into()),
            },
            fallback,
        }
    }

    fn failed_outcome(page: u32, unit: u32) -> UnitOutcome {
        let id = UnitId::new("doc", page, unit);
        UnitOutcome::Failed(FailedUnit {
            modality: Modality::Text,
            error: UnitError::EmbeddingFailed {
                unit: id.to_string(),
                retries: 3,
                detail: "503".into(),
            },
            unit_id: id,
        })
    }

    #[test]
    fn one_entry_per_embedded_unit() {
        let batch = build(
            &document(),
            vec![
                text_outcome(0, 0),
                text_outcome(0, 1),
                image_outcome(0, 2, false),
                image_outcome(1, 0, true),
            ],
        );
        assert_eq!(batch.text_entries.len(), 2);
        assert_eq!(batch.image_entries.len(), 2);
        assert!(batch.failed.is_empty());
        assert!(batch.image_entries[0].summarized);
        assert!(!batch.image_entries[1].summarized);
    }

    #[test]
    fn failed_units_are_excluded_and_listed() {
        let batch = build(
            &document(),
            vec![text_outcome(0, 0), failed_outcome(0, 1)],
        );
        assert_eq!(batch.text_entries.len(), 1);
        assert!(batch.image_entries.is_empty());
        assert_eq!(batch.failed.len(), 1);
        assert_eq!(batch.failed[0].unit_id.unit_no, 1);
    }

    #[test]
    fn entries_are_sorted_regardless_of_completion_order() {
        let batch = build(
            &document(),
            vec![text_outcome(1, 0), text_outcome(0, 2), text_outcome(0, 1)],
        );
        let order: Vec<(u32, u32)> = batch
            .text_entries
            .iter()
            .map(|e| (e.page_no, e.unit_no))
            .collect();
        assert_eq!(order, vec![(0, 1), (0, 2), (1, 0)]);
    }

    #[test]
    fn source_metadata_is_attached() {
        let batch = build(&document(), vec![text_outcome(0, 0)]);
        assert_eq!(batch.text_entries[0].source.file_name, "deck.pdf");
        assert_eq!(batch.text_entries[0].source.mime_type, "application/pdf");
    }
}
