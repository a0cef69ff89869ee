//! Streaming ingestion API: emit index entries as units complete.
//!
//! Large documents with many image units take a while — every image goes
//! through a vision call and an embedding call. The streams-based API lets
//! callers forward entries to persistence incrementally, wire up progress
//! displays, or bound memory on huge documents instead of buffering the
//! whole batch.
//!
//! Unlike the eager [`crate::ingest::ingest`] which returns only after all
//! units finish, [`ingest_stream`] yields each unit's index entry via a
//! `Stream` as soon as it is embedded. Units are emitted in completion
//! order, not page order — sort by `(page_no, unit_no)` downstream if order
//! matters. Failed units are yielded as `Err(FailedUnit)` so callers see
//! exactly what the eager API would have listed.

use crate::capability::{Capabilities, CallBudget, NormalizeError};
use crate::config::IndexingConfig;
use crate::document::{Complexity, Document, Unit, UnitId};
use crate::error::{IndexError, UnitError};
use crate::output::{FailedUnit, ImageIndexEntry, Modality, SourceMeta, TextIndexEntry};
use crate::pipeline::embed::{embed_image_unit, embed_text_unit, DimensionPin, EmbedError};
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::summarize::summarize;
use crate::pipeline::{classify, extract};
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{error, info};

/// One streamed index entry.
#[derive(Debug, Clone)]
pub enum IndexRecord {
    Text(TextIndexEntry),
    Image(ImageIndexEntry),
}

/// A boxed stream of per-unit results.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<IndexRecord, FailedUnit>> + Send>>;

/// Ingest a document, streaming index entries as units complete.
///
/// # Returns
/// - `Ok(RecordStream)` — a stream of `Result<IndexRecord, FailedUnit>`
/// - `Err(IndexError)` — fatal error (unsupported format, corrupt bytes,
///   zero pages)
pub async fn ingest_stream(
    bytes: &[u8],
    mime_type: &str,
    file_name: &str,
    config: &IndexingConfig,
    caps: &Capabilities,
) -> Result<RecordStream, IndexError> {
    info!(file_name, "starting streaming ingestion");

    // ── Normalize ────────────────────────────────────────────────────────
    let pages = caps
        .normalizer
        .normalize(bytes, mime_type)
        .await
        .map_err(|e| match e {
            NormalizeError::FormatUnsupported { mime_type } => {
                IndexError::FormatUnsupported { mime_type }
            }
            NormalizeError::CorruptDocument { detail } => IndexError::CorruptDocument { detail },
        })?;
    if pages.is_empty() {
        return Err(IndexError::EmptyDocument {
            file_name: file_name.to_string(),
        });
    }

    let mut document = Document {
        document_id: Document::id_from_bytes(bytes),
        file_name: file_name.to_string(),
        mime_type: mime_type.to_string(),
        pages,
    };

    // ── Classify + extract eagerly; only the external calls stream ───────
    for page in &mut document.pages {
        let verdict = classify::classify(page, &config.thresholds);
        page.classify_once(verdict.complexity);
    }

    let mut units: Vec<Unit> = Vec::new();
    let mut upfront_failures: Vec<FailedUnit> = Vec::new();
    for page in &document.pages {
        if page.complexity() == Some(Complexity::Complex) && page.raster.is_none() {
            upfront_failures.push(FailedUnit {
                unit_id: UnitId::new(document.document_id.as_str(), page.page_no, 0),
                modality: Modality::ImageSummary,
                error: UnitError::MissingRaster { page: page.page_no },
            });
            continue;
        }
        units.extend(extract::extract(
            &document.document_id,
            page,
            &config.chunking,
            config.min_image_area_fraction,
        ));
    }

    let source = SourceMeta {
        file_name: document.file_name.clone(),
        mime_type: document.mime_type.clone(),
        page_count: document.page_count(),
    };
    let budget = match config.caption_budget {
        Some(calls) => CallBudget::limited(calls),
        None => CallBudget::unlimited(),
    };
    let pin = Arc::new(DimensionPin::new());
    let concurrency = config.concurrency;
    let config = config.clone();
    let captioner = Arc::clone(&caps.captioner);
    let embedder = Arc::clone(&caps.embedder);
    let file_name = document.file_name.clone();

    let unit_stream = stream::iter(units.into_iter().map(move |unit| {
        let captioner = Arc::clone(&captioner);
        let embedder = Arc::clone(&embedder);
        let budget = budget.clone();
        let config = config.clone();
        let pin = Arc::clone(&pin);
        let source = source.clone();
        let file_name = file_name.clone();
        async move {
            process_streamed_unit(
                unit, &captioner, &embedder, &budget, &config, &pin, &source, &file_name,
            )
            .await
        }
    }))
    .buffer_unordered(concurrency);

    let failures = stream::iter(upfront_failures.into_iter().map(Err));

    Ok(Box::pin(failures.chain(unit_stream)))
}

#[allow(clippy::too_many_arguments)]
async fn process_streamed_unit(
    unit: Unit,
    captioner: &Arc<dyn crate::capability::VisionCaptioner>,
    embedder: &Arc<dyn crate::capability::TextEmbedder>,
    budget: &CallBudget,
    config: &IndexingConfig,
    pin: &DimensionPin,
    source: &SourceMeta,
    file_name: &str,
) -> Result<IndexRecord, FailedUnit> {
    let policy = RetryPolicy {
        max_retries: config.max_retries,
        backoff_ms: config.retry_backoff_ms,
    };

    if config.cancel.is_cancelled() {
        let unit_id = unit.id().clone();
        let modality = match &unit {
            Unit::Text(_) => Modality::Text,
            Unit::Image(_) => Modality::ImageSummary,
        };
        return Err(FailedUnit {
            error: UnitError::Cancelled {
                unit: unit_id.to_string(),
            },
            unit_id,
            modality,
        });
    }

    match unit {
        Unit::Text(text_unit) => {
            match embed_text_unit(embedder, &text_unit, pin, policy).await {
                Ok(embedding) => Ok(IndexRecord::Text(TextIndexEntry {
                    document_id: text_unit.id.document_id,
                    page_no: text_unit.id.page_no,
                    unit_no: text_unit.id.unit_no,
                    text: text_unit.text,
                    provenance: text_unit.provenance,
                    embedding: embedding.vector,
                    source: source.clone(),
                })),
                Err(error) => Err(FailedUnit {
                    unit_id: text_unit.id,
                    modality: Modality::Text,
                    error,
                }),
            }
        }
        Unit::Image(image_unit) => {
            let summarized = summarize(captioner, budget, file_name, image_unit, config).await;

            if config.cancel.is_cancelled() {
                let unit_id = summarized.unit.id.clone();
                return Err(FailedUnit {
                    error: UnitError::Cancelled {
                        unit: unit_id.to_string(),
                    },
                    unit_id,
                    modality: Modality::ImageSummary,
                });
            }

            match embed_image_unit(embedder, &summarized.unit, pin, policy).await {
                Ok(embedding) => Ok(IndexRecord::Image(ImageIndexEntry {
                    document_id: summarized.unit.id.document_id.clone(),
                    page_no: summarized.unit.id.page_no,
                    unit_no: summarized.unit.id.unit_no,
                    kind: summarized.unit.kind,
                    summary: summarized.unit.summary.clone().unwrap_or_default(),
                    summarized: !summarized.fallback,
                    embedding: embedding.vector,
                    source: source.clone(),
                })),
                Err(EmbedError::OrderingViolation { unit }) => {
                    // Unreachable through this flow: the summarizer populated
                    // the summary two lines up. A mid-stream item has no
                    // fatal channel, so the contract breach is logged loudly
                    // and the unit reported failed; the eager API surfaces
                    // the same condition as Err(IndexError::OrderingViolation).
                    error!(unit = %unit, "ordering violation in streamed unit");
                    Err(FailedUnit {
                        error: UnitError::EmbeddingFailed {
                            unit: unit.to_string(),
                            retries: 0,
                            detail: "ordering violation: summary missing before embed".into(),
                        },
                        unit_id: unit,
                        modality: Modality::ImageSummary,
                    })
                }
                Err(EmbedError::Unit(error)) => Err(FailedUnit {
                    unit_id: summarized.unit.id,
                    modality: Modality::ImageSummary,
                    error,
                }),
            }
        }
    }
}
