//! Eager (full-document) ingestion entry points.
//!
//! This module drives the stages in order for one document — normalize,
//! classify, extract, summarize, embed, index — and reports a per-document
//! outcome. It is the simpler API: wait for everything, then return the
//! assembled [`IngestOutput`]. Use [`crate::stream::ingest_stream`] to
//! receive index entries progressively instead.
//!
//! ## Failure containment
//!
//! Unit-level failures (an embedding call that exhausts its retries, a
//! missing raster) are collected into the batch's failure list and the
//! document finishes `PartiallyCompleted`. Only document-level preconditions
//! — normalization failure, zero pages — and ordering-contract violations
//! return `Err` from these functions.
//!
//! ## Concurrency
//!
//! Pages and units are independent, so all units are flattened into one
//! stream and processed with `buffer_unordered` bounded by
//! `config.concurrency` — the crate's concession to provider rate limits.
//! The summarize-before-embed dependency holds inside each unit's task; it
//! is never a global barrier, so units complete out of order.

use crate::capability::{Capabilities, CallBudget, NormalizeError};
use crate::config::IndexingConfig;
use crate::document::{Complexity, Document, Unit, UnitId};
use crate::error::{IndexError, UnitError};
use crate::index::{self, UnitOutcome};
use crate::output::{
    DocumentStatus, FailedUnit, IngestOutput, IngestStats, Modality, PageShapeStats,
};
use crate::pipeline::embed::{embed_image_unit, embed_text_unit, DimensionPin, EmbedError};
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::summarize::summarize;
use crate::pipeline::{classify, extract};
use crate::sink::IndexSink;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Document lifecycle states. Transitions are strictly forward; no stage
/// re-enters an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum IngestState {
    Normalizing = 0,
    Classifying = 1,
    Extracting = 2,
    Summarizing = 3,
    Embedding = 4,
    Indexing = 5,
}

/// Forward-only state recorder, shared with concurrent unit tasks.
///
/// `advance` keeps the maximum state seen, so a late summarize on one unit
/// can never roll the document back from `Embedding` to `Summarizing`.
struct StateTracker {
    document_id: String,
    state: AtomicU8,
}

impl StateTracker {
    fn new(document_id: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            state: AtomicU8::new(IngestState::Normalizing as u8),
        }
    }

    fn advance(&self, next: IngestState) {
        let prev = self.state.fetch_max(next as u8, Ordering::SeqCst);
        if prev < next as u8 {
            debug!(document_id = %self.document_id, state = ?next, "stage entered");
        }
    }
}

/// Ingest one document into a dual index batch.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `bytes` — raw document bytes
/// * `mime_type` — the document's MIME type, passed to the normalizer
/// * `file_name` — source name carried into entry metadata
///
/// # Returns
/// `Ok(IngestOutput)` on success, even if some units failed (check
/// `output.status` and `output.batch.failed`).
///
/// # Errors
/// Returns `Err(IndexError)` only for fatal errors: unsupported format,
/// corrupt document, zero pages, or an ordering-contract violation.
pub async fn ingest(
    bytes: &[u8],
    mime_type: &str,
    file_name: &str,
    config: &IndexingConfig,
    caps: &Capabilities,
) -> Result<IngestOutput, IndexError> {
    let budget = match config.caption_budget {
        Some(calls) => CallBudget::limited(calls),
        None => CallBudget::unlimited(),
    };
    ingest_with_budget(bytes, mime_type, file_name, config, caps, budget).await
}

/// Like [`ingest`], but with a caller-supplied call budget.
///
/// Pass the same [`CallBudget`] to several calls to enforce a global quota
/// across documents instead of the per-document budget in the config.
pub async fn ingest_with_budget(
    bytes: &[u8],
    mime_type: &str,
    file_name: &str,
    config: &IndexingConfig,
    caps: &Capabilities,
    budget: CallBudget,
) -> Result<IngestOutput, IndexError> {
    info!(file_name, mime_type, "starting ingestion");

    // ── Step 1: Normalize ────────────────────────────────────────────────
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

    let document = Document {
        document_id: Document::id_from_bytes(bytes),
        file_name: file_name.to_string(),
        mime_type: mime_type.to_string(),
        pages,
    };
    info!(document_id = %document.document_id, pages = document.page_count(), "document normalised");

    ingest_document(document, config, caps, budget).await
}

/// Ingest an already-normalised document.
///
/// The normalizer in `caps` is not consulted; use this when pages come from
/// somewhere other than raw bytes (replays, tests, a serving layer that
/// normalises upstream).
pub async fn ingest_document(
    mut document: Document,
    config: &IndexingConfig,
    caps: &Capabilities,
    budget: CallBudget,
) -> Result<IngestOutput, IndexError> {
    let total_start = Instant::now();
    let tracker = Arc::new(StateTracker::new(&document.document_id));
    let mut stats = IngestStats {
        total_pages: document.page_count(),
        ..Default::default()
    };

    if document.pages.is_empty() {
        return Err(IndexError::EmptyDocument {
            file_name: document.file_name.clone(),
        });
    }

    // ── Step 2: Classify every page, exactly once ────────────────────────
    tracker.advance(IngestState::Classifying);
    let mut shape = PageShapeStats::default();
    for page in &mut document.pages {
        let verdict = classify::classify(page, &config.thresholds);
        let fixed = page.classify_once(verdict.complexity);
        shape.update(page.has_text(), page.has_images());
        match fixed {
            Complexity::Simple => stats.simple_pages += 1,
            Complexity::Complex => stats.complex_pages += 1,
        }
        debug!(
            page = page.page_no,
            complexity = ?fixed,
            reason = %verdict.reason,
            "page classified"
        );
    }
    shape.log_summary(&document.document_id);

    // ── Step 3: Extract units ────────────────────────────────────────────
    tracker.advance(IngestState::Extracting);
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
    stats.text_units = units.iter().filter(|u| matches!(u, Unit::Text(_))).count();
    stats.image_units = units.iter().filter(|u| matches!(u, Unit::Image(_))).count();
    info!(
        document_id = %document.document_id,
        text_units = stats.text_units,
        image_units = stats.image_units,
        "extraction complete"
    );

    let total_units = units.len() + upfront_failures.len();
    if let Some(ref cb) = config.progress {
        cb.on_ingest_start(total_units);
        for failed in &upfront_failures {
            cb.on_unit_error(
                failed.unit_id.to_string(),
                total_units,
                failed.error.to_string(),
            );
        }
    }

    // ── Step 4: Summarize + embed, bounded concurrency ───────────────────
    tracker.advance(IngestState::Summarizing);
    let external_start = Instant::now();
    let policy = RetryPolicy {
        max_retries: config.max_retries,
        backoff_ms: config.retry_backoff_ms,
    };
    let pin = Arc::new(DimensionPin::new());

    let task_results: Vec<Result<UnitOutcome, IndexError>> =
        stream::iter(units.into_iter().map(|unit| {
            let captioner = Arc::clone(&caps.captioner);
            let embedder = Arc::clone(&caps.embedder);
            let budget = budget.clone();
            let config = config.clone();
            let pin = Arc::clone(&pin);
            let tracker = Arc::clone(&tracker);
            let file_name = document.file_name.clone();
            async move {
                process_unit(
                    unit, &captioner, &embedder, &budget, &config, &pin, &tracker, &file_name,
                    total_units,
                )
                .await
            }
        }))
        .buffer_unordered(config.concurrency)
        .collect()
        .await;
    stats.external_duration_ms = external_start.elapsed().as_millis() as u64;

    let mut outcomes: Vec<UnitOutcome> = Vec::with_capacity(task_results.len());
    for result in task_results {
        outcomes.push(result?);
    }
    outcomes.extend(upfront_failures.into_iter().map(UnitOutcome::Failed));

    stats.caption_fallbacks = outcomes
        .iter()
        .filter(|o| matches!(o, UnitOutcome::Image { fallback: true, .. }))
        .count();

    // ── Step 5: Assemble the dual index ──────────────────────────────────
    tracker.advance(IngestState::Indexing);
    let batch = index::build(&document, outcomes);
    stats.indexed_entries = batch.entry_count();
    stats.failed_units = batch.failed.len();
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    let status = if batch.failed.is_empty() {
        DocumentStatus::Completed
    } else {
        DocumentStatus::PartiallyCompleted
    };

    if let Some(ref cb) = config.progress {
        cb.on_ingest_complete(total_units, stats.indexed_entries);
    }
    info!(
        document_id = %document.document_id,
        ?status,
        entries = stats.indexed_entries,
        failed = stats.failed_units,
        duration_ms = stats.total_duration_ms,
        "ingestion finished"
    );

    Ok(IngestOutput {
        document_id: document.document_id,
        status,
        batch,
        stats,
    })
}

/// Ingest a document and hand the finished batch to a persistence sink.
///
/// The batch is emitted only after every unit has settled, so the sink always
/// receives a complete, internally consistent batch for the document.
pub async fn ingest_to_sink(
    bytes: &[u8],
    mime_type: &str,
    file_name: &str,
    config: &IndexingConfig,
    caps: &Capabilities,
    sink: &dyn IndexSink,
) -> Result<IngestOutput, IndexError> {
    let output = ingest(bytes, mime_type, file_name, config, caps).await?;
    sink.persist(&output.batch).await?;
    Ok(output)
}

/// Run one unit through its external calls.
///
/// Image units summarize first, then embed — a per-unit dependency enforced
/// here by control flow and double-checked by the embedder's ordering guard.
#[allow(clippy::too_many_arguments)]
async fn process_unit(
    unit: Unit,
    captioner: &Arc<dyn crate::capability::VisionCaptioner>,
    embedder: &Arc<dyn crate::capability::TextEmbedder>,
    budget: &CallBudget,
    config: &IndexingConfig,
    pin: &DimensionPin,
    tracker: &StateTracker,
    file_name: &str,
    total_units: usize,
) -> Result<UnitOutcome, IndexError> {
    let policy = RetryPolicy {
        max_retries: config.max_retries,
        backoff_ms: config.retry_backoff_ms,
    };
    let label = unit.id().to_string();
    let modality = match &unit {
        Unit::Text(_) => Modality::Text,
        Unit::Image(_) => Modality::ImageSummary,
    };

    // A cancelled document stops issuing new external calls; the unit is
    // discarded, not indexed with defaults.
    if config.cancel.is_cancelled() {
        return Ok(cancelled(unit, modality, config, total_units));
    }

    if let Some(ref cb) = config.progress {
        cb.on_unit_start(label.clone(), total_units);
    }

    let outcome = match unit {
        Unit::Text(text_unit) => {
            tracker.advance(IngestState::Embedding);
            match embed_text_unit(embedder, &text_unit, pin, policy).await {
                Ok(embedding) => UnitOutcome::Text {
                    unit: text_unit,
                    embedding,
                },
                Err(error) => UnitOutcome::Failed(FailedUnit {
                    unit_id: text_unit.id,
                    modality,
                    error,
                }),
            }
        }
        Unit::Image(image_unit) => {
            let summarized = summarize(captioner, budget, file_name, image_unit, config).await;

            if config.cancel.is_cancelled() {
                return Ok(cancelled(
                    Unit::Image(summarized.unit),
                    modality,
                    config,
                    total_units,
                ));
            }

            tracker.advance(IngestState::Embedding);
            match embed_image_unit(embedder, &summarized.unit, pin, policy).await {
                Ok(embedding) => UnitOutcome::Image {
                    unit: summarized.unit,
                    embedding,
                    fallback: summarized.fallback,
                },
                Err(EmbedError::OrderingViolation { unit }) => {
                    return Err(IndexError::OrderingViolation {
                        unit: unit.to_string(),
                    });
                }
                Err(EmbedError::Unit(error)) => UnitOutcome::Failed(FailedUnit {
                    unit_id: summarized.unit.id,
                    modality,
                    error,
                }),
            }
        }
    };

    if let Some(ref cb) = config.progress {
        match &outcome {
            UnitOutcome::Failed(failed) => {
                cb.on_unit_error(label, total_units, failed.error.to_string())
            }
            _ => cb.on_unit_complete(label, total_units),
        }
    }

    Ok(outcome)
}

fn cancelled(
    unit: Unit,
    modality: Modality,
    config: &IndexingConfig,
    total_units: usize,
) -> UnitOutcome {
    let unit_id = unit.id().clone();
    let error = UnitError::Cancelled {
        unit: unit_id.to_string(),
    };
    if let Some(ref cb) = config.progress {
        cb.on_unit_error(unit_id.to_string(), total_units, error.to_string());
    }
    UnitOutcome::Failed(FailedUnit {
        unit_id,
        modality,
        error,
    })
}
