//! End-to-end integration tests for doc2index.
//!
//! These run the real pipeline — normalizer, classifier, extractor,
//! summarizer, embedder, index builder — against in-process fake
//! capabilities, so they are deterministic and need no network or API keys.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use doc2index::{
    ingest, ingest_stream, CancelFlag, Capabilities, CapabilityError, DocumentStatus,
    ImageUnitKind, IndexError, IndexRecord, IndexingConfig, IngestOutput, JsonPageSource,
    TextEmbedder, UnitError, VisionCaptioner, PAGE_STREAM_MIME,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

// ── Fake capabilities ────────────────────────────────────────────────────────

/// Deterministic captioner that counts its calls.
struct CountingCaptioner {
    calls: AtomicU32,
}

impl CountingCaptioner {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl VisionCaptioner for CountingCaptioner {
    async fn caption(
        &self,
        payload: &[u8],
        _mime: &str,
        _prompt: &str,
    ) -> Result<String, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("A figure spanning {} bytes of image data.", payload.len()))
    }
}

/// Deterministic embedder: an 8-dim vector derived from the input text.
/// Fails permanently on any input containing "poison".
struct HashEmbedder {
    calls: AtomicU32,
}

impl HashEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl TextEmbedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("poison") {
            return Err(CapabilityError::Permanent("payload rejected".into()));
        }
        let hash = text
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        Ok((0..8)
            .map(|i| ((hash.wrapping_add(i) % 1000) as f32) / 1000.0)
            .collect())
    }
}

fn capabilities(
    captioner: Arc<CountingCaptioner>,
    embedder: Arc<HashEmbedder>,
) -> Capabilities {
    Capabilities {
        normalizer: Arc::new(JsonPageSource::new()),
        captioner,
        embedder,
    }
}

// ── Page-stream builders ─────────────────────────────────────────────────────

fn b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

fn raster() -> Value {
    json!({"payload": b64(b"\x89PNG whole page"), "mime_type": "image/png"})
}

fn portrait() -> Value {
    json!({"width": 612.0, "height": 792.0})
}

fn landscape() -> Value {
    json!({"width": 960.0, "height": 540.0})
}

fn image(area: f32) -> Value {
    json!({"payload": b64(b"\x89PNG figure"), "mime_type": "image/png", "area_fraction": area})
}

fn span(text: &str, offset: usize) -> Value {
    json!({"text": text, "offset": offset})
}

fn doc_bytes(pages: Vec<Value>) -> Vec<u8> {
    serde_json::to_vec(&json!({ "pages": pages })).unwrap()
}

/// Page 1 of the canonical scenario: simple, two paragraphs and one figure.
fn simple_page() -> Value {
    json!({
        "spans": [
            span("First paragraph about quarterly revenue growth.", 0),
            span("Second paragraph covering the market outlook.", 48),
        ],
        "images": [image(0.1)],
        "raster": raster(),
        "layout": portrait(),
    })
}

/// Page 2 of the canonical scenario: landscape, kept whole.
fn complex_page() -> Value {
    json!({
        "spans": [span("Slide title", 0)],
        "images": [],
        "raster": raster(),
        "layout": landscape(),
    })
}

async fn run(bytes: &[u8], config: &IndexingConfig, caps: &Capabilities) -> IngestOutput {
    ingest(bytes, PAGE_STREAM_MIME, "report.pdf", config, caps)
        .await
        .expect("ingestion should succeed")
}

// ── The canonical two-page scenario ──────────────────────────────────────────

#[tokio::test]
async fn two_page_scenario_produces_aligned_dual_index() {
    let captioner = CountingCaptioner::new();
    let embedder = HashEmbedder::new();
    let caps = capabilities(captioner.clone(), embedder.clone());
    let config = IndexingConfig::default();

    let bytes = doc_bytes(vec![simple_page(), complex_page()]);
    let output = run(&bytes, &config, &caps).await;

    assert_eq!(output.status, DocumentStatus::Completed);
    assert_eq!(output.batch.text_entries.len(), 2, "page 1 has 2 chunks");
    assert_eq!(
        output.batch.image_entries.len(),
        2,
        "1 discrete image + 1 whole-page image"
    );
    assert!(output.batch.failed.is_empty());

    // All entries share the document id.
    let doc_id = &output.document_id;
    assert!(output
        .batch
        .text_entries
        .iter()
        .all(|e| &e.document_id == doc_id));
    assert!(output
        .batch
        .image_entries
        .iter()
        .all(|e| &e.document_id == doc_id));

    // Distinct unit keys across both collections.
    let mut keys: Vec<String> = output
        .batch
        .text_entries
        .iter()
        .map(|e| format!("{}_{}", e.page_no, e.unit_no))
        .chain(
            output
                .batch
                .image_entries
                .iter()
                .map(|e| format!("{}_{}", e.page_no, e.unit_no)),
        )
        .collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 4, "unit ids must be distinct");

    // The whole-page unit belongs to page 2; the discrete one to page 1.
    let whole: Vec<_> = output
        .batch
        .image_entries
        .iter()
        .filter(|e| e.kind == ImageUnitKind::WholePage)
        .collect();
    assert_eq!(whole.len(), 1);
    assert_eq!(whole[0].page_no, 1);

    // One caption per image unit; embeddings for all four units.
    assert_eq!(captioner.calls.load(Ordering::SeqCst), 2);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 4);

    // Image embeddings derive from summaries, which the fake captioner
    // produced; nothing fell back.
    assert!(output.batch.image_entries.iter().all(|e| e.summarized));
    assert_eq!(output.stats.caption_fallbacks, 0);
    assert_eq!(output.stats.simple_pages, 1);
    assert_eq!(output.stats.complex_pages, 1);
}

// ── Boundary and failure behaviour ───────────────────────────────────────────

#[tokio::test]
async fn empty_document_fails_with_zero_pages() {
    let caps = capabilities(CountingCaptioner::new(), HashEmbedder::new());
    let bytes = doc_bytes(vec![]);

    let err = ingest(
        &bytes,
        PAGE_STREAM_MIME,
        "empty.pdf",
        &IndexingConfig::default(),
        &caps,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, IndexError::EmptyDocument { .. }));
}

#[tokio::test]
async fn unsupported_format_fails() {
    let caps = capabilities(CountingCaptioner::new(), HashEmbedder::new());
    let err = ingest(
        b"%PDF-1.7 ...",
        "application/pdf",
        "native.pdf",
        &IndexingConfig::default(),
        &caps,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, IndexError::FormatUnsupported { .. }));
}

#[tokio::test]
async fn empty_page_yields_no_units_and_no_error() {
    let caps = capabilities(CountingCaptioner::new(), HashEmbedder::new());
    let empty = json!({"spans": [], "images": [], "raster": raster(), "layout": portrait()});
    let bytes = doc_bytes(vec![empty, simple_page()]);

    let output = run(&bytes, &IndexingConfig::default(), &caps).await;

    assert_eq!(output.status, DocumentStatus::Completed);
    // Only the simple page (now at index 1) contributes units.
    assert_eq!(output.batch.text_entries.len(), 2);
    assert!(output.batch.text_entries.iter().all(|e| e.page_no == 1));
}

#[tokio::test]
async fn one_permanent_failure_out_of_ten_partially_completes() {
    let captioner = CountingCaptioner::new();
    let embedder = HashEmbedder::new();
    let caps = capabilities(captioner, embedder);

    // Ten spans → ten chunks; exactly one poisoned.
    let mut offset = 0;
    let spans: Vec<Value> = (0..10)
        .map(|i| {
            let text = if i == 6 {
                format!("Chunk number {i} containing poison for the embedder.")
            } else {
                format!("Chunk number {i} with perfectly ordinary content here.")
            };
            let s = span(&text, offset);
            offset += text.chars().count() + 1;
            s
        })
        .collect();
    let page = json!({"spans": spans, "images": [], "raster": raster(), "layout": portrait()});
    let bytes = doc_bytes(vec![page]);

    let output = run(&bytes, &IndexingConfig::default(), &caps).await;

    assert_eq!(output.status, DocumentStatus::PartiallyCompleted);
    assert_eq!(output.batch.text_entries.len(), 9);
    assert_eq!(output.batch.failed.len(), 1);
    assert_eq!(output.batch.failed[0].unit_id.unit_no, 6);
    assert!(matches!(
        output.batch.failed[0].error,
        UnitError::EmbeddingFailed { .. }
    ));
    assert_eq!(output.stats.indexed_entries, 9);
    assert_eq!(output.stats.failed_units, 1);
}

#[tokio::test]
async fn exhausted_caption_budget_degrades_but_completes() {
    let captioner = CountingCaptioner::new();
    let embedder = HashEmbedder::new();
    let caps = capabilities(captioner.clone(), embedder);
    let config = IndexingConfig::builder().caption_budget(0).build().unwrap();

    let bytes = doc_bytes(vec![simple_page(), complex_page()]);
    let output = run(&bytes, &config, &caps).await;

    // Degraded, not failed: both image units indexed under the fallback.
    assert_eq!(output.status, DocumentStatus::Completed);
    assert_eq!(output.batch.image_entries.len(), 2);
    assert!(output.batch.image_entries.iter().all(|e| !e.summarized));
    assert!(output
        .batch
        .image_entries
        .iter()
        .all(|e| e.summary == "[unsummarized image]"));
    assert_eq!(output.stats.caption_fallbacks, 2);
    assert_eq!(captioner.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancellation_discards_units_without_external_calls() {
    let captioner = CountingCaptioner::new();
    let embedder = HashEmbedder::new();
    let caps = capabilities(captioner.clone(), embedder.clone());

    let cancel = CancelFlag::new();
    cancel.cancel();
    let config = IndexingConfig::builder()
        .cancel_flag(cancel)
        .build()
        .unwrap();

    let bytes = doc_bytes(vec![simple_page()]);
    let output = run(&bytes, &config, &caps).await;

    assert_eq!(output.status, DocumentStatus::PartiallyCompleted);
    assert_eq!(output.batch.entry_count(), 0, "nothing indexed after cancel");
    assert_eq!(output.batch.failed.len(), 3, "2 chunks + 1 image discarded");
    assert!(output
        .batch
        .failed
        .iter()
        .all(|f| matches!(f.error, UnitError::Cancelled { .. })));
    assert_eq!(captioner.calls.load(Ordering::SeqCst), 0);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_raster_on_complex_page_fails_that_unit_only() {
    let caps = capabilities(CountingCaptioner::new(), HashEmbedder::new());
    let broken = json!({
        "spans": [span("Slide title", 0)],
        "images": [],
        "layout": landscape(),
    });
    let bytes = doc_bytes(vec![broken, simple_page()]);

    let output = run(&bytes, &IndexingConfig::default(), &caps).await;

    assert_eq!(output.status, DocumentStatus::PartiallyCompleted);
    assert_eq!(output.batch.failed.len(), 1);
    assert!(matches!(
        output.batch.failed[0].error,
        UnitError::MissingRaster { page: 0 }
    ));
    // The healthy page is indexed in full.
    assert_eq!(output.batch.text_entries.len(), 2);
    assert_eq!(output.batch.image_entries.len(), 1);
}

// ── Idempotence ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn rerunning_an_unchanged_document_yields_identical_unit_ids() {
    let caps = capabilities(CountingCaptioner::new(), HashEmbedder::new());
    let config = IndexingConfig::default();
    let bytes = doc_bytes(vec![simple_page(), complex_page()]);

    let first = run(&bytes, &config, &caps).await;
    let second = run(&bytes, &config, &caps).await;

    assert_eq!(first.document_id, second.document_id);
    let keys = |o: &IngestOutput| -> Vec<String> {
        let mut k: Vec<String> = o
            .batch
            .text_entries
            .iter()
            .map(|e| e.key())
            .chain(o.batch.image_entries.iter().map(|e| e.key()))
            .collect();
        k.sort();
        k
    };
    assert_eq!(keys(&first), keys(&second));
}

// ── Streaming API ────────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_emits_every_entry_the_eager_api_would() {
    let caps = capabilities(CountingCaptioner::new(), HashEmbedder::new());
    let config = IndexingConfig::default();
    let bytes = doc_bytes(vec![simple_page(), complex_page()]);

    let eager = run(&bytes, &config, &caps).await;

    let mut stream = ingest_stream(&bytes, PAGE_STREAM_MIME, "report.pdf", &config, &caps)
        .await
        .expect("stream creation should succeed");

    let mut streamed_keys: Vec<String> = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(IndexRecord::Text(entry)) => streamed_keys.push(entry.key()),
            Ok(IndexRecord::Image(entry)) => streamed_keys.push(entry.key()),
            Err(failed) => panic!("unexpected failed unit: {}", failed.error),
        }
    }
    streamed_keys.sort();

    let mut eager_keys: Vec<String> = eager
        .batch
        .text_entries
        .iter()
        .map(|e| e.key())
        .chain(eager.batch.image_entries.iter().map(|e| e.key()))
        .collect();
    eager_keys.sort();

    assert_eq!(streamed_keys, eager_keys);
}

// ── Serialisation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn output_round_trips_through_json() {
    let caps = capabilities(CountingCaptioner::new(), HashEmbedder::new());
    let bytes = doc_bytes(vec![simple_page()]);
    let output = run(&bytes, &IndexingConfig::default(), &caps).await;

    let json = serde_json::to_string_pretty(&output).expect("IngestOutput must serialise");
    let back: IngestOutput = serde_json::from_str(&json).expect("must deserialise back");
    assert_eq!(back.document_id, output.document_id);
    assert_eq!(back.batch.entry_count(), output.batch.entry_count());
    assert_eq!(back.status, output.status);
}
