//! # doc2index
//!
//! Dual-modality document indexing: text chunks and image summaries,
//! aligned for retrieval.
//!
//! ## Why this crate?
//!
//! Retrieval over office documents fails when the index only sees extracted
//! text — charts, scanned pages, and slide layouts carry meaning that plain
//! extraction loses or garbles. This crate decides **per page** how to
//! represent content: pages whose text and images separate cleanly are split
//! into independent units, while dense or slide-like pages are kept whole as
//! a single image. Every image — discrete or whole-page — is captioned by a
//! vision model and embedded *via that caption*, so both modalities land in
//! one vector space and stay aligned to the same `(document, page, unit)`
//! identifiers.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document bytes
//!  │
//!  ├─ 1. Normalize  pages from the external converter (text, images, raster)
//!  ├─ 2. Classify   simple (split) vs complex (whole-page image), per page
//!  ├─ 3. Extract    text chunks + table units + image units
//!  ├─ 4. Summarize  vision captions for image units (retry, budget, fallback)
//!  ├─ 5. Embed      vectors for chunk text and image summaries
//!  └─ 6. Index      two aligned collections + per-unit failure report
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doc2index::{ingest, Capabilities, IndexingConfig, JsonPageSource};
//! use doc2index::capability::openai::{OpenAiCaptioner, OpenAiEmbedder};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let key = std::env::var("OPENAI_API_KEY")?;
//!     let caps = Capabilities {
//!         normalizer: Arc::new(JsonPageSource::new()),
//!         captioner: Arc::new(OpenAiCaptioner::new(
//!             &key, "https://api.openai.com/v1", "gpt-4o-mini",
//!             Duration::from_secs(60),
//!         )?),
//!         embedder: Arc::new(OpenAiEmbedder::new(
//!             &key, "https://api.openai.com/v1", "text-embedding-3-small",
//!             None, Duration::from_secs(60),
//!         )?),
//!     };
//!     let config = IndexingConfig::default();
//!     let bytes = std::fs::read("document.pages.json")?;
//!     let output = ingest(&bytes, "application/json", "document.pdf", &config, &caps).await?;
//!     println!(
//!         "{:?}: {} text + {} image entries, {} failed",
//!         output.status,
//!         output.batch.text_entries.len(),
//!         output.batch.image_entries.len(),
//!         output.batch.failed.len(),
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2index` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! doc2index = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod capability;
pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod sink;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use capability::pagestream::{JsonPageSource, PAGE_STREAM_MIME};
pub use capability::{
    CallBudget, Capabilities, CapabilityError, NormalizeError, PageNormalizer, TextEmbedder,
    VisionCaptioner,
};
pub use config::{
    CancelFlag, ChunkPolicy, ClassifierThresholds, IndexingConfig, IndexingConfigBuilder,
};
pub use document::{
    Complexity, Document, EmbeddedImage, ImageUnit, ImageUnitKind, LayoutStats, Page, PageRaster,
    TextProvenance, TextSpan, TextUnit, Unit, UnitId,
};
pub use error::{IndexError, UnitError};
pub use ingest::{ingest, ingest_document, ingest_to_sink, ingest_with_budget, IngestState};
pub use output::{
    DocumentStatus, Embedding, FailedUnit, ImageIndexEntry, IndexBatch, IngestOutput, IngestStats,
    Modality, SourceMeta, TextIndexEntry,
};
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use sink::{IndexSink, JsonlSink};
pub use stream::{ingest_stream, IndexRecord, RecordStream};
