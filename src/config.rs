//! Configuration types for the indexing pipeline.
//!
//! All pipeline behaviour is controlled through [`IndexingConfig`], built via
//! its [`IndexingConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across tasks, log them, and diff two runs to
//! understand why their indexes differ.
//!
//! The classification thresholds and the chunking policy are deliberately
//! configuration, not constants: the right values depend on the corpus, and
//! two runs over the same document with the same config must classify and
//! chunk identically.

use crate::error::IndexError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Thresholds driving the page complexity decision.
///
/// Defaults mirror the signals observed to work on real office documents:
/// slide exports and infographic-dense pages read far better as one image
/// than as a bag of fragments.
#[derive(Debug, Clone)]
pub struct ClassifierThresholds {
    /// A page whose vertical lines + curves + embedded images meet this count
    /// is treated as an infographic and kept whole. Default: 9.
    pub visual_element_limit: u32,

    /// Pages wider than `height × landscape_ratio` are treated as slides or
    /// posters and kept whole. Default: 1.2.
    pub landscape_ratio: f32,

    /// When embedded images cover more than this fraction of the page,
    /// independent extraction would strand the text fragments between them.
    /// Default: 0.5.
    pub max_image_area_fraction: f32,

    /// A page with fewer extractable chars than this, alongside images, has
    /// text too sparse to stand on its own. Default: 32.
    pub sparse_text_chars: usize,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            visual_element_limit: 9,
            landscape_ratio: 1.2,
            max_image_area_fraction: 0.5,
            sparse_text_chars: 32,
        }
    }
}

/// Text chunking policy for simple pages.
#[derive(Debug, Clone)]
pub struct ChunkPolicy {
    /// Hard upper bound on chars per chunk. Default: 1600.
    ///
    /// Chunks are cut at the best boundary at or before this bound:
    /// paragraph break, then sentence end, then whitespace, then a hard cut.
    pub max_chunk_chars: usize,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            max_chunk_chars: 1600,
        }
    }
}

/// Cooperative cancellation flag for a document run.
///
/// Cancelling stops the pipeline from issuing new external calls promptly;
/// calls already in flight complete or time out individually. Units that had
/// not finished at cancellation time are discarded, never indexed with
/// default values.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Configuration for a document indexing run.
///
/// Built via [`IndexingConfig::builder()`] or [`IndexingConfig::default()`].
///
/// # Example
/// ```rust
/// use doc2index::IndexingConfig;
///
/// let config = IndexingConfig::builder()
///     .concurrency(8)
///     .max_retries(2)
///     .caption_budget(200)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct IndexingConfig {
    /// Complexity classification thresholds.
    pub thresholds: ClassifierThresholds,

    /// Text chunking policy.
    pub chunking: ChunkPolicy,

    /// Embedded images covering less than this fraction of the page are
    /// decorative noise (spacers, rules) and are not extracted. Default: 0.0005.
    pub min_image_area_fraction: f32,

    /// Number of units processed concurrently. Default: 10.
    ///
    /// The external caption and embedding calls are network-bound; this bound
    /// is also the crate's concession to provider rate limits — lower it when
    /// the APIs answer 429.
    pub concurrency: usize,

    /// Maximum retry attempts on a transient external-call failure. Default: 3.
    ///
    /// Permanent errors (invalid payload, auth) are not retried; they surface
    /// immediately.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s.
    pub retry_backoff_ms: u64,

    /// Maximum vision-caption calls for this document. `None` = unlimited.
    ///
    /// When the budget runs out, remaining image units receive the fallback
    /// summary instead of a caption; the pipeline still completes.
    pub caption_budget: Option<u64>,

    /// Custom caption prompt. If `None`, uses the built-in default.
    pub caption_prompt: Option<String>,

    /// Summary installed when captioning fails or the budget is exhausted.
    /// Deterministic, so reprocessing an unchanged document is stable.
    pub fallback_summary: String,

    /// Progress callback for per-unit events.
    pub progress: Option<ProgressCallback>,

    /// Cancellation flag shared with the caller.
    pub cancel: CancelFlag,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            thresholds: ClassifierThresholds::default(),
            chunking: ChunkPolicy::default(),
            min_image_area_fraction: 0.0005,
            concurrency: 10,
            max_retries: 3,
            retry_backoff_ms: 500,
            caption_budget: None,
            caption_prompt: None,
            fallback_summary: "[unsummarized image]".to_string(),
            progress: None,
            cancel: CancelFlag::new(),
        }
    }
}

impl fmt::Debug for IndexingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexingConfig")
            .field("thresholds", &self.thresholds)
            .field("chunking", &self.chunking)
            .field("min_image_area_fraction", &self.min_image_area_fraction)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("caption_budget", &self.caption_budget)
            .field("fallback_summary", &self.fallback_summary)
            .field("progress", &self.progress.as_ref().map(|_| "<dyn IngestProgressCallback>"))
            .finish()
    }
}

impl IndexingConfig {
    /// Create a new builder for `IndexingConfig`.
    pub fn builder() -> IndexingConfigBuilder {
        IndexingConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IndexingConfig`].
#[derive(Debug)]
pub struct IndexingConfigBuilder {
    config: IndexingConfig,
}

impl IndexingConfigBuilder {
    pub fn thresholds(mut self, t: ClassifierThresholds) -> Self {
        self.config.thresholds = t;
        self
    }

    pub fn visual_element_limit(mut self, n: u32) -> Self {
        self.config.thresholds.visual_element_limit = n.max(1);
        self
    }

    pub fn landscape_ratio(mut self, r: f32) -> Self {
        self.config.thresholds.landscape_ratio = r.max(1.0);
        self
    }

    pub fn max_image_area_fraction(mut self, f: f32) -> Self {
        self.config.thresholds.max_image_area_fraction = f.clamp(0.0, 1.0);
        self
    }

    pub fn sparse_text_chars(mut self, n: usize) -> Self {
        self.config.thresholds.sparse_text_chars = n;
        self
    }

    pub fn max_chunk_chars(mut self, n: usize) -> Self {
        self.config.chunking.max_chunk_chars = n.max(1);
        self
    }

    pub fn min_image_area_fraction(mut self, f: f32) -> Self {
        self.config.min_image_area_fraction = f.clamp(0.0, 1.0);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn caption_budget(mut self, calls: u64) -> Self {
        self.config.caption_budget = Some(calls);
        self
    }

    pub fn caption_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.caption_prompt = Some(prompt.into());
        self
    }

    pub fn fallback_summary(mut self, s: impl Into<String>) -> Self {
        self.config.fallback_summary = s.into();
        self
    }

    pub fn progress(mut self, cb: ProgressCallback) -> Self {
        self.config.progress = Some(cb);
        self
    }

    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.config.cancel = flag;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IndexingConfig, IndexError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(IndexError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if c.chunking.max_chunk_chars == 0 {
            return Err(IndexError::InvalidConfig(
                "max_chunk_chars must be ≥ 1".into(),
            ));
        }
        if c.fallback_summary.trim().is_empty() {
            return Err(IndexError::InvalidConfig(
                "fallback_summary must be non-empty".into(),
            ));
        }
        Ok(self.config)
    }
}
