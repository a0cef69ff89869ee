//! External capabilities consumed by the pipeline.
//!
//! The pipeline never talks to a model endpoint or a document converter
//! directly — it goes through the three traits here, held as `Arc<dyn …>`:
//!
//! * [`PageNormalizer`] — turns document bytes into a page sequence
//! * [`VisionCaptioner`] — turns image bytes into a textual caption
//! * [`TextEmbedder`] — turns text into a fixed-length vector
//!
//! Keeping these as seams means tests run against in-process fakes, the CLI
//! wires up the reqwest-backed clients in [`openai`], and a serving layer can
//! inject whatever providers it already has.
//!
//! [`CapabilityError`] is the shared failure taxonomy: transient errors are
//! retried with backoff by the pipeline, permanent ones are not.

use crate::document::Page;
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub mod openai;
pub mod pagestream;

/// Failure taxonomy shared by the caption and embedding capabilities.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    /// Timeout, connection reset, 5xx — worth retrying with backoff.
    #[error("transient capability failure: {0}")]
    Transient(String),

    /// HTTP 429. Retried like a transient failure, honouring the
    /// server-specified delay when present.
    #[error("rate limited by capability provider")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Invalid payload, auth failure, 4xx — retrying will not help.
    #[error("permanent capability failure: {0}")]
    Permanent(String),
}

impl CapabilityError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CapabilityError::Transient(_) | CapabilityError::RateLimited { .. }
        )
    }
}

/// Errors from the page normalizer. Both are fatal for the document.
#[derive(Debug, Clone, Error)]
pub enum NormalizeError {
    #[error("format '{mime_type}' is not supported")]
    FormatUnsupported { mime_type: String },

    #[error("document could not be parsed: {detail}")]
    CorruptDocument { detail: String },
}

/// Turns one input document into an ordered sequence of normalised pages.
///
/// This is the pipeline's only input; rendering and format conversion live
/// entirely behind this trait.
#[async_trait]
pub trait PageNormalizer: Send + Sync {
    async fn normalize(&self, bytes: &[u8], mime_type: &str) -> Result<Vec<Page>, NormalizeError>;
}

/// Produces a textual caption for an image.
#[async_trait]
pub trait VisionCaptioner: Send + Sync {
    async fn caption(
        &self,
        payload: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, CapabilityError>;
}

/// Produces an embedding vector for a piece of text.
///
/// The returned dimensionality must be constant for the lifetime of a
/// pipeline run; the embedder stage pins the first observed dimension and
/// rejects later mismatches.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError>;
}

/// The capability set a pipeline run needs.
#[derive(Clone)]
pub struct Capabilities {
    pub normalizer: Arc<dyn PageNormalizer>,
    pub captioner: Arc<dyn VisionCaptioner>,
    pub embedder: Arc<dyn TextEmbedder>,
}

/// Shared external-call budget, decremented atomically by concurrent units.
///
/// Construct one per document from [`crate::config::IndexingConfig::caption_budget`],
/// or share one instance across documents to enforce a global quota. When the
/// budget is exhausted, the summarizer skips the caption call and installs
/// the fallback summary instead.
#[derive(Debug, Clone)]
pub struct CallBudget {
    remaining: Arc<AtomicI64>,
    limited: bool,
}

impl CallBudget {
    /// A budget allowing at most `calls` external calls.
    pub fn limited(calls: u64) -> Self {
        Self {
            remaining: Arc::new(AtomicI64::new(calls.min(i64::MAX as u64) as i64)),
            limited: true,
        }
    }

    /// No limit; every acquisition succeeds.
    pub fn unlimited() -> Self {
        Self {
            remaining: Arc::new(AtomicI64::new(0)),
            limited: false,
        }
    }

    /// Try to reserve one call. Returns false once the budget is spent.
    pub fn try_acquire(&self) -> bool {
        if !self.limited {
            return true;
        }
        // fetch_sub may briefly push the counter negative under contention;
        // the sign check keeps the accounting correct either way.
        self.remaining.fetch_sub(1, Ordering::SeqCst) > 0
    }

    /// Calls still available, if this budget is limited.
    pub fn remaining(&self) -> Option<u64> {
        self.limited
            .then(|| self.remaining.load(Ordering::SeqCst).max(0) as u64)
    }
}
