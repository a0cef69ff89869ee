//! Embedding: turn unit text into index vectors.
//!
//! Text units embed their raw text; image units embed their textual summary —
//! never raw pixels. That makes the summarize stage a hard prerequisite for
//! image units, and this module is where that contract is enforced: an image
//! unit arriving without a summary is an ordering violation, a programming
//! error that aborts the document instead of being papered over.
//!
//! The external capability may be nondeterministic across calls, but its
//! dimensionality must not be: the first successful call of a run pins the
//! vector length, and any later mismatch fails that unit.

use crate::capability::TextEmbedder;
use crate::document::{ImageUnit, TextUnit, UnitId};
use crate::error::UnitError;
use crate::output::{Embedding, Modality};
use crate::pipeline::retry::{with_backoff, RetryError, RetryPolicy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Pins the embedding dimensionality for one pipeline run.
///
/// Zero means "not yet observed". Shared across all concurrent units of a
/// run; the first successful embedding wins the race and every later vector
/// must match it.
#[derive(Debug, Default)]
pub struct DimensionPin(AtomicUsize);

impl DimensionPin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `dim` if no dimension is pinned yet; return the pinned value.
    fn pin(&self, dim: usize) -> usize {
        match self
            .0
            .compare_exchange(0, dim, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => dim,
            Err(existing) => existing,
        }
    }
}

/// How an embedding attempt failed.
#[derive(Debug)]
pub enum EmbedError {
    /// Image unit had no summary — summarizer must run first. Fatal.
    OrderingViolation { unit: UnitId },
    /// The unit failed; the document continues without it.
    Unit(UnitError),
}

/// Embed a text unit's raw text.
pub async fn embed_text_unit(
    embedder: &Arc<dyn TextEmbedder>,
    unit: &TextUnit,
    pin: &DimensionPin,
    policy: RetryPolicy,
) -> Result<Embedding, UnitError> {
    embed_input(embedder, &unit.id, Modality::Text, &unit.text, pin, policy).await
}

/// Embed an image unit's summary.
///
/// # Errors
/// [`EmbedError::OrderingViolation`] when `unit.summary` is `None`; this is
/// never silently worked around.
pub async fn embed_image_unit(
    embedder: &Arc<dyn TextEmbedder>,
    unit: &ImageUnit,
    pin: &DimensionPin,
    policy: RetryPolicy,
) -> Result<Embedding, EmbedError> {
    let summary = unit.summary.as_deref().ok_or(EmbedError::OrderingViolation {
        unit: unit.id.clone(),
    })?;
    embed_input(
        embedder,
        &unit.id,
        Modality::ImageSummary,
        summary,
        pin,
        policy,
    )
    .await
    .map_err(EmbedError::Unit)
}

async fn embed_input(
    embedder: &Arc<dyn TextEmbedder>,
    unit_id: &UnitId,
    modality: Modality,
    input: &str,
    pin: &DimensionPin,
    policy: RetryPolicy,
) -> Result<Embedding, UnitError> {
    let label = unit_id.to_string();

    let vector = with_backoff(policy, &label, || embedder.embed(input))
        .await
        .map_err(|err| match err {
            RetryError::Exhausted { attempts, last } => UnitError::EmbeddingFailed {
                unit: label.clone(),
                retries: attempts.saturating_sub(1),
                detail: last,
            },
            RetryError::Permanent(detail) => UnitError::EmbeddingFailed {
                unit: label.clone(),
                retries: 0,
                detail,
            },
        })?;

    let expected = pin.pin(vector.len());
    if vector.len() != expected {
        return Err(UnitError::DimensionMismatch {
            unit: label,
            expected,
            got: vector.len(),
        });
    }

    debug!(unit = %unit_id, dim = vector.len(), ?modality, "embedded");
    Ok(Embedding {
        unit_id: unit_id.clone(),
        modality,
        vector,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityError;
    use crate::document::{ImageUnitKind, TextProvenance};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            backoff_ms: 1,
        }
    }

    fn text_unit(text: &str) -> TextUnit {
        TextUnit {
            id: UnitId::new("doc", 0, 0),
            text: text.into(),
            provenance: TextProvenance::CharRange {
                start: 0,
                end: text.chars().count(),
            },
        }
    }

    fn image_unit(summary: Option<&str>) -> ImageUnit {
        ImageUnit {
            id: UnitId::new("doc", 1, 0),
            kind: ImageUnitKind::WholePage,
            payload: vec![0],
            mime_type: "image/png".into(),
            summary: summary.map(String::from),
        }
    }

    /// Deterministic fake: vector of `dim` values derived from the text.
    struct HashEmbedder {
        dim: usize,
    }

    #[async_trait]
    impl TextEmbedder for HashEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
            let hash = text
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            Ok((0..self.dim)
                .map(|i| ((hash.wrapping_add(i as u64) % 1000) as f32) / 1000.0)
                .collect())
        }
    }

    struct FailingEmbedder {
        calls: AtomicU32,
    }

    #[async_trait]
    impl TextEmbedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CapabilityError::Transient("503".into()))
        }
    }

    #[tokio::test]
    async fn embeds_text_unit() {
        let embedder: Arc<dyn TextEmbedder> = Arc::new(HashEmbedder { dim: 8 });
        let pin = DimensionPin::new();
        let embedding = embed_text_unit(&embedder, &text_unit("hello"), &pin, policy())
            .await
            .unwrap();
        assert_eq!(embedding.vector.len(), 8);
        assert_eq!(embedding.modality, Modality::Text);
    }

    #[tokio::test]
    async fn rejects_image_unit_without_summary() {
        let embedder: Arc<dyn TextEmbedder> = Arc::new(HashEmbedder { dim: 8 });
        let pin = DimensionPin::new();
        let err = embed_image_unit(&embedder, &image_unit(None), &pin, policy())
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedError::OrderingViolation { .. }));
    }

    #[tokio::test]
    async fn embeds_image_unit_from_summary() {
        let embedder: Arc<dyn TextEmbedder> = Arc::new(HashEmbedder { dim: 8 });
        let pin = DimensionPin::new();
        let embedding =
            embed_image_unit(&embedder, &image_unit(Some("a chart")), &pin, policy())
                .await
                .unwrap();
        assert_eq!(embedding.modality, Modality::ImageSummary);
    }

    #[tokio::test]
    async fn exhausted_retries_mark_the_unit_failed() {
        let inner = Arc::new(FailingEmbedder {
            calls: AtomicU32::new(0),
        });
        let embedder: Arc<dyn TextEmbedder> = inner.clone();
        let pin = DimensionPin::new();
        let err = embed_text_unit(&embedder, &text_unit("x"), &pin, policy())
            .await
            .unwrap_err();
        assert!(matches!(err, UnitError::EmbeddingFailed { retries: 1, .. }));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_detected() {
        struct ShrinkingEmbedder {
            calls: AtomicU32,
        }

        #[async_trait]
        impl TextEmbedder for ShrinkingEmbedder {
            async fn embed(&self, _text: &str) -> Result<Vec<f32>, CapabilityError> {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![0.0; if n == 0 { 8 } else { 4 }])
            }
        }

        let embedder: Arc<dyn TextEmbedder> = Arc::new(ShrinkingEmbedder {
            calls: AtomicU32::new(0),
        });
        let pin = DimensionPin::new();

        embed_text_unit(&embedder, &text_unit("first"), &pin, policy())
            .await
            .unwrap();
        let err = embed_text_unit(&embedder, &text_unit("second"), &pin, policy())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UnitError::DimensionMismatch {
                expected: 8,
                got: 4,
                ..
            }
        ));
    }
}
