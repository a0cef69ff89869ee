//! Image summarisation via the vision-captioning capability.
//!
//! Every image unit — discrete region or whole page — gets a textual summary
//! here before it can be embedded. This stage owns the policy around the
//! external call: bounded retries with exponential backoff, the shared call
//! budget, and the deterministic fallback summary when captioning cannot
//! succeed. The pipeline never blocks indefinitely on a single unit and
//! never drops one: a unit that cannot be captioned is indexed under the
//! fallback text rather than lost.
//!
//! The image payload is never touched; only `summary` is written.

use crate::capability::{CallBudget, VisionCaptioner};
use crate::config::IndexingConfig;
use crate::document::ImageUnit;
use crate::pipeline::retry::{with_backoff, RetryPolicy};
use crate::prompts::{caption_context, DEFAULT_CAPTION_PROMPT};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// The summarizer's result: the unit with `summary` populated, plus whether
/// the fallback was used (degraded output, still indexed).
#[derive(Debug, Clone)]
pub struct SummaryOutcome {
    pub unit: ImageUnit,
    pub fallback: bool,
}

/// Populate `unit.summary`, consuming at most one budget slot.
///
/// Fallback paths, all deterministic:
/// * budget exhausted — no call is made
/// * retries exhausted on transient failures
/// * permanent failure (invalid payload)
/// * the capability returned a caption that cleans down to nothing
pub async fn summarize(
    captioner: &Arc<dyn VisionCaptioner>,
    budget: &CallBudget,
    file_name: &str,
    mut unit: ImageUnit,
    config: &IndexingConfig,
) -> SummaryOutcome {
    let label = unit.id.to_string();

    if !budget.try_acquire() {
        warn!(unit = %label, "caption budget exhausted; using fallback summary");
        unit.summary = Some(config.fallback_summary.clone());
        return SummaryOutcome {
            unit,
            fallback: true,
        };
    }

    let prompt = match config.caption_prompt.as_deref() {
        Some(custom) => custom.to_string(),
        None => format!("{}\n\n{}", DEFAULT_CAPTION_PROMPT, caption_context(file_name)),
    };
    let policy = RetryPolicy {
        max_retries: config.max_retries,
        backoff_ms: config.retry_backoff_ms,
    };

    let result = with_backoff(policy, &label, || {
        captioner.caption(&unit.payload, &unit.mime_type, &prompt)
    })
    .await;

    match result {
        Ok(raw) => {
            let cleaned = clean_caption(&raw);
            if cleaned.is_empty() {
                warn!(unit = %label, "caption cleaned to empty; using fallback summary");
                unit.summary = Some(config.fallback_summary.clone());
                SummaryOutcome {
                    unit,
                    fallback: true,
                }
            } else {
                debug!(unit = %label, chars = cleaned.len(), "caption received");
                unit.summary = Some(cleaned);
                SummaryOutcome {
                    unit,
                    fallback: false,
                }
            }
        }
        Err(err) => {
            warn!(unit = %label, detail = err.detail(), "captioning failed; using fallback summary");
            unit.summary = Some(config.fallback_summary.clone());
            SummaryOutcome {
                unit,
                fallback: true,
            }
        }
    }
}

static FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").expect("fence regex is valid")
});
static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

/// Deterministic cleanup for model-produced captions: unwrap a code fence if
/// the whole answer is fenced, collapse whitespace runs, trim.
pub fn clean_caption(raw: &str) -> String {
    let unfenced = match FENCE.captures(raw) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(raw),
        None => raw,
    };
    WHITESPACE.replace_all(unfenced, " ").trim().to_string()
}
