//! Page complexity classification.
//!
//! The decision made here fixes how a page is represented for the rest of
//! its life: `Simple` pages are split into independent text and image units;
//! `Complex` pages are kept whole as a single image, because splitting them
//! would lose meaning (slide layouts, infographics, pages where the text is
//! too sparse or garbled to stand alone).
//!
//! The contract is strict: the decision is deterministic given the same page
//! and thresholds, it never looks at other pages, and it is made exactly
//! once. When the layout statistics needed for the decision are missing, the
//! page defaults to `Complex` — content is degraded to one image rather than
//! silently dropped — and the reason is recorded.

use crate::config::ClassifierThresholds;
use crate::document::{Complexity, Page};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Why a page was classified the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationReason {
    /// Layout statistics were missing; complex is the safe default.
    MissingLayout,
    /// The document is a presentation export; slide text has no reading order.
    PresentationExport,
    /// Vertical lines + curves + images met the infographic limit.
    VisualDensity,
    /// Page is wider than `height × landscape_ratio`.
    Landscape,
    /// Embedded images dominate the page area.
    ImageAreaDominant,
    /// No extractable text, but images are present.
    TextAbsent,
    /// Too little text to stand alone next to the page's images.
    SparseText,
    /// Text and images can be extracted independently.
    Extractable,
}

impl fmt::Display for ClassificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClassificationReason::MissingLayout => "missing layout statistics",
            ClassificationReason::PresentationExport => "presentation export",
            ClassificationReason::VisualDensity => "visual element density",
            ClassificationReason::Landscape => "landscape layout",
            ClassificationReason::ImageAreaDominant => "image area dominates page",
            ClassificationReason::TextAbsent => "no extractable text",
            ClassificationReason::SparseText => "text too sparse",
            ClassificationReason::Extractable => "independently extractable",
        };
        f.write_str(s)
    }
}

/// The classifier's verdict for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub complexity: Complexity,
    pub reason: ClassificationReason,
}

impl Classification {
    fn complex(reason: ClassificationReason) -> Self {
        Self {
            complexity: Complexity::Complex,
            reason,
        }
    }

    fn simple(reason: ClassificationReason) -> Self {
        Self {
            complexity: Complexity::Simple,
            reason,
        }
    }
}

/// Classify one page. Pure except for logging; depends only on the page and
/// the thresholds.
pub fn classify(page: &Page, thresholds: &ClassifierThresholds) -> Classification {
    let Some(layout) = page.layout.as_ref() else {
        warn!(
            page = page.page_no,
            "layout statistics missing; defaulting to complex"
        );
        return Classification::complex(ClassificationReason::MissingLayout);
    };

    if layout.presentation_export {
        return Classification::complex(ClassificationReason::PresentationExport);
    }

    // Infographic signal: many free-standing visual elements mean any text is
    // labels and callouts, not prose.
    let visual_elements =
        layout.vertical_lines + layout.curves + page.images.len() as u32;
    if visual_elements >= thresholds.visual_element_limit {
        debug!(
            page = page.page_no,
            visual_elements, "infographic density reached"
        );
        return Classification::complex(ClassificationReason::VisualDensity);
    }

    if layout.width > layout.height * thresholds.landscape_ratio {
        return Classification::complex(ClassificationReason::Landscape);
    }

    if page.image_area_fraction() > thresholds.max_image_area_fraction {
        return Classification::complex(ClassificationReason::ImageAreaDominant);
    }

    if !page.has_text() {
        if page.has_images() {
            return Classification::complex(ClassificationReason::TextAbsent);
        }
        // Nothing on the page at all: simple, and extraction yields nothing.
        return Classification::simple(ClassificationReason::Extractable);
    }

    if page.text_chars() < thresholds.sparse_text_chars && page.has_images() {
        return Classification::complex(ClassificationReason::SparseText);
    }

    Classification::simple(ClassificationReason::Extractable)
}
