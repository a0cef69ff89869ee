//! Core data model: documents, pages, and the units extracted from them.
//!
//! A [`Document`] is an ordered sequence of [`Page`]s produced by the external
//! page normalizer. Each page carries the raw material the pipeline works on —
//! text spans, embedded raster images, a full-page rasterisation, and the
//! layout statistics the complexity classifier reads — plus a `complexity`
//! slot that is set exactly once and never revised.
//!
//! Units are the smallest indexed items: a [`TextUnit`] (one text chunk or one
//! table) or an [`ImageUnit`] (one discrete image region, or the whole page
//! rasterised when the page was classified complex).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// One input document, normalised into pages.
///
/// Immutable once built, except for the per-page complexity slots which the
/// orchestrator fills exactly once during classification.
#[derive(Debug, Clone)]
pub struct Document {
    /// Stable identifier. Usually the SHA-256 hex digest of the source bytes
    /// (see [`Document::id_from_bytes`]); corrections to an already-indexed
    /// document require a new document with a new id.
    pub document_id: String,
    /// Original file name, carried into index entries as source metadata.
    pub file_name: String,
    /// MIME type of the source file.
    pub mime_type: String,
    /// Pages in document order.
    pub pages: Vec<Page>,
}

impl Document {
    /// Derive a content-addressed document id from the source bytes.
    pub fn id_from_bytes(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// A contiguous run of text on a page, with its char offset into the page's
/// logical text. Spans are the normalizer's block boundaries (paragraphs,
/// columns read in order) and never overlap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    /// Char offset of this span's first character within the page text.
    pub offset: usize,
}

/// A raster image embedded on a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedImage {
    pub payload: Vec<u8>,
    pub mime_type: String,
    /// Fraction of the page area this image's bounding box covers, in `0..=1`.
    pub area_fraction: f32,
}

/// Full-page rasterisation, always provided by the normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRaster {
    pub payload: Vec<u8>,
    pub mime_type: String,
}

/// Layout statistics the normalizer observed for a page.
///
/// These are the complexity classifier's only inputs besides the text and
/// image inventories; a page without them is classified complex by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutStats {
    pub width: f32,
    pub height: f32,
    pub curves: u32,
    pub horizontal_lines: u32,
    pub vertical_lines: u32,
    pub rects: u32,
    /// True when the source document was exported from presentation software.
    /// Slide exports draw text as positioned fragments; extraction loses the
    /// reading order, so such pages are always treated as images.
    pub presentation_export: bool,
}

/// How a page will be represented in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// Text and images can be extracted and embedded independently.
    Simple,
    /// Layout or graphics density makes independent extraction unreliable;
    /// the whole page is represented as a single image.
    Complex,
}

/// One normalised page.
#[derive(Debug, Clone)]
pub struct Page {
    /// 0-based page number within the document.
    pub page_no: u32,
    /// Text spans in reading order.
    pub spans: Vec<TextSpan>,
    /// Embedded raster images in page order.
    pub images: Vec<EmbeddedImage>,
    /// Tables recovered by the normalizer, already rendered to Markdown.
    /// Each becomes one unchunked text unit.
    pub tables: Vec<String>,
    /// Full-page rasterisation.
    pub raster: Option<PageRaster>,
    /// Layout statistics for classification. `None` forces the complex
    /// fallback.
    pub layout: Option<LayoutStats>,
    complexity: Option<Complexity>,
}

impl Page {
    pub fn new(page_no: u32) -> Self {
        Self {
            page_no,
            spans: Vec::new(),
            images: Vec::new(),
            tables: Vec::new(),
            raster: None,
            layout: None,
            complexity: None,
        }
    }

    /// The page's classification, if it has been made.
    pub fn complexity(&self) -> Option<Complexity> {
        self.complexity
    }

    /// Record the classification. The first call wins; the decision is made
    /// exactly once and is fixed for all downstream stages.
    pub fn classify_once(&mut self, complexity: Complexity) -> Complexity {
        *self.complexity.get_or_insert(complexity)
    }

    /// Total chars of extractable text (spans only; tables are counted as
    /// structure, not prose, for classification purposes).
    pub fn text_chars(&self) -> usize {
        self.spans.iter().map(|s| s.text.chars().count()).sum()
    }

    pub fn has_text(&self) -> bool {
        self.spans.iter().any(|s| !s.text.trim().is_empty())
    }

    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }

    /// Summed bounding-box area fraction of all embedded images.
    pub fn image_area_fraction(&self) -> f32 {
        self.images.iter().map(|i| i.area_fraction).sum()
    }
}

/// Shared addressing scheme for every unit: `(document_id, page_no, unit_no)`.
///
/// `unit_no` is unique within its page across both modalities, so the text
/// and image indexes stay aligned to the same identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId {
    pub document_id: String,
    pub page_no: u32,
    pub unit_no: u32,
}

impl UnitId {
    pub fn new(document_id: impl Into<String>, page_no: u32, unit_no: u32) -> Self {
        Self {
            document_id: document_id.into(),
            page_no,
            unit_no,
        }
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.document_id, self.page_no, self.unit_no)
    }
}

/// Where a text unit's content came from on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextProvenance {
    /// Char range `start..end` into the page's logical text.
    CharRange { start: usize, end: usize },
    /// The nth table on the page, indexed whole.
    Table { table_no: usize },
}

/// A chunk of text belonging to a page. Never carries an image payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextUnit {
    pub id: UnitId,
    pub text: String,
    pub provenance: TextProvenance,
}

/// Whether an image unit is a discrete region or a whole-page fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageUnitKind {
    /// An embedded image region from a simple page.
    Discrete,
    /// The full-page rasterisation of a complex page.
    WholePage,
}

/// An image to be indexed via a textual summary.
///
/// `summary` is `None` until the summarizer runs; the embedder refuses to
/// process a unit whose summary is still unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUnit {
    pub id: UnitId,
    pub kind: ImageUnitKind,
    pub payload: Vec<u8>,
    pub mime_type: String,
    pub summary: Option<String>,
}

/// The smallest indexed item.
#[derive(Debug, Clone)]
pub enum Unit {
    Text(TextUnit),
    Image(ImageUnit),
}

impl Unit {
    pub fn id(&self) -> &UnitId {
        match self {
            Unit::Text(t) => &t.id,
            Unit::Image(i) => &i.id,
        }
    }
}
