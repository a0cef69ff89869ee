//! A [`PageNormalizer`] over pre-normalised page-stream JSON.
//!
//! Document-format conversion is an external collaborator; production
//! deployments inject their own normalizer behind the trait. This one accepts
//! the converter's interchange format — a JSON document listing pages with
//! text spans, base64 image payloads, tables, a full-page raster, and layout
//! statistics — and is what the CLI and the integration tests feed the
//! pipeline with.

use super::{NormalizeError, PageNormalizer};
use crate::document::{EmbeddedImage, LayoutStats, Page, PageRaster, TextSpan};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

/// MIME type of the page-stream interchange format.
pub const PAGE_STREAM_MIME: &str = "application/vnd.doc2index.pages+json";

/// Parses page-stream JSON into [`Page`]s.
#[derive(Debug, Clone, Default)]
pub struct JsonPageSource;

impl JsonPageSource {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct WireDocument {
    pages: Vec<WirePage>,
}

#[derive(Deserialize)]
struct WirePage {
    #[serde(default)]
    spans: Vec<WireSpan>,
    #[serde(default)]
    images: Vec<WireImage>,
    #[serde(default)]
    tables: Vec<String>,
    raster: Option<WireRaster>,
    layout: Option<WireLayout>,
}

#[derive(Deserialize)]
struct WireSpan {
    text: String,
    #[serde(default)]
    offset: usize,
}

#[derive(Deserialize)]
struct WireImage {
    /// Base64-encoded image bytes.
    payload: String,
    mime_type: String,
    #[serde(default)]
    area_fraction: f32,
}

#[derive(Deserialize)]
struct WireRaster {
    payload: String,
    mime_type: String,
}

#[derive(Deserialize)]
struct WireLayout {
    width: f32,
    height: f32,
    #[serde(default)]
    curves: u32,
    #[serde(default)]
    horizontal_lines: u32,
    #[serde(default)]
    vertical_lines: u32,
    #[serde(default)]
    rects: u32,
    #[serde(default)]
    presentation_export: bool,
}

fn decode_payload(b64: &str, what: &str, page_no: u32) -> Result<Vec<u8>, NormalizeError> {
    STANDARD
        .decode(b64)
        .map_err(|e| NormalizeError::CorruptDocument {
            detail: format!("page {page_no}: invalid base64 in {what}: {e}"),
        })
}

#[async_trait]
impl PageNormalizer for JsonPageSource {
    async fn normalize(&self, bytes: &[u8], mime_type: &str) -> Result<Vec<Page>, NormalizeError> {
        if mime_type != PAGE_STREAM_MIME && mime_type != "application/json" {
            return Err(NormalizeError::FormatUnsupported {
                mime_type: mime_type.to_string(),
            });
        }

        let wire: WireDocument =
            serde_json::from_slice(bytes).map_err(|e| NormalizeError::CorruptDocument {
                detail: format!("invalid page-stream JSON: {e}"),
            })?;

        let mut pages = Vec::with_capacity(wire.pages.len());
        for (page_no, wire_page) in wire.pages.into_iter().enumerate() {
            let page_no = page_no as u32;
            let mut page = Page::new(page_no);

            page.spans = wire_page
                .spans
                .into_iter()
                .map(|s| TextSpan {
                    text: s.text,
                    offset: s.offset,
                })
                .collect();

            for image in wire_page.images {
                page.images.push(EmbeddedImage {
                    payload: decode_payload(&image.payload, "image", page_no)?,
                    mime_type: image.mime_type,
                    area_fraction: image.area_fraction,
                });
            }

            page.tables = wire_page.tables;

            if let Some(raster) = wire_page.raster {
                page.raster = Some(PageRaster {
                    payload: decode_payload(&raster.payload, "raster", page_no)?,
                    mime_type: raster.mime_type,
                });
            }

            if let Some(layout) = wire_page.layout {
                page.layout = Some(LayoutStats {
                    width: layout.width,
                    height: layout.height,
                    curves: layout.curves,
                    horizontal_lines: layout.horizontal_lines,
                    vertical_lines: layout.vertical_lines,
                    rects: layout.rects,
                    presentation_export: layout.presentation_export,
                });
            }

            pages.push(page);
        }

        Ok(pages)
    }
}
