//! Unit extraction: turn a classified page into text and image units.
//!
//! Extraction is lazy and deterministic: [`extract`] returns an iterator that
//! produces units on demand, and re-invoking it on the same page with the
//! same policy yields the same sequence — reprocessing a document is
//! idempotent at this stage.
//!
//! For a `Complex` page, the sequence is exactly one whole-page image unit.
//! For a `Simple` page it is, in order: text chunks partitioning the page's
//! spans (no overlapping char ranges), one unchunked unit per table, and one
//! discrete image unit per embedded image above the insignificance floor.
//! An empty simple page yields an empty sequence — not an error.
//!
//! ## Chunk boundaries
//!
//! Chunks are cut at the best boundary at or before the configured char
//! bound: paragraph break first, then sentence end, then any whitespace,
//! then a hard cut. Cutting mid-sentence loses retrieval meaning, so the
//! policy walks down that preference ladder rather than slicing blindly.

use crate::config::ChunkPolicy;
use crate::document::{
    Complexity, ImageUnit, ImageUnitKind, Page, TextProvenance, TextUnit, Unit, UnitId,
};

/// Build the unit sequence for one page.
///
/// The page must already be classified; an unclassified page extracts as
/// simple. Missing rasters on complex pages yield an empty sequence here and
/// are reported by the orchestrator as a failed unit.
pub fn extract<'a>(
    document_id: &'a str,
    page: &'a Page,
    policy: &'a ChunkPolicy,
    min_image_area_fraction: f32,
) -> Units<'a> {
    let state = match page.complexity() {
        Some(Complexity::Complex) => State::WholePage,
        _ => State::Chunking {
            span_idx: 0,
            byte_pos: 0,
            char_pos: 0,
        },
    };
    Units {
        document_id,
        page,
        policy,
        min_image_area_fraction,
        unit_no: 0,
        state,
    }
}

/// Lazy iterator over a page's units. See [`extract`].
pub struct Units<'a> {
    document_id: &'a str,
    page: &'a Page,
    policy: &'a ChunkPolicy,
    min_image_area_fraction: f32,
    unit_no: u32,
    state: State,
}

enum State {
    WholePage,
    Chunking {
        span_idx: usize,
        byte_pos: usize,
        char_pos: usize,
    },
    Tables {
        table_idx: usize,
    },
    Images {
        image_idx: usize,
    },
    Done,
}

impl<'a> Units<'a> {
    fn next_id(&mut self) -> UnitId {
        let id = UnitId::new(self.document_id, self.page.page_no, self.unit_no);
        self.unit_no += 1;
        id
    }
}

impl<'a> Iterator for Units<'a> {
    type Item = Unit;

    fn next(&mut self) -> Option<Unit> {
        loop {
            match self.state {
                State::WholePage => {
                    self.state = State::Done;
                    let raster = self.page.raster.as_ref()?;
                    let id = self.next_id();
                    return Some(Unit::Image(ImageUnit {
                        id,
                        kind: ImageUnitKind::WholePage,
                        payload: raster.payload.clone(),
                        mime_type: raster.mime_type.clone(),
                        summary: None,
                    }));
                }

                State::Chunking {
                    span_idx,
                    byte_pos,
                    char_pos,
                } => {
                    let Some(span) = self.page.spans.get(span_idx) else {
                        self.state = State::Tables { table_idx: 0 };
                        continue;
                    };

                    // Skip whitespace between chunks; it is not content.
                    let rest = &span.text[byte_pos..];
                    let skipped = rest.len() - rest.trim_start().len();
                    let skipped_chars = rest[..skipped].chars().count();
                    let rest = &rest[skipped..];
                    let byte_pos = byte_pos + skipped;
                    let char_pos = char_pos + skipped_chars;

                    if rest.is_empty() {
                        self.state = State::Chunking {
                            span_idx: span_idx + 1,
                            byte_pos: 0,
                            char_pos: 0,
                        };
                        continue;
                    }

                    let cut = split_point(rest, self.policy.max_chunk_chars);
                    let chunk = rest[..cut].trim_end();
                    let chunk_chars = chunk.chars().count();

                    self.state = State::Chunking {
                        span_idx,
                        byte_pos: byte_pos + cut,
                        char_pos: char_pos + rest[..cut].chars().count(),
                    };

                    if chunk.is_empty() {
                        continue;
                    }

                    let start = span.offset + char_pos;
                    let id = self.next_id();
                    return Some(Unit::Text(TextUnit {
                        id,
                        text: chunk.to_string(),
                        provenance: TextProvenance::CharRange {
                            start,
                            end: start + chunk_chars,
                        },
                    }));
                }

                State::Tables { table_idx } => {
                    let Some(table) = self.page.tables.get(table_idx) else {
                        self.state = State::Images { image_idx: 0 };
                        continue;
                    };
                    self.state = State::Tables {
                        table_idx: table_idx + 1,
                    };
                    if table.trim().is_empty() {
                        continue;
                    }
                    let id = self.next_id();
                    return Some(Unit::Text(TextUnit {
                        id,
                        text: table.clone(),
                        provenance: TextProvenance::Table { table_no: table_idx },
                    }));
                }

                State::Images { image_idx } => {
                    let Some(image) = self.page.images.get(image_idx) else {
                        self.state = State::Done;
                        continue;
                    };
                    self.state = State::Images {
                        image_idx: image_idx + 1,
                    };
                    // Spacer pixels and rules carry no indexable content.
                    if image.area_fraction < self.min_image_area_fraction {
                        continue;
                    }
                    let id = self.next_id();
                    return Some(Unit::Image(ImageUnit {
                        id,
                        kind: ImageUnitKind::Discrete,
                        payload: image.payload.clone(),
                        mime_type: image.mime_type.clone(),
                        summary: None,
                    }));
                }

                State::Done => return None,
            }
        }
    }
}

/// Byte index at which to cut `text` so the chunk stays within `max_chars`.
///
/// Preference ladder: paragraph break, sentence end, whitespace, hard cut.
/// The returned index is always a char boundary.
fn split_point(text: &str, max_chars: usize) -> usize {
    let max_chars = max_chars.max(1);
    // Byte index just past the max_chars-th char, or the whole text.
    let limit = match text.char_indices().nth(max_chars) {
        Some((idx, _)) => idx,
        None => return text.len(),
    };
    let window = &text[..limit];

    if let Some(idx) = window.rfind("\n\n") {
        if idx > 0 {
            return idx + 2;
        }
    }

    if let Some(idx) = last_sentence_boundary(window) {
        return idx;
    }

    if let Some(idx) = window.rfind(char::is_whitespace) {
        if idx > 0 {
            return idx;
        }
    }

    limit
}

/// Byte index just after the last `.`/`!`/`?` that is followed by whitespace.
fn last_sentence_boundary(window: &str) -> Option<usize> {
    let mut boundary = None;
    let mut prev: Option<(usize, char)> = None;
    for (idx, ch) in window.char_indices() {
        if let Some((_, p)) = prev {
            if matches!(p, '.' | '!' | '?') && ch.is_whitespace() {
                boundary = Some(idx);
            }
        }
        prev = Some((idx, ch));
    }
    boundary.filter(|&idx| idx > 0)
}
