//! Caption prompts for the vision-captioning capability.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing how images are described for
//!    retrieval requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect prompts directly without
//!    calling a real vision model.
//!
//! Callers can override the default via
//! [`crate::config::IndexingConfig::caption_prompt`]; the constants here are
//! used only when no override is provided.

/// Default prompt for captioning an image so the caption embeds well.
///
/// The summary is the only thing the image contributes to the index — the
/// embedding is computed from this text, never from pixels — so the prompt
/// pushes the model towards retrieval-relevant content: what the image shows,
/// any visible text, and the kind of artefact it is.
pub const DEFAULT_CAPTION_PROMPT: &str = "\
You are indexing a document for search. Describe this image in 2-4 plain \
sentences so that someone searching the document could find it. State what \
kind of image it is (chart, diagram, photo, logo, screenshot, table), what \
it shows, and transcribe any text that is visible in it. Output only the \
description, with no markdown and no preamble.";

/// Context sentence appended when the source file name is known.
pub fn caption_context(file_name: &str) -> String {
    format!(
        "For context, the image is taken from a document named \"{}\".",
        file_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_mentions_file_name() {
        let ctx = caption_context("annual_report.pdf");
        assert!(ctx.contains("annual_report.pdf"));
    }

    #[test]
    fn default_prompt_forbids_markdown() {
        assert!(DEFAULT_CAPTION_PROMPT.contains("no markdown"));
    }
}
