//! Pipeline stages for dual-modality document indexing.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets us swap
//! implementations without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! pages ──▶ classify ──▶ extract ──▶ summarize ──▶ embed
//!           (simple/     (chunks +   (image units  (text + summary
//!            complex)     images)     only)          vectors)
//! ```
//!
//! 1. [`classify`] — decide per page whether text/images can be extracted
//!    independently or the whole page must be kept as one image
//! 2. [`extract`] — turn a classified page into text and image units
//! 3. [`summarize`] — caption every image unit via the vision capability;
//!    the only stage allowed to fall back instead of fail
//! 4. [`embed`] — vectorise text and summaries; enforces the
//!    summarize-before-embed ordering per image unit
//! 5. [`retry`] — the shared backoff wrapper both external stages go through
//!
//! Stages 1 and 2 are local computation; 3 and 4 suspend on external calls
//! and are the pipeline's only points of network I/O.

pub mod classify;
pub mod embed;
pub mod extract;
pub mod retry;
pub mod summarize;
