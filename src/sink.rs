//! Index persistence seam.
//!
//! The pipeline's obligation ends at emitting complete, internally
//! consistent batches per document; what persistence does with them —
//! transactions, upserts, replication — is the collaborator's concern behind
//! [`IndexSink`]. [`JsonlSink`] is the built-in implementation used by the
//! CLI: one JSON line per entry, written atomically so a crashed run never
//! leaves a half-written index file.

use crate::error::IndexError;
use crate::output::IndexBatch;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Accepts finished index batches for persistence.
#[async_trait]
pub trait IndexSink: Send + Sync {
    async fn persist(&self, batch: &IndexBatch) -> Result<(), IndexError>;
}

/// Writes batches as JSONL files under a directory:
/// `text_index.jsonl` and `image_index.jsonl`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
/// Subsequent batches append, so one sink can collect a whole corpus run.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    dir: PathBuf,
}

impl JsonlSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn text_index_path(&self) -> PathBuf {
        self.dir.join("text_index.jsonl")
    }

    pub fn image_index_path(&self) -> PathBuf {
        self.dir.join("image_index.jsonl")
    }

    async fn append_lines(&self, path: &Path, lines: Vec<String>) -> Result<(), IndexError> {
        if lines.is_empty() {
            return Ok(());
        }

        let io_err = |source: std::io::Error| IndexError::SinkWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        // Read-modify-write through a temp file; rename makes the result
        // visible all at once.
        let existing = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(io_err(e)),
        };

        let mut content = existing;
        for line in lines {
            content.push_str(&line);
            content.push('\n');
        }

        let tmp_path = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp_path, &content).await.map_err(io_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl IndexSink for JsonlSink {
    async fn persist(&self, batch: &IndexBatch) -> Result<(), IndexError> {
        let encode_err = |e: serde_json::Error| IndexError::Internal(format!("encode entry: {e}"));

        let text_lines = batch
            .text_entries
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(encode_err)?;
        let image_lines = batch
            .image_entries
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(encode_err)?;

        self.append_lines(&self.text_index_path(), text_lines)
            .await?;
        self.append_lines(&self.image_index_path(), image_lines)
            .await?;

        info!(
            document_id = %batch.document_id,
            text = batch.text_entries.len(),
            image = batch.image_entries.len(),
            dir = %self.dir.display(),
            "batch persisted"
        );
        Ok(())
    }
}
