//! CLI binary for doc2index.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `IndexingConfig`, wires up the OpenAI-compatible capability clients from
//! environment variables, and writes JSONL index files.

use anyhow::{Context, Result};
use clap::Parser;
use doc2index::capability::openai::{OpenAiCaptioner, OpenAiEmbedder};
use doc2index::{
    ingest_to_sink, Capabilities, DocumentStatus, IndexingConfig, IngestProgressCallback,
    JsonPageSource, JsonlSink, ProgressCallback, PAGE_STREAM_MIME,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus per-unit log lines. Works
/// correctly when units complete out of order (concurrent mode).
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_ingest_start

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Normalising document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} units  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Indexing");
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_ingest_start(&self, total_units: usize) {
        self.activate_bar(total_units);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Indexing {total_units} units…"))
        ));
    }

    fn on_unit_start(&self, unit: String, _total: usize) {
        self.bar.set_message(unit);
    }

    fn on_unit_complete(&self, unit: String, _total: usize) {
        self.bar.println(format!("  {} {}", green("✓"), dim(&unit)));
        self.bar.inc(1);
    }

    fn on_unit_error(&self, unit: String, _total: usize, error: String) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.len() > 80 {
            format!("{}\u{2026}", &error[..79])
        } else {
            error
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), unit, red(&msg)));
        self.bar.inc(1);
    }

    fn on_ingest_complete(&self, total_units: usize, indexed: usize) {
        let failed = total_units.saturating_sub(indexed);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} units indexed successfully",
                green("✔"),
                bold(&indexed.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} units indexed  ({} failed)",
                if indexed == 0 { red("✘") } else { cyan("⚠") },
                bold(&indexed.to_string()),
                total_units,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Index a normalised page stream into ./index/
  doc2index report.pages.json -o index/

  # Limit vision captions and concurrency
  doc2index report.pages.json -o index/ --caption-budget 50 -c 4

  # Emit the full outcome (entries + stats) as JSON on stdout
  doc2index report.pages.json --json

  # Point at a self-hosted OpenAI-compatible gateway
  DOC2INDEX_API_BASE=http://localhost:8000/v1 doc2index report.pages.json -o index/

INPUT FORMAT:
  The input is a page-stream JSON file produced by your document converter:
  one page per entry, with text spans, base64 image payloads, optional
  Markdown tables, a full-page raster, and layout statistics. Conversion
  from PDF/DOCX to this format is a separate tool's job.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY           API key for caption and embedding calls
  DOC2INDEX_API_BASE       Base URL (default: https://api.openai.com/v1)
  DOC2INDEX_CAPTION_MODEL  Vision model (default: gpt-4o-mini)
  DOC2INDEX_EMBED_MODEL    Embedding model (default: text-embedding-3-small)
"#;

/// Build dual text/image vector indexes from a normalised document.
#[derive(Parser, Debug)]
#[command(
    name = "doc2index",
    version,
    about = "Build dual text/image vector indexes from a normalised document",
    long_about = "Index a document into two aligned collections: text-chunk embeddings and \
image-summary embeddings. Complex pages are kept whole as a single image; every image is \
captioned by a vision model and embedded via its caption.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Page-stream JSON file (see INPUT FORMAT in --help).
    input: PathBuf,

    /// Directory for text_index.jsonl / image_index.jsonl.
    #[arg(short, long, env = "DOC2INDEX_OUTPUT")]
    output: Option<PathBuf>,

    /// Source file name recorded in entry metadata (defaults to the input name).
    #[arg(long)]
    source_name: Option<String>,

    /// Number of concurrent external calls.
    #[arg(short, long, env = "DOC2INDEX_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Retries per unit on transient call failure.
    #[arg(long, env = "DOC2INDEX_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Maximum vision-caption calls for this document.
    #[arg(long, env = "DOC2INDEX_CAPTION_BUDGET")]
    caption_budget: Option<u64>,

    /// Upper bound on chars per text chunk.
    #[arg(long, env = "DOC2INDEX_CHUNK_CHARS", default_value_t = 1600)]
    chunk_chars: usize,

    /// API key for the caption/embedding endpoints.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Base URL of the OpenAI-compatible API.
    #[arg(
        long,
        env = "DOC2INDEX_API_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    api_base: String,

    /// Vision model for image captions.
    #[arg(long, env = "DOC2INDEX_CAPTION_MODEL", default_value = "gpt-4o-mini")]
    caption_model: String,

    /// Embedding model.
    #[arg(
        long,
        env = "DOC2INDEX_EMBED_MODEL",
        default_value = "text-embedding-3-small"
    )]
    embed_model: String,

    /// Per-call timeout in seconds.
    #[arg(long, env = "DOC2INDEX_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Output the full IngestOutput as JSON on stdout.
    #[arg(long, env = "DOC2INDEX_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOC2INDEX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2INDEX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2INDEX_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active; the
    // bar provides the feedback that matters.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Wire up capabilities ─────────────────────────────────────────────
    let timeout = Duration::from_secs(cli.api_timeout);
    let caps = Capabilities {
        normalizer: Arc::new(JsonPageSource::new()),
        captioner: Arc::new(
            OpenAiCaptioner::new(&cli.api_key, &cli.api_base, &cli.caption_model, timeout)
                .context("Failed to build caption client")?,
        ),
        embedder: Arc::new(
            OpenAiEmbedder::new(&cli.api_key, &cli.api_base, &cli.embed_model, None, timeout)
                .context("Failed to build embedding client")?,
        ),
    };

    // ── Build config ─────────────────────────────────────────────────────
    let mut builder = IndexingConfig::builder()
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .max_chunk_chars(cli.chunk_chars);
    if let Some(budget) = cli.caption_budget {
        builder = builder.caption_budget(budget);
    }
    if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        builder = builder.progress(cb as ProgressCallback);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let bytes = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let source_name = cli.source_name.clone().unwrap_or_else(|| {
        cli.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| cli.input.display().to_string())
    });

    let out_dir = cli.output.clone().unwrap_or_else(|| PathBuf::from("."));
    let sink = JsonlSink::new(&out_dir);

    let output = ingest_to_sink(
        &bytes,
        PAGE_STREAM_MIME,
        &source_name,
        &config,
        &caps,
        &sink,
    )
    .await
    .context("Ingestion failed")?;

    if cli.json {
        let json =
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        eprintln!(
            "{}  {} text + {} image entries  {}ms  →  {}",
            match output.status {
                DocumentStatus::Completed => green("✔"),
                DocumentStatus::PartiallyCompleted => cyan("⚠"),
                DocumentStatus::Failed => red("✘"),
            },
            output.batch.text_entries.len(),
            output.batch.image_entries.len(),
            output.stats.total_duration_ms,
            bold(&out_dir.display().to_string()),
        );
        if !output.batch.failed.is_empty() {
            eprintln!(
                "   {} failed units:",
                red(&output.batch.failed.len().to_string())
            );
            for failed in &output.batch.failed {
                eprintln!("     {} {}", red("✗"), failed.error);
            }
        }
        if output.stats.caption_fallbacks > 0 {
            eprintln!(
                "   {} image units carry the fallback summary",
                dim(&output.stats.caption_fallbacks.to_string())
            );
        }
    }

    if output.status == DocumentStatus::PartiallyCompleted {
        std::process::exit(2);
    }
    Ok(())
}
