pub mod bundle;
pub mod chat;
pub mod compositor;
pub mod date;
pub mod download;
pub mod error;
pub mod ffmpeg;
pub mod hash;
pub mod jpeg;
pub mod manifest;
pub mod markers;
pub mod media;
pub mod metadata;
pub mod report;
pub mod resolver;
pub mod writer;

#[cfg(test)]
mod testutil;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use compositor::Compositor;
pub use download::{Fetcher, HttpFetcher};
pub use error::{Error, Result};
pub use manifest::{Manifest, ManifestEntry};
pub use metadata::MetadataWriter;
pub use report::{CollectingSink, Event, EventSink, TracingSink};
pub use resolver::MemoryResolver;

/// Subdirectory of the output root for manifest memories
pub const MEMORIES_DIR: &str = "processed_memories";
/// Subdirectory of the output root for chat media
pub const CHAT_MEDIA_DIR: &str = "processed_chat_media";

/// External tools and encoder knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub ffmpeg: PathBuf,
    /// x264 constant rate factor for composited videos
    pub crf: u8,
    pub jpeg_quality: u8,
    pub download_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ffmpeg: ffmpeg::default_binary(),
            crf: 18,
            jpeg_quality: 95,
            download_retries: 3,
            retry_delay_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// `memories_history.json`
    #[serde(default)]
    pub manifest: Option<PathBuf>,
    /// Folder of loose chat media files
    #[serde(default)]
    pub chat_media: Option<PathBuf>,
    pub output: PathBuf,
    #[serde(default)]
    pub tools: ToolSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessResult {
    pub memories_total: u64,
    pub memories_written: u64,
    pub chat_pairs: u64,
    pub chat_pairs_written: u64,
    pub standalone_copied: u64,
    #[serde(default)]
    pub items_skipped: u64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Type alias for progress callback; may borrow from the caller
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a;

/// Throttled progress reporter: emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    last_emit: std::sync::Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        let start = Instant::now();
        Self {
            inner,
            last_emit: std::sync::Mutex::new(
                start
                    .checked_sub(std::time::Duration::from_secs(1))
                    .unwrap_or(start),
            ),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            let mut last = self.last_emit.lock().unwrap_or_else(|e| e.into_inner());
            if last.elapsed().as_millis() < 200 {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Run both passes with the real HTTP downloader.
pub fn process(
    options: &ProcessOptions,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<ProcessResult> {
    let fetcher = HttpFetcher::new(&options.tools)?;
    process_with_fetcher(options, &fetcher, progress_callback)
}

/// Run the memories pass (if a manifest is given), then the chat-media pass
/// (if a folder is given). Per-item failures are counted and logged; only
/// an unreadable input or an uncreatable output directory fails the run.
pub fn process_with_fetcher(
    options: &ProcessOptions,
    fetcher: &dyn Fetcher,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<ProcessResult> {
    let tp = ThrottledProgress::new(progress_callback);
    let sink = CollectingSink::new();
    let compositor = Compositor::new(&options.tools);
    let metadata = MetadataWriter::new(&options.tools.ffmpeg);
    let mut result = ProcessResult::default();

    if let Some(manifest_path) = &options.manifest {
        let manifest = Manifest::load(manifest_path)
            .with_context(|| format!("cannot read manifest {}", manifest_path.display()))?;
        let output_dir = options.output.join(MEMORIES_DIR);
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("cannot create {}", output_dir.display()))?;

        let resolver = MemoryResolver::new(fetcher, &compositor, &metadata, &sink);
        let total = manifest.saved_media.len() as u64;
        result.memories_total = total;
        tracing::info!("Resolving {total} memories");

        for (i, entry) in manifest.saved_media.iter().enumerate() {
            tp.report("memories", i as u64, total, &entry.date);
            match resolver.resolve(entry, &output_dir) {
                Ok(_) => result.memories_written += 1,
                Err(error) => sink.emit(Event::ItemSkipped {
                    item: format!("memory {} ({})", i + 1, entry.date),
                    error,
                }),
            }
        }
    }

    if let Some(chat_dir) = &options.chat_media {
        let output_dir = options.output.join(CHAT_MEDIA_DIR);
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("cannot create {}", output_dir.display()))?;

        let summary = chat::process_folder(chat_dir, &compositor, &output_dir, &sink, &tp)
            .with_context(|| format!("cannot process chat media in {}", chat_dir.display()))?;
        result.chat_pairs = summary.pairs;
        result.chat_pairs_written = summary.pairs_written;
        result.standalone_copied = summary.standalone_copied;
    }

    result.items_skipped = sink.skipped();
    result.warnings = sink.into_warnings();
    Ok(result)
}
