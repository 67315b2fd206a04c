use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use memories_core::{ProcessOptions, ToolSettings};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "memories-rs",
    version,
    about = "Rebuild memories and chat media from a data export: captions burned in, GPS and dates restored"
)]
#[command(group(ArgGroup::new("input").required(true).multiple(true).args(["manifest", "chat_media"])))]
struct Cli {
    /// memories_history.json from the export
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Folder of chat media files (_media / _overlay / _thumbnail ...)
    #[arg(long)]
    chat_media: Option<PathBuf>,

    /// Output root; processed_memories/ and processed_chat_media/ go here
    #[arg(short, long)]
    output: PathBuf,

    /// ffmpeg binary (default: found on PATH)
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Constant rate factor for composited videos
    #[arg(long, default_value_t = 18)]
    crf: u8,

    /// JPEG quality for composited photos
    #[arg(long, default_value_t = 95)]
    jpeg_quality: u8,

    /// Download attempts per memory
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Seconds between download attempts
    #[arg(long, default_value_t = 2)]
    retry_delay: u64,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,

    /// Print the summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let t_total = std::time::Instant::now();

    let defaults = ToolSettings::default();
    let options = ProcessOptions {
        manifest: cli.manifest,
        chat_media: cli.chat_media,
        output: cli.output,
        tools: ToolSettings {
            ffmpeg: cli.ffmpeg.unwrap_or(defaults.ffmpeg),
            crf: cli.crf,
            jpeg_quality: cli.jpeg_quality,
            download_retries: cli.retries,
            retry_delay_secs: cli.retry_delay,
        },
    };

    let pb = ProgressBar::new(0);
    pb.set_style(ProgressStyle::default_bar().template("{prefix:>8} [{bar:40}] {pos}/{len} {msg}")?);

    let result = memories_core::process(&options, &|stage, current, total, message| {
        pb.set_prefix(stage.to_string());
        pb.set_length(total);
        pb.set_position(current + 1);
        pb.set_message(message.to_string());
    })?;
    pb.finish_and_clear();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    eprintln!(
        "Done! {}/{} memories written, {}/{} chat pairs composited, {} standalone files copied, {} skipped ({:.2}s)",
        result.memories_written,
        result.memories_total,
        result.chat_pairs_written,
        result.chat_pairs,
        result.standalone_copied,
        result.items_skipped,
        t_total.elapsed().as_secs_f64()
    );

    Ok(())
}
