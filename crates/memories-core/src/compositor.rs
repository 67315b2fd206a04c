//! Burns a caption overlay into a photo (in process, via `image`) or a
//! video (ffmpeg filter graph).

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageReader};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::ffmpeg;
use crate::jpeg;
use crate::media::{self, MediaKind};
use crate::report::{Event, EventSink};
use crate::writer;
use crate::ToolSettings;

/// Split the base video so the overlay can be scaled to its size, then lay
/// the overlay over the untouched branch at 0:0.
pub const OVERLAY_FILTER: &str =
    "[0]split[base][ref];[1][ref]scale=w=rw:h=rh[ov];[base][ov]overlay=0:0";

/// Overlay formats the filter graph handles badly; re-encoded to PNG first
const UNRELIABLE_OVERLAY_EXTENSIONS: &[&str] = &["webp"];

#[derive(Debug, Clone)]
pub struct Compositor {
    ffmpeg: PathBuf,
    crf: u8,
    jpeg_quality: u8,
}

impl Compositor {
    pub fn new(settings: &ToolSettings) -> Self {
        Self {
            ffmpeg: settings.ffmpeg.clone(),
            crf: settings.crf,
            jpeg_quality: settings.jpeg_quality,
        }
    }

    /// Composite `overlay` onto `base` and write the result to `output`.
    pub fn composite(
        &self,
        base: &Path,
        overlay: &Path,
        output: &Path,
        kind: MediaKind,
        sink: &dyn EventSink,
    ) -> Result<()> {
        match kind {
            MediaKind::Image => self.composite_image(base, overlay, output, sink),
            MediaKind::Video => self.composite_video(base, overlay, output),
            other => Err(Error::composition(
                base,
                format!("cannot composite onto {other:?} media"),
            )),
        }
    }

    fn composite_image(
        &self,
        base: &Path,
        overlay: &Path,
        output: &Path,
        sink: &dyn EventSink,
    ) -> Result<()> {
        let base_bytes = fs::read(base)?;
        let mut canvas = decode(base, &base_bytes)?.to_rgba8();
        let mut layer = open(overlay)?.to_rgba8();

        if layer.dimensions() != canvas.dimensions() {
            sink.emit(Event::DimensionMismatch {
                base: base.to_path_buf(),
                base_size: canvas.dimensions(),
                overlay_size: layer.dimensions(),
            });
            let (w, h) = canvas.dimensions();
            layer = imageops::resize(&layer, w, h, FilterType::Nearest);
        }

        imageops::overlay(&mut canvas, &layer, 0, 0);
        let flattened = DynamicImage::ImageRgba8(canvas).to_rgb8();

        if media::is_jpeg(output) {
            let mut encoded = Vec::new();
            JpegEncoder::new_with_quality(&mut encoded, self.jpeg_quality)
                .encode_image(&flattened)
                .map_err(|e| Error::composition(output, e))?;

            // Carry the base photo's Exif block over unchanged
            match jpeg::exif_block(&base_bytes) {
                Ok(Some(tiff)) => {
                    encoded = jpeg::with_exif_block(&encoded, tiff)
                        .map_err(|e| Error::composition(output, e))?;
                }
                Ok(None) => {}
                Err(e) if media::is_jpeg(base) => {
                    warn!("Exif of {} unreadable, not carried over: {e}", base.display());
                }
                Err(_) => {}
            }
            fs::write(output, encoded)?;
        } else {
            flattened
                .save(output)
                .map_err(|e| Error::composition(output, e))?;
        }

        info!("Overlaid caption onto {}", output.display());
        Ok(())
    }

    fn composite_video(&self, base: &Path, overlay: &Path, output: &Path) -> Result<()> {
        // Next to the output, removed when this call returns either way
        let mut converted = None;
        let overlay = if needs_png(overlay) {
            let tmp = tempfile::Builder::new()
                .prefix(".overlay-")
                .suffix(".png")
                .tempfile_in(writer::parent_dir(output))?;
            open(overlay)?
                .save_with_format(tmp.path(), ImageFormat::Png)
                .map_err(|e| Error::composition(overlay, e))?;
            converted.insert(tmp).path().to_path_buf()
        } else {
            overlay.to_path_buf()
        };

        if let Err(reason) = ffmpeg::run(&self.ffmpeg, &self.video_args(base, &overlay, output)) {
            let _ = fs::remove_file(output);
            return Err(Error::composition(base, reason));
        }

        info!("Overlaid caption onto {}", output.display());
        Ok(())
    }

    /// ffmpeg arguments for the video overlay: fixed quality, audio copied
    pub fn video_args(&self, base: &Path, overlay: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-i".into(),
            base.into(),
            "-i".into(),
            overlay.into(),
            "-filter_complex".into(),
            OVERLAY_FILTER.into(),
            "-crf".into(),
            self.crf.to_string().into(),
            "-c:a".into(),
            "copy".into(),
            output.into(),
        ]
    }
}

fn needs_png(overlay: &Path) -> bool {
    UNRELIABLE_OVERLAY_EXTENSIONS.contains(&media::extension(overlay).as_str())
}

fn decode(path: &Path, bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| Error::composition(path, e))
}

fn open(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| Error::composition(path, e))
}
