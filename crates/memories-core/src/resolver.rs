use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::bundle;
use crate::compositor::Compositor;
use crate::date::parse_capture_date;
use crate::download::Fetcher;
use crate::error::Result;
use crate::manifest::ManifestEntry;
use crate::media::MediaKind;
use crate::metadata::{self, MetadataWriter};
use crate::report::{Event, EventSink};
use crate::writer;

/// Turns one manifest entry into one finished file in the output directory.
pub struct MemoryResolver<'a> {
    fetcher: &'a dyn Fetcher,
    compositor: &'a Compositor,
    metadata: &'a MetadataWriter,
    sink: &'a dyn EventSink,
}

impl<'a> MemoryResolver<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        compositor: &'a Compositor,
        metadata: &'a MetadataWriter,
        sink: &'a dyn EventSink,
    ) -> Self {
        Self {
            fetcher,
            compositor,
            metadata,
            sink,
        }
    }

    /// Download, composite if bundled, tag, and place into `output_dir`.
    ///
    /// Location and date are validated before anything is fetched. All
    /// intermediate files live in a per-call temp dir that is removed on
    /// every return path.
    pub fn resolve(&self, entry: &ManifestEntry, output_dir: &Path) -> Result<PathBuf> {
        let (lat, lon) = entry.coordinates()?;
        let captured = parse_capture_date(&entry.date)?;

        let work = tempfile::Builder::new().prefix("memory-").tempdir()?;
        let raw = self.fetcher.fetch(&entry.url, work.path())?;
        debug!("Fetched {} -> {}", entry.url, raw.display());

        let (target, kind) = match MediaKind::from_path(&raw) {
            MediaKind::Archive => {
                let bundle = bundle::unpack(&raw, &work.path().join("bundle"))?;
                let output = work.path().join(bundle.output_name());
                self.compositor.composite(
                    &bundle.base,
                    &bundle.overlay,
                    &output,
                    bundle.kind,
                    self.sink,
                )?;
                (output, bundle.kind)
            }
            kind => (raw, kind),
        };

        let written = self.metadata.write_gps(&target, kind, lat, lon)?;
        if !written && kind == MediaKind::Image {
            self.sink.emit(Event::GpsSkipped {
                path: target.clone(),
            });
        }
        metadata::set_capture_time(&target, captured)?;

        let dest = writer::place_output(&target, output_dir)?;
        info!("Resolved memory {}", dest.display());
        Ok(dest)
    }
}
