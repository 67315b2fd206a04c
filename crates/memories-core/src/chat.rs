//! Chat media: overlays sit next to their base media with nothing but a
//! shared modification time linking them.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use filetime::FileTime;
use tracing::info;

use crate::compositor::Compositor;
use crate::error::{Error, Result};
use crate::hash;
use crate::markers::{self, FileRole, MEDIA_MARKER};
use crate::media::MediaKind;
use crate::report::{Event, EventSink};
use crate::writer;
use crate::ThrottledProgress;

/// Base media and the overlay that goes on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPair {
    pub media: PathBuf,
    pub overlay: PathBuf,
    /// Shared modification time, whole seconds
    pub timestamp: i64,
}

impl MatchedPair {
    pub fn bucket_label(&self) -> String {
        bucket_label(self.timestamp)
    }
}

/// Something in the folder that could not be paired
#[derive(Debug)]
pub struct MatchIssue {
    /// Bucket label, or the file path when the file never reached a bucket
    pub item: String,
    pub error: Error,
}

/// Pairs found in a folder plus everything that could not be paired
#[derive(Debug, Default)]
pub struct MatchReport {
    pub pairs: Vec<MatchedPair>,
    /// `AmbiguousPair` and `OrphanOverlay` per bucket, `Io` per unreadable file
    pub issues: Vec<MatchIssue>,
}

impl MatchReport {
    fn issue(&mut self, item: String, error: Error) {
        self.issues.push(MatchIssue { item, error });
    }
}

/// Counts from one chat-media pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChatSummary {
    pub pairs: u64,
    pub pairs_written: u64,
    pub standalone_copied: u64,
}

#[derive(Default)]
struct Bucket {
    media: Vec<PathBuf>,
    overlays: Vec<PathBuf>,
}

fn bucket_label(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => timestamp.to_string(),
    }
}

/// Modification time floored to whole seconds
fn mtime_seconds(path: &Path) -> io::Result<i64> {
    Ok(FileTime::from_last_modification_time(&fs::metadata(path)?).unix_seconds())
}

fn role_of(path: &Path) -> FileRole {
    path.file_name()
        .map(|n| FileRole::classify(&n.to_string_lossy()))
        .unwrap_or(FileRole::Unrelated)
}

/// Files and symlinks directly inside `dir`, sorted by path
fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_file() || file_type.is_symlink() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Group media and overlay files by modification second and pair them.
///
/// Per bucket: 1 media + 1 overlay pair directly; several of each pair only
/// when every overlay has the same content (each media then gets the first
/// overlay); no overlay means nothing to do. Differing overlays are reported
/// as ambiguous and every other shape as orphaned overlays. A file whose
/// mtime or content cannot be read is reported and left out; only an
/// unreadable folder fails the call.
pub fn match_pairs(dir: &Path) -> Result<MatchReport> {
    let mut report = MatchReport::default();
    let mut buckets: BTreeMap<i64, Bucket> = BTreeMap::new();
    for path in list_files(dir)? {
        let role = role_of(&path);
        if !matches!(role, FileRole::Media | FileRole::Overlay) {
            continue;
        }
        let timestamp = match mtime_seconds(&path) {
            Ok(t) => t,
            Err(e) => {
                report.issue(path.display().to_string(), e.into());
                continue;
            }
        };
        let bucket = buckets.entry(timestamp).or_default();
        match role {
            FileRole::Media => bucket.media.push(path),
            _ => bucket.overlays.push(path),
        }
    }

    for (timestamp, bucket) in buckets {
        match (bucket.media.len(), bucket.overlays.len()) {
            (_, 0) => {}
            (1, 1) => report.pairs.push(MatchedPair {
                media: bucket.media[0].clone(),
                overlay: bucket.overlays[0].clone(),
                timestamp,
            }),
            (media, overlays) if media > 1 && overlays > 1 => {
                let refs: Vec<&Path> = bucket.overlays.iter().map(PathBuf::as_path).collect();
                let identical = match hash::all_identical(&refs) {
                    Ok(identical) => identical,
                    Err(e) => {
                        report.issue(bucket_label(timestamp), e.into());
                        continue;
                    }
                };
                if identical {
                    let shared = &bucket.overlays[0];
                    report
                        .pairs
                        .extend(bucket.media.iter().map(|m| MatchedPair {
                            media: m.clone(),
                            overlay: shared.clone(),
                            timestamp,
                        }));
                } else {
                    let bucket = bucket_label(timestamp);
                    report.issue(
                        bucket.clone(),
                        Error::AmbiguousPair {
                            bucket,
                            media,
                            overlays,
                        },
                    );
                }
            }
            _ => {
                let label = bucket_label(timestamp);
                report.issue(
                    label.clone(),
                    Error::OrphanOverlay {
                        bucket: label,
                        overlays: bucket.overlays,
                    },
                );
            }
        }
    }
    Ok(report)
}

/// Files to copy through untouched: not part of a pair and not a
/// thumbnail, metadata sidecar or overlay.
pub fn unmatched(dir: &Path, pairs: &[MatchedPair]) -> Result<Vec<PathBuf>> {
    let consumed: HashSet<&Path> = pairs
        .iter()
        .flat_map(|p| [p.media.as_path(), p.overlay.as_path()])
        .collect();

    Ok(list_files(dir)?
        .into_iter()
        .filter(|f| !consumed.contains(f.as_path()) && !role_of(f).is_excluded())
        .collect())
}

/// Composite one pair into `output_dir`. The output is named after the
/// media file without its `_media` marker and keeps the media's mtime.
pub fn process_pair(
    pair: &MatchedPair,
    compositor: &Compositor,
    output_dir: &Path,
    sink: &dyn EventSink,
) -> Result<PathBuf> {
    if MediaKind::from_path(&pair.media) != MediaKind::Video {
        return Err(Error::UnsupportedChatMedia {
            bucket: pair.bucket_label(),
            path: pair.media.clone(),
        });
    }

    let name = pair
        .media
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    let work = tempfile::Builder::new().prefix("chat-").tempdir()?;
    let output = work.path().join(markers::strip_marker(&name, MEDIA_MARKER));

    compositor.composite(&pair.media, &pair.overlay, &output, MediaKind::Video, sink)?;

    let mtime = FileTime::from_last_modification_time(&fs::metadata(&pair.media)?);
    filetime::set_file_times(&output, mtime, mtime)?;
    let dest = writer::place_output(&output, output_dir)?;
    info!("Overlaid and updated timestamp for {}", dest.display());
    Ok(dest)
}

/// Run the whole chat-media pass over `dir`. Item-level failures are
/// emitted as `ItemSkipped`; only an unreadable folder fails the call.
pub fn process_folder(
    dir: &Path,
    compositor: &Compositor,
    output_dir: &Path,
    sink: &dyn EventSink,
    progress: &ThrottledProgress<'_>,
) -> Result<ChatSummary> {
    let report = match_pairs(dir)?;
    info!("Found {} media-overlay pairs to process", report.pairs.len());

    for MatchIssue { item, error } in report.issues {
        sink.emit(Event::ItemSkipped { item, error });
    }

    let mut summary = ChatSummary {
        pairs: report.pairs.len() as u64,
        ..ChatSummary::default()
    };
    let total = report.pairs.len() as u64;
    for (i, pair) in report.pairs.iter().enumerate() {
        progress.report("chat", i as u64, total, &pair.media.display().to_string());
        match process_pair(pair, compositor, output_dir, sink) {
            Ok(_) => summary.pairs_written += 1,
            Err(error) => sink.emit(Event::ItemSkipped {
                item: pair.media.display().to_string(),
                error,
            }),
        }
    }

    let standalone = unmatched(dir, &report.pairs)?;
    info!("Copying {} standalone files", standalone.len());
    let total = standalone.len() as u64;
    for (i, file) in standalone.iter().enumerate() {
        progress.report("copy", i as u64, total, &file.display().to_string());
        match writer::copy_through(file, output_dir) {
            Ok(_) => summary.standalone_copied += 1,
            Err(error) => sink.emit(Event::ItemSkipped {
                item: file.display().to_string(),
                error,
            }),
        }
    }

    Ok(summary)
}
