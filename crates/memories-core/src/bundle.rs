use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use encoding_rs::SHIFT_JIS;

use crate::error::{Error, Result};
use crate::markers::{self, MAIN_MARKER};
use crate::media::{self, MediaKind};

/// Base media + caption overlay unpacked from a memory archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBundle {
    pub base: PathBuf,
    pub overlay: PathBuf,
    /// Image or Video
    pub kind: MediaKind,
}

impl MediaBundle {
    /// Base filename with the `-main` marker removed
    pub fn output_name(&self) -> String {
        let name = self
            .base
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("memory");
        markers::strip_marker(name, MAIN_MARKER)
    }
}

/// Decode ZIP entry name, trying UTF-8 first, then Shift_JIS
fn decode_zip_name(raw: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(raw) {
        return s.to_string();
    }

    let (decoded, _, had_errors) = SHIFT_JIS.decode(raw);
    if !had_errors {
        return decoded.into_owned();
    }

    String::from_utf8_lossy(raw).into_owned()
}

/// Extract every file entry flat into `dest`. Only the last path component
/// of an entry name is used.
pub fn extract(archive_path: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dest)?;
    let mut archive = zip::ZipArchive::new(File::open(archive_path)?)?;
    let mut extracted = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }

        let entry_name = decode_zip_name(entry.name_raw());
        let Some(filename) = entry_name
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        else {
            continue;
        };

        let path = dest.join(filename);
        let mut out = io::BufWriter::new(File::create(&path)?);
        io::copy(&mut entry, &mut out)?;
        extracted.push(path);
    }

    extracted.sort();
    Ok(extracted)
}

/// Pick base + overlay out of extracted files. Exactly one video + one png,
/// or exactly one jpg + one png; anything else is a format mismatch.
pub fn classify(archive_path: &Path, files: &[PathBuf]) -> Result<MediaBundle> {
    let mut videos = Vec::new();
    let mut photos = Vec::new();
    let mut overlays = Vec::new();

    for f in files {
        if media::extension(f) == "png" {
            overlays.push(f);
        } else if media::is_jpeg(f) {
            photos.push(f);
        } else if MediaKind::from_path(f) == MediaKind::Video {
            videos.push(f);
        }
    }

    let (base, kind) = match (videos.as_slice(), photos.as_slice(), overlays.len()) {
        ([video], [], 1) => (*video, MediaKind::Video),
        ([], [photo], 1) => (*photo, MediaKind::Image),
        _ => {
            return Err(Error::FormatMismatch {
                archive: archive_path.to_path_buf(),
                videos: videos.len(),
                photos: photos.len(),
                overlays: overlays.len(),
            })
        }
    };

    Ok(MediaBundle {
        base: base.clone(),
        overlay: overlays[0].clone(),
        kind,
    })
}

/// Extract `archive_path` into `dest` and classify its contents
pub fn unpack(archive_path: &Path, dest: &Path) -> Result<MediaBundle> {
    let files = extract(archive_path, dest)?;
    classify(archive_path, &files)
}
