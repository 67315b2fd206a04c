use std::path::PathBuf;

use thiserror::Error;

/// Result type for memories-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while rebuilding a single memory or chat-media item.
///
/// Everything except `Io` and `Manifest` is item-level: the batch logs it
/// and moves on to the next item.
#[derive(Error, Debug)]
pub enum Error {
    /// Remote asset could not be fetched
    #[error("download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    /// Archive does not hold exactly one base asset and one overlay
    #[error(
        "memory archive {archive} is not one video + one png or one jpg + one png \
         (found {videos} video, {photos} jpg, {overlays} png)"
    )]
    FormatMismatch {
        archive: PathBuf,
        videos: usize,
        photos: usize,
        overlays: usize,
    },

    /// Decoding, encoding or the external video engine failed
    #[error("could not composite {path}: {reason}")]
    Composition { path: PathBuf, reason: String },

    /// GPS or timestamp could not be attached
    #[error("could not write metadata to {path}: {reason}")]
    MetadataWrite { path: PathBuf, reason: String },

    /// Several media files share a timestamp with overlays that differ
    #[error("{bucket}: {media} media files and {overlays} different overlays, cannot pair")]
    AmbiguousPair {
        bucket: String,
        media: usize,
        overlays: usize,
    },

    /// Overlay with no base media to go on
    #[error("{bucket}: overlay exists without base media")]
    OrphanOverlay { bucket: String, overlays: Vec<PathBuf> },

    /// Chat pairs are only composited onto video
    #[error("{bucket}: no mp4 media for overlay, {path} left as is")]
    UnsupportedChatMedia { bucket: String, path: PathBuf },

    #[error("location {0:?} does not contain a latitude and a longitude")]
    InvalidLocation(String),

    #[error("capture date {0:?} is not in \"YYYY-MM-DD HH:MM:SS TZ\" format")]
    InvalidDate(String),

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn composition(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Composition {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn metadata(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::MetadataWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
