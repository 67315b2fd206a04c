use unicode_normalization::UnicodeNormalization;

/// Base asset inside a memory archive, e.g. `abc-main.mp4`
pub const MAIN_MARKER: &str = "-main";

pub const MEDIA_MARKER: &str = "_media";
pub const OVERLAY_MARKER: &str = "_overlay";
pub const THUMBNAIL_MARKER: &str = "_thumbnail";
pub const METADATA_MARKER: &str = "_metadata";

/// Role of a file in the chat-media folder, from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    Media,
    Overlay,
    Thumbnail,
    Metadata,
    Unrelated,
}

impl FileRole {
    /// Excluded roles are checked first so a thumbnail of a media file never
    /// ends up as a pairing candidate.
    pub fn classify(filename: &str) -> Self {
        let name: String = filename.nfc().collect();
        if name.contains(THUMBNAIL_MARKER) {
            FileRole::Thumbnail
        } else if name.contains(METADATA_MARKER) {
            FileRole::Metadata
        } else if name.contains(OVERLAY_MARKER) {
            FileRole::Overlay
        } else if name.contains(MEDIA_MARKER) {
            FileRole::Media
        } else {
            FileRole::Unrelated
        }
    }

    /// Files of this role are never copied through as standalone files
    pub fn is_excluded(self) -> bool {
        matches!(
            self,
            FileRole::Thumbnail | FileRole::Metadata | FileRole::Overlay
        )
    }
}

/// Output filename with every occurrence of `marker` removed
pub fn strip_marker(filename: &str, marker: &str) -> String {
    let normalized: String = filename.nfc().collect();
    normalized.replace(marker, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(FileRole::classify("2023-01-01_b~abc_media~x.mp4"), FileRole::Media);
        assert_eq!(FileRole::classify("2023-01-01_b~abc_overlay~x.webp"), FileRole::Overlay);
        assert_eq!(FileRole::classify("2023-01-01_media_thumbnail~x.jpg"), FileRole::Thumbnail);
        assert_eq!(FileRole::classify("2023-01-01_metadata~x.json"), FileRole::Metadata);
        assert_eq!(FileRole::classify("IMG_0001.jpg"), FileRole::Unrelated);
        assert!(FileRole::Overlay.is_excluded());
        assert!(!FileRole::Media.is_excluded());
        assert!(!FileRole::Unrelated.is_excluded());
    }

    #[test]
    fn test_strip_marker() {
        assert_eq!(strip_marker("abc-main.mp4", MAIN_MARKER), "abc.mp4");
        assert_eq!(strip_marker("x_media~1.mp4", MEDIA_MARKER), "x~1.mp4");
        assert_eq!(strip_marker("plain.jpg", MAIN_MARKER), "plain.jpg");
    }

    #[test]
    fn test_strip_marker_normalizes() {
        // NFD "é" from macOS file systems comes back composed
        let nfd = "cafe\u{301}-main.jpg";
        assert_eq!(strip_marker(nfd, MAIN_MARKER), "caf\u{e9}.jpg");
    }
}
