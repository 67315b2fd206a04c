use std::path::Path;

/// What a file on disk is, judged from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    /// Zip bundle of base media + caption overlay
    Archive,
    Other,
}

impl MediaKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = extension(path);
        if ext == "zip" {
            return MediaKind::Archive;
        }

        match mime_guess::from_path(path).first() {
            Some(m) if m.type_() == mime_guess::mime::IMAGE => MediaKind::Image,
            Some(m) if m.type_() == mime_guess::mime::VIDEO => MediaKind::Video,
            _ if ext == "mts" => MediaKind::Video,
            _ => MediaKind::Other,
        }
    }
}

/// Lowercased extension, empty if there is none
pub fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}

pub fn is_jpeg(path: &Path) -> bool {
    matches!(extension(path).as_str(), "jpg" | "jpeg")
}
