use serde::{Deserialize, Serialize};

/// Coarse media classification, derived from the MIME primary type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    /// Anything that is not image/video/audio (PDFs, office files, ...).
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an uploaded attachment, as produced by the media ingestion
/// adapter and stored on messages and threads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaDescriptor {
    /// Location of the stored object.
    pub url: String,
    /// Coarse classification (image / video / audio / document).
    pub kind: MediaKind,
    /// Recognized file format (e.g. `png`, `docx`), `None` when the MIME
    /// subtype is not on the whitelist.
    pub format: Option<String>,
}
