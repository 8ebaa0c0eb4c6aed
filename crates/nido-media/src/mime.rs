//! MIME-type classification: primary type -> [`MediaKind`], subtype -> a
//! recognized file format tag.

use nido_shared::media::MediaKind;

/// Derive the coarse media kind from the MIME primary type.  Anything that
/// is not image/video/audio counts as a generic document.
pub fn kind_from_mime(mime_type: &str) -> MediaKind {
    let primary = mime_type
        .split('/')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match primary.as_str() {
        "image" => MediaKind::Image,
        "video" => MediaKind::Video,
        "audio" => MediaKind::Audio,
        _ => MediaKind::Document,
    }
}

/// Office and media subtypes whose canonical format tag differs from the
/// raw subtype string.
const SUBTYPE_ALIASES: &[(&str, &str)] = &[
    // Office / spreadsheet formats
    ("vnd.openxmlformats-officedocument.wordprocessingml.document", "docx"),
    ("vnd.openxmlformats-officedocument.spreadsheetml.sheet", "xlsx"),
    ("vnd.openxmlformats-officedocument.presentationml.presentation", "pptx"),
    ("msword", "doc"),
    ("vnd.ms-excel", "xls"),
    ("vnd.ms-powerpoint", "ppt"),
    ("vnd.oasis.opendocument.text", "odt"),
    ("vnd.oasis.opendocument.spreadsheet", "ods"),
    // Media subtypes with awkward raw names
    ("svg+xml", "svg"),
    ("quicktime", "mov"),
    ("x-matroska", "mkv"),
    ("x-wav", "wav"),
    ("mpeg", "mp3"),
    ("plain", "txt"),
];

/// Formats accepted as-is when the subtype is not aliased.
const FORMAT_WHITELIST: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "svg", // images
    "mp4", "webm", "mov", "avi", "mkv", // video
    "mp3", "wav", "ogg", "m4a", "flac", "aac", // audio
    "pdf", "txt", "csv", "json", "zip", // documents
    "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods",
];

/// Derive the format tag from the MIME subtype.
///
/// Known office/spreadsheet subtypes map through the alias table; anything
/// else is accepted literally only when it is on the whitelist.  An
/// unrecognized subtype yields `None` -- the attachment is kept but carries
/// no hard format tag.
pub fn format_from_mime(mime_type: &str) -> Option<String> {
    let subtype = mime_type
        .split('/')
        .nth(1)
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if subtype.is_empty() {
        return None;
    }

    for (from, to) in SUBTYPE_ALIASES {
        if subtype == *from {
            // `mpeg` means mp3 only under audio/; video/mpeg stays unrecognized.
            if *from == "mpeg" && kind_from_mime(mime_type) != MediaKind::Audio {
                return None;
            }
            return Some((*to).to_string());
        }
    }

    if FORMAT_WHITELIST.contains(&subtype.as_str()) {
        Some(subtype)
    } else {
        None
    }
}
