//! Extension-driven classification of hypha files.
//!
//! A hypha name maps to at most two files: `<name>.myco` for the text part
//! and `<name>.<ext>` for the media part. Classification never sniffs file
//! contents; the extension decides everything.

use std::path::Path;

use crate::hyphae::canonical_name;

/// What a file under the hyphae directory contributes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HyphaFile {
    /// Canonical hypha name derived from the path without its extension.
    pub name: String,
    /// True for `.myco` text parts, false for media.
    pub is_text: bool,
}

/// Classifies a path relative to the hyphae directory. Returns `None` for
/// files that are not hypha parts: dotfiles and extensionless files.
pub fn data_from_filename(rel_path: &Path) -> Option<HyphaFile> {
    let base = rel_path.file_name()?.to_str()?;
    if base.starts_with('.') {
        return None;
    }
    let ext = rel_path.extension()?.to_str()?;
    if ext.is_empty() {
        return None;
    }
    let rel = rel_path.to_str()?;
    let stem = &rel[..rel.len() - ext.len() - 1];
    Some(HyphaFile {
        name: canonical_name(&stem.replace(std::path::MAIN_SEPARATOR, "/")),
        is_text: ext == "myco",
    })
}

/// Media file extension (with the leading dot) for a MIME type. Unknown
/// types fall back to `.bin`.
pub fn extension_for(mime: &str) -> &'static str {
    match mime {
        "application/pdf" => ".pdf",
        "application/zip" => ".zip",
        "audio/flac" => ".flac",
        "audio/mpeg" => ".mp3",
        "audio/ogg" => ".ogg",
        "audio/wav" | "audio/x-wav" => ".wav",
        "image/avif" => ".avif",
        "image/gif" => ".gif",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/svg+xml" => ".svg",
        "image/webp" => ".webp",
        "image/x-icon" => ".ico",
        "text/plain" => ".txt",
        "video/mp4" => ".mp4",
        "video/ogg" => ".ogv",
        "video/webm" => ".webm",
        _ => ".bin",
    }
}
