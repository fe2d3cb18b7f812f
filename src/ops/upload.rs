//! Text and media uploads.

use std::io::Read;
use std::path::Path;

use crate::hyphae::{ExistingHypha, Hypha, is_valid_name, text_file_path};
use crate::mime;
use crate::ops::OpsError;
use crate::users::User;
use crate::util::{normalize_text, sanitize_extension};
use crate::wiki::Wiki;

fn text_upload_message(h: &Hypha, user_message: &str) -> String {
    let verb = if h.is_empty() { "Create" } else { "Edit" };
    if user_message.is_empty() {
        format!("{verb} ‘{}’", h.canonical_name())
    } else {
        format!("{verb} ‘{}’: {user_message}", h.canonical_name())
    }
}

/// Replaces the hypha's text part and commits a revision about it. Writing
/// the text a hypha already has is a successful no-op with no commit.
pub fn upload_text(
    wiki: &Wiki,
    h: &Hypha,
    text: &str,
    user_message: &str,
    u: &User,
) -> Result<(), OpsError> {
    let name = h.canonical_name();
    if !is_valid_name(name) {
        return Err(OpsError::InvalidName {
            name: name.to_string(),
        });
    }
    let hyphae_dir = wiki.history.hyphae_dir().to_path_buf();

    let mut hop = wiki.history.operation();
    hop.with_msg(&text_upload_message(h, user_message)).with_user(u);

    let old_text = match h.text(&hop) {
        Ok(old_text) => old_text,
        Err(e) => {
            hop.abort();
            return Err(e.into());
        }
    };
    let text = normalize_text(text);
    if old_text == text {
        // No changes, just like the cancel button.
        hop.abort();
        return Ok(());
    }

    let target = match h {
        Hypha::Empty { name } => ExistingHypha::Textual {
            name: name.clone(),
            text_path: text_file_path(&hyphae_dir, name),
        },
        Hypha::Existing(e) => {
            if e.has_text_file() {
                e.clone()
            } else {
                e.with_text_path(text_file_path(&hyphae_dir, name))
            }
        }
    };
    let text_path = target.text_file_path(&hyphae_dir);

    let mut iop = wiki.index.operation();
    match h {
        Hypha::Empty { .. } => {
            iop.with_hypha_created(target.clone(), &text);
        }
        Hypha::Existing(e) => {
            iop.with_hypha_text_changed(e.clone(), &old_text, target.clone(), &text);
        }
    }

    if let Err(e) = hop.write_file(&text_path, text.as_bytes()) {
        hop.abort();
        iop.abort();
        return Err(e.into());
    }
    hop.with_files(std::slice::from_ref(&text_path));
    match hop.apply() {
        Ok(()) => {
            iop.apply();
            Ok(())
        }
        Err(e) => {
            iop.abort();
            Err(e.into())
        }
    }
}

/// The media extension for an upload, preferring the uploaded filename over
/// the declared MIME type.
fn media_extension(filename: &str, mime_type: &str) -> String {
    match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => {
            let cleaned = sanitize_extension(ext);
            if cleaned.is_empty() {
                mime::extension_for(mime_type).to_string()
            } else {
                format!(".{cleaned}")
            }
        }
        _ => mime::extension_for(mime_type).to_string(),
    }
}

/// Replaces the hypha's media part with the bytes from `file` and commits a
/// revision about it. A prior media file with a different extension is
/// staged for removal.
pub fn upload_binary(
    wiki: &Wiki,
    h: &Hypha,
    filename: &str,
    mime_type: &str,
    file: &mut dyn Read,
    u: &User,
) -> Result<(), OpsError> {
    let name = h.canonical_name();
    if !is_valid_name(name) {
        return Err(OpsError::InvalidName {
            name: name.to_string(),
        });
    }
    let hyphae_dir = wiki.history.hyphae_dir();
    let ext = media_extension(filename, mime_type);
    let media_path = hyphae_dir.join(format!("{name}{ext}"));

    let mut hop = wiki.history.operation();
    hop.with_msg(&format!("Upload media for ‘{name}’ with type ‘{mime_type}’"))
        .with_user(u);

    if let Hypha::Existing(ExistingHypha::Media {
        media_path: prev, ..
    }) = h
    {
        if *prev != media_path {
            tracing::info!(from = %prev.display(), to = %media_path.display(), "replacing media file");
            hop.with_files_removed(std::slice::from_ref(prev));
        }
    }

    let written = match hop.copy_file(&media_path, file) {
        Ok(written) => written,
        Err(e) => {
            hop.abort();
            return Err(e.into());
        }
    };
    if written == 0 {
        hop.abort();
        return Err(OpsError::NoMediaData);
    }
    hop.with_files(std::slice::from_ref(&media_path));

    let target = h.with_media_path(media_path);
    let mut iop = wiki.index.operation();
    match h {
        Hypha::Empty { .. } => {
            iop.with_hypha_created(target, "");
        }
        Hypha::Existing(e) => {
            iop.with_hypha_media_changed(e, target);
        }
    }
    match hop.apply() {
        Ok(()) => {
            iop.apply();
            Ok(())
        }
        Err(e) => {
            iop.abort();
            Err(e.into())
        }
    }
}
