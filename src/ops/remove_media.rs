//! Detaching media from a hypha.

use crate::hyphae::{ExistingHypha, Hypha};
use crate::ops::OpsError;
use crate::users::User;
use crate::wiki::Wiki;

/// Removes the hypha's media file and commits a revision about it. A hypha
/// that also had text becomes textual; one that had only media is deleted.
pub fn remove_media(wiki: &Wiki, u: &User, h: &ExistingHypha) -> Result<(), OpsError> {
    let Some(media_path) = h.media_file_path().map(std::path::Path::to_path_buf) else {
        return Err(OpsError::EmptyOperation);
    };
    let name = h.canonical_name().to_string();

    let mut hop = wiki.history.operation();
    hop.with_files_removed(std::slice::from_ref(&media_path))
        .with_msg(&format!("Remove media from ‘{name}’"))
        .with_user(u);

    let mut iop = wiki.index.operation();
    match h.without_media() {
        Hypha::Existing(remaining) => {
            iop.with_hypha_media_changed(h, remaining);
        }
        Hypha::Empty { .. } => {
            iop.with_hypha_deleted(h.clone(), "");
        }
    }
    match hop.apply() {
        Ok(()) => {
            iop.apply();
            Ok(())
        }
        Err(e) => {
            tracing::error!(hypha = %name, err = %e, "failed to remove media");
            iop.abort();
            Err(e.into())
        }
    }
}
