//! Reverting a hypha to the state it had at an earlier revision.

use crate::hyphae::{Hypha, at_revision};
use crate::ops::OpsError;
use crate::users::User;
use crate::wiki::Wiki;

/// Restores the hypha's files as they were at `rev_hash` and commits the
/// restoration as a new revision. Files the hypha has now but did not have
/// then are removed; reverting to a revision where the hypha did not exist
/// deletes it. Returns the reverted hypha.
pub fn revert(wiki: &Wiki, u: &User, h: &Hypha, rev_hash: &str) -> Result<Hypha, OpsError> {
    let name = h.canonical_name().to_string();

    let mut hop = wiki.history.operation();
    hop.with_msg(&format!("Revert ‘{name}’ to revision {rev_hash}"))
        .with_user(u);

    let original_text = match h.text(&hop) {
        Ok(text) => text,
        Err(e) => {
            hop.abort();
            return Err(e.into());
        }
    };
    let original_files = h.file_paths();

    let reverted = match at_revision(&wiki.history, &name, rev_hash) {
        Ok(reverted) => reverted,
        Err(e) => {
            hop.abort();
            return Err(e.into());
        }
    };
    let rev_files = reverted.file_paths();

    let removals: Vec<_> = original_files
        .iter()
        .filter(|path| !rev_files.contains(path))
        .cloned()
        .collect();
    if removals.is_empty() && rev_files.is_empty() {
        hop.abort();
        return Ok(reverted);
    }
    if !removals.is_empty() {
        hop.with_files_removed(&removals);
    }
    if !rev_files.is_empty() {
        // Checkout restores the working-tree files, so the reverted text is
        // readable below, before the commit.
        hop.with_files_reverted(rev_hash, &rev_files);
    }
    let rev_text = match reverted.text(&hop) {
        Ok(text) => text,
        Err(e) => {
            hop.abort();
            return Err(e.into());
        }
    };
    hop.apply()?;

    let mut iop = wiki.index.operation();
    match (h.as_existing(), reverted.as_existing()) {
        (Some(old), None) => {
            iop.with_hypha_deleted(old.clone(), &original_text);
        }
        (None, Some(new)) => {
            iop.with_hypha_created(new.clone(), &rev_text);
        }
        (Some(old), Some(new)) => {
            iop.with_hypha_text_changed(old.clone(), &original_text, new.clone(), &rev_text);
        }
        (None, None) => {}
    }
    iop.apply();
    if !h.is_empty() && reverted.is_empty() {
        wiki.categories
            .remove_hyphae_from_all_categories(std::slice::from_ref(&name));
    }
    Ok(reverted)
}
